#![forbid(unsafe_code)]

pub mod adapters;
pub mod app;
pub mod domain;
pub mod http;
pub mod infrastructure;
pub mod ports;
