pub mod audio;
pub mod config;
pub mod engine;
pub mod http;
pub mod provisioner;

pub use audio::AudioSource;
pub use config::ConfigStore;
pub use engine::{EngineFactory, RecognitionEngine};
pub use http::{DownloadProgressFn, HttpClient};
pub use provisioner::{AccelProvisioner, InstallProgressFn};
