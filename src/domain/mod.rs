pub mod accel;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod session;

pub use accel::{AccelInfo, AccelManifest, AccelPackage, InstallProgress, PackageFile};
pub use audio::{AudioConfig, AudioDevice, WHISPER_SAMPLE_RATE};
pub use config::AppConfig;
pub use engine::{
    ComputePrecision, Device, EngineConfig, ModelCatalog, ModelSize, RequestedDevice, Segment,
    TranscriptionOutcome,
};
pub use error::DomainError;
pub use session::{AtomicSessionPhase, SessionPhase};
