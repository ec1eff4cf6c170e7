pub mod audio_cpal;
pub mod config_store;
pub mod cuda_provisioner;
pub mod downloader;
pub mod whisper_engine;

pub use audio_cpal::CpalAudioSource;
pub use config_store::TomlConfigStore;
pub use cuda_provisioner::CudaProvisioner;
pub use downloader::HttpDownloader;
pub use whisper_engine::WhisperEngine;
