use serde::{Deserialize, Serialize};

use crate::domain::engine::{ModelSize, RequestedDevice};
use crate::domain::DomainError;

/// HTTP server binding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Enable file logging with daily rotation.
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
        }
    }
}

/// Transcription defaults applied when a start request leaves them out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Default model size.
    pub model: ModelSize,
    /// Default language hint (ISO 639-1 code), or "auto" for detection.
    pub language: String,
    /// Default compute device.
    pub device: RequestedDevice,
    /// Inference threads (0 = auto-detect).
    pub threads: u32,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: ModelSize::Small,
            language: "en".to_string(),
            device: RequestedDevice::Auto,
            threads: 0,
        }
    }
}

impl TranscriptionConfig {
    /// Language hint for the engine; "auto" means detect.
    pub fn language_hint(&self) -> Option<String> {
        if self.language.eq_ignore_ascii_case("auto") {
            None
        } else {
            Some(self.language.clone())
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub transcription: TranscriptionConfig,
}

impl AppConfig {
    /// Create a new AppConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.server.port == 0 {
            return Err(DomainError::Config(
                "server.port must be greater than 0".to_string(),
            ));
        }
        if self.server.host.is_empty() {
            return Err(DomainError::Config("server.host must not be empty".to_string()));
        }
        Ok(())
    }
}
