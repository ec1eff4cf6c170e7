use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::domain::{AppConfig, DomainError};
use crate::ports::ConfigStore;

/// Environment override for the data directory. Used by tests and when
/// running from a source checkout instead of a packaged install.
const DATA_DIR_ENV: &str = "SOTTO_DATA_DIR";

/// TOML-based configuration store with OS-specific paths.
///
/// The data directory also roots the persisted state layout: the model
/// weight cache, the GPU runtime library bundle, and the log files.
pub struct TomlConfigStore {
    data_dir: PathBuf,
}

impl TomlConfigStore {
    /// Create a new TomlConfigStore.
    /// Uses OS-specific application data directories unless overridden.
    pub fn new() -> Result<Self, DomainError> {
        let data_dir = match std::env::var(DATA_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => Self::platform_data_dir()?,
        };
        Self::with_data_dir(data_dir)
    }

    /// Create a store rooted at an explicit directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Result<Self, DomainError> {
        fs::create_dir_all(&data_dir)?;

        info!(data_dir = ?data_dir, "ConfigStore initialized");

        Ok(Self { data_dir })
    }

    /// Get the OS-specific application data directory.
    /// - macOS: ~/Library/Application Support/Sotto/
    /// - Windows: %APPDATA%\Sotto\
    /// - Linux: ~/.config/Sotto/
    fn platform_data_dir() -> Result<PathBuf, DomainError> {
        #[cfg(target_os = "macos")]
        {
            dirs::data_dir()
                .map(|p| p.join("Sotto"))
                .ok_or_else(|| DomainError::Config("Could not find application data directory".to_string()))
        }

        #[cfg(not(target_os = "macos"))]
        {
            dirs::config_dir()
                .map(|p| p.join("Sotto"))
                .ok_or_else(|| DomainError::Config("Could not find application data directory".to_string()))
        }
    }
}

impl ConfigStore for TomlConfigStore {
    fn load(&self) -> Result<AppConfig, DomainError> {
        let config_path = self.config_path();

        if config_path.exists() {
            debug!(path = ?config_path, "Loading configuration");
            let content = fs::read_to_string(&config_path)?;
            let config: AppConfig = toml::from_str(&content)?;
            info!(path = ?config_path, "Configuration loaded");
            Ok(config)
        } else {
            info!(path = ?config_path, "Configuration file not found, creating default");
            let config = AppConfig::new();
            self.save(&config)?;
            Ok(config)
        }
    }

    fn save(&self, config: &AppConfig) -> Result<(), DomainError> {
        let config_path = self.config_path();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&config_path, content)?;

        info!(path = ?config_path, "Configuration saved");
        Ok(())
    }

    fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    fn gpu_libs_dir(&self) -> PathBuf {
        self.data_dir.join("gpu_libs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_store_paths() {
        let temp = TempDir::new().unwrap();
        let store = TomlConfigStore::with_data_dir(temp.path().to_path_buf()).unwrap();

        assert!(store.config_path().ends_with("config.toml"));
        assert!(store.models_dir().ends_with("models"));
        assert!(store.gpu_libs_dir().ends_with("gpu_libs"));
        assert!(store.logs_dir().ends_with("logs"));
    }

    #[test]
    fn test_load_creates_default() {
        let temp = TempDir::new().unwrap();
        let store = TomlConfigStore::with_data_dir(temp.path().to_path_buf()).unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.server.port, 8000);
        assert!(store.config_path().exists());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = TomlConfigStore::with_data_dir(temp.path().to_path_buf()).unwrap();

        let mut config = AppConfig::new();
        config.server.port = 9321;
        config.logging.level = "debug".to_string();
        store.save(&config).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.server.port, 9321);
        assert_eq!(loaded.logging.level, "debug");
    }
}
