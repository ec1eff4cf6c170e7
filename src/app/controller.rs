use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use crate::adapters::{
    CpalAudioSource, CudaProvisioner, HttpDownloader, TomlConfigStore, WhisperEngine,
};
use crate::app::SessionManager;
use crate::domain::{AppConfig, DomainError};
use crate::infrastructure::init_logging;
use crate::ports::{
    AccelProvisioner, AudioSource, ConfigStore, EngineFactory, HttpClient, RecognitionEngine,
};

/// Application controller that wires configuration, logging, and the
/// adapters behind their ports, and owns the one session manager handed
/// to request handlers.
pub struct AppController {
    config: RwLock<AppConfig>,
    config_store: Arc<TomlConfigStore>,
    session: Arc<SessionManager>,
    provisioner: Arc<dyn AccelProvisioner>,
    audio: Arc<dyn AudioSource>,
    _log_guard: Option<WorkerGuard>,
}

impl AppController {
    /// Initialize the application controller.
    pub fn new() -> Result<Self, DomainError> {
        let config_store = Arc::new(TomlConfigStore::new()?);

        let config = config_store.load()?;
        config.validate()?;

        let log_guard = init_logging(
            &config_store.logs_dir(),
            &config.logging.level,
            config.logging.file_logging,
        )?;

        info!("Sotto backend starting up");

        let http: Arc<dyn HttpClient> = Arc::new(HttpDownloader::new()?);
        let provisioner: Arc<dyn AccelProvisioner> = Arc::new(CudaProvisioner::new(
            config_store.gpu_libs_dir(),
            Arc::clone(&http),
        ));
        let audio: Arc<dyn AudioSource> = Arc::new(CpalAudioSource::new()?);

        let session = Arc::new(SessionManager::new(
            Arc::clone(&audio),
            Self::engine_factory(
                config_store.models_dir(),
                Arc::clone(&http),
                Arc::clone(&provisioner),
                config.transcription.threads,
            ),
        ));

        info!(
            data_dir = ?config_store.data_dir(),
            "AppController initialized"
        );

        Ok(Self {
            config: RwLock::new(config),
            config_store,
            session,
            provisioner,
            audio,
            _log_guard: log_guard,
        })
    }

    /// Factory the session manager uses whenever the engine reuse key
    /// misses. The accelerator probe result is cached inside the
    /// provisioner, so reconstructing an engine never re-probes hardware.
    fn engine_factory(
        models_dir: std::path::PathBuf,
        http: Arc<dyn HttpClient>,
        provisioner: Arc<dyn AccelProvisioner>,
        threads: u32,
    ) -> EngineFactory {
        Box::new(move |config| {
            let engine = WhisperEngine::new(
                config,
                models_dir.clone(),
                Arc::clone(&http),
                provisioner.detect_accelerator(),
                threads,
            );
            Ok(Arc::new(engine) as Arc<dyn RecognitionEngine>)
        })
    }

    /// Get the current configuration.
    pub fn config(&self) -> AppConfig {
        self.config.read().clone()
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn provisioner(&self) -> &dyn AccelProvisioner {
        self.provisioner.as_ref()
    }

    pub fn audio(&self) -> &dyn AudioSource {
        self.audio.as_ref()
    }

    /// Get the application data directory path.
    pub fn data_dir(&self) -> std::path::PathBuf {
        self.config_store.data_dir()
    }
}
