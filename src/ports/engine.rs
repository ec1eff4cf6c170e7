use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ComputePrecision, Device, DomainError, EngineConfig, TranscriptionOutcome};

/// Port for the recognition engine adapter.
///
/// An engine is constructed eagerly for a `(model size, requested device)`
/// pair, but model weights load lazily on the first call that needs them.
/// Once a GPU load has failed, the instance is permanently demoted to CPU;
/// there is no path back short of constructing a new engine.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// The config this engine was constructed for (the reuse key).
    fn config(&self) -> EngineConfig;

    /// The device in use after auto-detection and any fallback.
    fn resolved_device(&self) -> Device;

    /// Compute precision derived from the resolved device.
    fn precision(&self) -> ComputePrecision;

    /// Whether model weights are loaded.
    fn is_loaded(&self) -> bool;

    /// Load the model weights. Idempotent; a GPU failure demotes to CPU
    /// and retries once, a CPU failure is fatal.
    async fn load(&self) -> Result<(), DomainError>;

    /// Transcribe a mono 16 kHz f32 buffer. Loads the model first if
    /// needed. Failures are reported inside the outcome, never panicked
    /// or propagated.
    async fn transcribe(
        &self,
        samples: Vec<f32>,
        language: Option<String>,
    ) -> TranscriptionOutcome;

    /// Whether the model weights are already present in the cache,
    /// without attempting a load.
    fn is_model_downloaded(&self) -> bool;
}

/// Factory used by the session manager to construct a fresh engine when
/// the reuse key does not match.
pub type EngineFactory =
    Box<dyn Fn(EngineConfig) -> Result<Arc<dyn RecognitionEngine>, DomainError> + Send + Sync>;
