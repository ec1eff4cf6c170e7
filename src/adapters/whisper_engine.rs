use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::domain::{
    ComputePrecision, Device, DomainError, EngineConfig, ModelCatalog, Segment,
    TranscriptionOutcome, WHISPER_SAMPLE_RATE,
};
use crate::ports::{HttpClient, RecognitionEngine};

/// Embedded catalog of downloadable model weights.
const CATALOG_JSON: &str = include_str!("../../resources/model_catalog.json");

static CATALOG: Lazy<ModelCatalog> =
    Lazy::new(|| serde_json::from_str(CATALOG_JSON).expect("embedded model catalog is valid JSON"));

/// Recognition engine adapter around whisper.cpp via whisper-rs.
///
/// The instance is constructed eagerly for one `(model size, requested
/// device)` pair; weights load lazily on the first transcription. A GPU
/// load failure demotes the instance to CPU permanently - the demotion is
/// never retried because the missing runtime will not appear mid-session.
pub struct WhisperEngine {
    config: EngineConfig,
    resolved: RwLock<(Device, ComputePrecision)>,
    context: RwLock<Option<Arc<WhisperContext>>>,
    models_dir: PathBuf,
    http: Arc<dyn HttpClient>,
    threads: u32,
}

impl WhisperEngine {
    /// Create a new engine. `accelerator_present` is the hardware probe
    /// result used to resolve an `auto` device request; the resolution is
    /// tentative until the first load confirms it.
    ///
    /// `threads` of 0 means auto-detect (cores - 1).
    pub fn new(
        config: EngineConfig,
        models_dir: PathBuf,
        http: Arc<dyn HttpClient>,
        accelerator_present: bool,
        threads: u32,
    ) -> Self {
        let actual_threads = if threads == 0 {
            std::thread::available_parallelism()
                .map(|p| std::cmp::max(1, p.get() as u32 - 1))
                .unwrap_or(1)
        } else {
            threads
        };

        let (device, precision) = config.resolve(accelerator_present);

        info!(
            model = %config.model_size,
            requested = %config.requested_device,
            resolved = %device,
            precision = precision.as_str(),
            threads = actual_threads,
            "WhisperEngine created"
        );

        Self {
            config,
            resolved: RwLock::new((device, precision)),
            context: RwLock::new(None),
            models_dir,
            http,
            threads: actual_threads,
        }
    }

    fn model_path(&self) -> PathBuf {
        self.models_dir.join(self.config.model_size.file_name())
    }

    /// One-shot fallback: once demoted, the instance stays on CPU.
    fn demote_to_cpu(&self) {
        *self.resolved.write() = (Device::Cpu, ComputePrecision::Int8);
    }

    /// Fetch the model weights into the cache if they are not there yet.
    async fn ensure_model(&self) -> Result<(), DomainError> {
        let path = self.model_path();
        if path.exists() {
            return Ok(());
        }

        let entry = CATALOG
            .get(self.config.model_size)
            .ok_or_else(|| DomainError::ModelNotFound(self.config.model_size.to_string()))?;

        info!(
            model = %self.config.model_size,
            url = %entry.url,
            approx_mb = entry.approx_bytes / (1024 * 1024),
            "Model not cached, downloading"
        );

        self.http.download_file(&entry.url, &path, None).await?;

        info!(path = ?path, "Model downloaded");
        Ok(())
    }

    async fn build_context(path: PathBuf, device: Device) -> Result<WhisperContext, String> {
        tokio::task::spawn_blocking(move || {
            let path_str = path.to_string_lossy().to_string();
            let mut ctx_params = WhisperContextParameters::default();
            ctx_params.use_gpu(device == Device::Gpu);
            WhisperContext::new_with_params(&path_str, ctx_params).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }
}

#[async_trait]
impl RecognitionEngine for WhisperEngine {
    fn config(&self) -> EngineConfig {
        self.config
    }

    fn resolved_device(&self) -> Device {
        self.resolved.read().0
    }

    fn precision(&self) -> ComputePrecision {
        self.resolved.read().1
    }

    fn is_loaded(&self) -> bool {
        self.context.read().is_some()
    }

    async fn load(&self) -> Result<(), DomainError> {
        if self.is_loaded() {
            debug!("Model already loaded");
            return Ok(());
        }

        self.ensure_model().await?;

        let path = self.model_path();
        let device = self.resolved_device();
        info!(
            model = %self.config.model_size,
            device = %device,
            precision = self.precision().as_str(),
            "Loading model"
        );

        match Self::build_context(path.clone(), device).await {
            Ok(ctx) => {
                *self.context.write() = Some(Arc::new(ctx));
                info!(model = %self.config.model_size, device = %device, "Model loaded");
                Ok(())
            }
            Err(message) if device == Device::Gpu => {
                warn!(error = %message, "GPU model load failed, falling back to CPU");
                self.demote_to_cpu();
                match Self::build_context(path, Device::Cpu).await {
                    Ok(ctx) => {
                        *self.context.write() = Some(Arc::new(ctx));
                        info!(model = %self.config.model_size, "Model loaded on CPU after GPU fallback");
                        Ok(())
                    }
                    Err(message) => Err(DomainError::ModelLoad {
                        device: Device::Cpu,
                        message,
                    }),
                }
            }
            Err(message) => Err(DomainError::ModelLoad { device, message }),
        }
    }

    async fn transcribe(
        &self,
        samples: Vec<f32>,
        language: Option<String>,
    ) -> TranscriptionOutcome {
        let duration_secs = samples.len() as f32 / WHISPER_SAMPLE_RATE as f32;

        if !self.is_loaded() {
            if let Err(e) = self.load().await {
                return TranscriptionOutcome::failure(e.to_string(), duration_secs);
            }
        }

        let context = self.context.read().clone();
        let Some(ctx) = context else {
            return TranscriptionOutcome::failure("Model not loaded", duration_secs);
        };

        let threads = self.threads;
        let pinned_language = language.is_some();

        debug!(
            samples = samples.len(),
            duration_secs,
            threads,
            language = ?language,
            "Starting transcription"
        );

        let result = tokio::task::spawn_blocking(
            move || -> Result<(String, Vec<Segment>, Option<String>), String> {
                // Greedy decoding: latency over the accuracy ceiling of
                // wider beams, and deterministic output.
                let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
                params.set_n_threads(threads as i32);
                params.set_temperature(0.0);
                // Segments decode independently; prior text never
                // conditions the next segment.
                params.set_no_context(true);
                // The non-speech suppressor erased genuine speech; keep it
                // off.
                params.set_suppress_non_speech_tokens(false);
                params.set_print_progress(false);
                params.set_print_realtime(false);
                params.set_print_timestamps(false);
                if let Some(ref lang) = language {
                    params.set_language(Some(lang));
                }

                let mut state = ctx
                    .create_state()
                    .map_err(|e| format!("Failed to create whisper state: {}", e))?;

                state
                    .full(params, &samples)
                    .map_err(|e| format!("Inference failed: {}", e))?;

                let num_segments = state
                    .full_n_segments()
                    .map_err(|e| format!("Failed to get segment count: {}", e))?;

                let mut segments = Vec::with_capacity(num_segments as usize);
                let mut text = String::new();
                for i in 0..num_segments {
                    let segment_text = state
                        .full_get_segment_text(i)
                        .map_err(|e| format!("Failed to read segment {}: {}", i, e))?;
                    // Segment timestamps are in 10ms ticks.
                    let t0 = state.full_get_segment_t0(i).map_err(|e| e.to_string())?;
                    let t1 = state.full_get_segment_t1(i).map_err(|e| e.to_string())?;
                    segments.push(Segment {
                        start: t0 as f32 / 100.0,
                        end: t1 as f32 / 100.0,
                        text: segment_text.trim().to_string(),
                    });
                    text.push_str(&segment_text);
                }

                let detected = state
                    .full_lang_id_from_state()
                    .ok()
                    .and_then(|id| whisper_rs::get_lang_str(id).map(|s| s.to_string()));

                Ok((text.trim().to_string(), segments, detected))
            },
        )
        .await
        .map_err(|e| format!("Task join error: {}", e))
        .and_then(|inner| inner);

        match result {
            Ok((text, segments, detected)) => {
                info!(
                    text_len = text.len(),
                    segments = segments.len(),
                    detected_language = ?detected,
                    "Transcription complete"
                );
                TranscriptionOutcome {
                    success: true,
                    text,
                    segments,
                    language: detected,
                    language_probability: if pinned_language { Some(1.0) } else { None },
                    duration_secs,
                    error: None,
                }
            }
            Err(message) => {
                warn!(error = %message, "Transcription failed");
                TranscriptionOutcome::failure(message, duration_secs)
            }
        }
    }

    fn is_model_downloaded(&self) -> bool {
        self.model_path().exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelSize, RequestedDevice};
    use std::path::Path;
    use tempfile::TempDir;

    struct NullHttp;

    #[async_trait]
    impl HttpClient for NullHttp {
        async fn download_file(
            &self,
            _url: &str,
            _path: &Path,
            _progress: Option<crate::ports::DownloadProgressFn>,
        ) -> Result<(), DomainError> {
            Err(DomainError::Http("offline".to_string()))
        }
    }

    fn engine(device: RequestedDevice, accelerator: bool, dir: &TempDir) -> WhisperEngine {
        WhisperEngine::new(
            EngineConfig {
                model_size: ModelSize::Small,
                requested_device: device,
            },
            dir.path().to_path_buf(),
            Arc::new(NullHttp),
            accelerator,
            4,
        )
    }

    #[test]
    fn test_catalog_covers_all_sizes() {
        for size in [
            ModelSize::Tiny,
            ModelSize::Base,
            ModelSize::Small,
            ModelSize::Medium,
            ModelSize::LargeV3,
            ModelSize::LargeV3Turbo,
        ] {
            assert!(CATALOG.get(size).is_some(), "catalog missing {}", size);
        }
    }

    #[test]
    fn test_auto_resolution_follows_probe() {
        let temp = TempDir::new().unwrap();

        let with_gpu = engine(RequestedDevice::Auto, true, &temp);
        assert_eq!(with_gpu.resolved_device(), Device::Gpu);
        assert_eq!(with_gpu.precision(), ComputePrecision::Float16);

        let without = engine(RequestedDevice::Auto, false, &temp);
        assert_eq!(without.resolved_device(), Device::Cpu);
        assert_eq!(without.precision(), ComputePrecision::Int8);
    }

    #[test]
    fn test_demotion_is_permanent_state() {
        let temp = TempDir::new().unwrap();
        let engine = engine(RequestedDevice::Gpu, true, &temp);
        assert_eq!(engine.resolved_device(), Device::Gpu);

        engine.demote_to_cpu();
        assert_eq!(engine.resolved_device(), Device::Cpu);
        assert_eq!(engine.precision(), ComputePrecision::Int8);
        // The reuse key still reflects what was requested.
        assert_eq!(engine.config().requested_device, RequestedDevice::Gpu);
    }

    #[test]
    fn test_model_path_and_downloaded_check() {
        let temp = TempDir::new().unwrap();
        let engine = engine(RequestedDevice::Cpu, false, &temp);

        assert!(engine.model_path().ends_with("ggml-small.bin"));
        assert!(!engine.is_model_downloaded());

        std::fs::write(engine.model_path(), b"weights").unwrap();
        assert!(engine.is_model_downloaded());
    }

    #[test]
    fn test_thread_autodetection() {
        let temp = TempDir::new().unwrap();
        let engine = WhisperEngine::new(
            EngineConfig {
                model_size: ModelSize::Tiny,
                requested_device: RequestedDevice::Cpu,
            },
            temp.path().to_path_buf(),
            Arc::new(NullHttp),
            false,
            0,
        );
        assert!(engine.threads >= 1);
    }
}
