use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::audio::rms;
use crate::domain::{
    AtomicSessionPhase, Device, DomainError, EngineConfig, ModelSize, RequestedDevice, Segment,
    SessionPhase,
};
use crate::ports::{AudioSource, EngineFactory, RecognitionEngine};

/// How many of the newest queued chunks feed the level meter.
const LEVEL_PEEK_CHUNKS: usize = 5;
/// Meter gain applied to the raw RMS before clamping to [0, 1].
const LEVEL_GAIN: f32 = 8.0;

/// Result of a successful start.
#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub model: ModelSize,
    pub device: Device,
    /// Early signal: whether the weights are already cached, before any
    /// load is attempted.
    pub model_downloaded: bool,
}

/// Result of a successful stop. Empty audio is not an error; it yields
/// empty text with zero duration.
#[derive(Debug, Clone, Serialize)]
pub struct StopOutcome {
    pub text: String,
    pub language: Option<String>,
    pub language_probability: Option<f32>,
    pub duration_secs: f32,
    pub transcription_time_ms: u64,
    pub segments: Vec<Segment>,
    pub model: ModelSize,
    pub device: Device,
}

/// Point-in-time session snapshot for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub model: Option<ModelSize>,
    pub device: Option<Device>,
    pub model_loaded: bool,
}

/// The session lifecycle manager: single source of truth for whether the
/// process is idle, recording, or transcribing.
///
/// The phase is the sole arbiter of legal operations. It is read lock-free
/// so status and level queries stay responsive while a multi-second model
/// load or transcription is in flight; the operations themselves serialize
/// through one async mutex. Calls rejected by the phase never wait on that
/// mutex.
pub struct SessionManager {
    phase: AtomicSessionPhase,
    audio: Arc<dyn AudioSource>,
    engine: Mutex<Option<Arc<dyn RecognitionEngine>>>,
    factory: EngineFactory,
    language: Mutex<Option<String>>,
    op: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(audio: Arc<dyn AudioSource>, factory: EngineFactory) -> Self {
        Self {
            phase: AtomicSessionPhase::default(),
            audio,
            engine: Mutex::new(None),
            factory,
            language: Mutex::new(None),
            op: tokio::sync::Mutex::new(()),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.load()
    }

    /// Start a recording session.
    ///
    /// Reuses the existing engine when `(model size, requested device)`
    /// match exactly; otherwise the slot is replaced with a fresh engine
    /// and the old one is simply dropped.
    pub async fn start(
        &self,
        model_size: ModelSize,
        device: RequestedDevice,
        language: Option<String>,
        device_index: Option<usize>,
    ) -> Result<StartOutcome, DomainError> {
        if !self.phase.load().can_start() {
            return Err(DomainError::AlreadyRecording);
        }
        let _op = self.op.lock().await;
        if !self.phase.load().can_start() {
            return Err(DomainError::AlreadyRecording);
        }

        let requested = EngineConfig {
            model_size,
            requested_device: device,
        };
        let engine = self.obtain_engine(requested)?;

        info!(
            model = %model_size,
            requested_device = %device,
            resolved_device = %engine.resolved_device(),
            mic_index = ?device_index,
            "Starting recording session"
        );

        self.audio.clear_buffer();
        *self.language.lock() = language;

        if let Err(e) = self.audio.start_capture(device_index).await {
            error!(error = %e, "Failed to start audio capture");
            // Best-effort teardown; the session must not be left stuck
            // mid-transition.
            let _ = self.audio.stop_capture().await;
            self.phase.store(SessionPhase::Idle);
            return Err(e);
        }

        self.phase.store(SessionPhase::Recording);
        info!("Recording started");

        Ok(StartOutcome {
            model: model_size,
            device: engine.resolved_device(),
            model_downloaded: engine.is_model_downloaded(),
        })
    }

    /// Stop recording, transcribe everything captured, and return to idle
    /// no matter how transcription went.
    pub async fn stop(&self) -> Result<StopOutcome, DomainError> {
        if !self.phase.load().can_stop() {
            return Err(DomainError::NotRecording);
        }
        let _op = self.op.lock().await;
        if !self.phase.compare_exchange(SessionPhase::Recording, SessionPhase::Transcribing) {
            return Err(DomainError::NotRecording);
        }

        let result = self.finish_recording().await;
        self.phase.store(SessionPhase::Idle);
        result
    }

    async fn finish_recording(&self) -> Result<StopOutcome, DomainError> {
        let samples = self.audio.stop_capture().await?;

        let engine = self
            .engine
            .lock()
            .clone()
            .ok_or_else(|| DomainError::Transcription("No engine configured".to_string()))?;
        let model = engine.config().model_size;

        if samples.is_empty() {
            info!("No audio captured");
            return Ok(StopOutcome {
                text: String::new(),
                language: None,
                language_probability: None,
                duration_secs: 0.0,
                transcription_time_ms: 0,
                segments: Vec::new(),
                model,
                device: engine.resolved_device(),
            });
        }

        info!(
            duration_secs = samples.len() as f32 / 16_000.0,
            "Transcribing recording"
        );

        // GPU-library absence surfaces here as a load failure; it is
        // reported, never auto-provisioned mid-session.
        if !engine.is_loaded() {
            engine.load().await?;
        }

        let language = self.language.lock().clone();
        let started = Instant::now();
        let outcome = engine.transcribe(samples, language).await;
        let transcription_time_ms = started.elapsed().as_millis() as u64;

        if !outcome.success {
            let reason = outcome
                .error
                .unwrap_or_else(|| "Transcription failed".to_string());
            return Err(DomainError::Transcription(reason));
        }

        info!(
            text_len = outcome.text.len(),
            transcription_time_ms,
            device = %engine.resolved_device(),
            "Transcription finished"
        );

        Ok(StopOutcome {
            text: outcome.text,
            language: outcome.language,
            language_probability: outcome.language_probability,
            duration_secs: outcome.duration_secs,
            transcription_time_ms,
            segments: outcome.segments,
            model,
            device: engine.resolved_device(),
        })
    }

    /// Abort the recording and discard everything captured so far.
    pub async fn cancel(&self) -> Result<(), DomainError> {
        if !self.phase.load().can_stop() {
            return Err(DomainError::NotRecording);
        }
        let _op = self.op.lock().await;
        if !self.phase.load().can_stop() {
            return Err(DomainError::NotRecording);
        }

        let result = self.audio.stop_capture().await;
        self.audio.clear_buffer();
        self.phase.store(SessionPhase::Idle);

        match result {
            Ok(samples) => {
                info!(discarded_samples = samples.len(), "Recording canceled");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Audio source failed while canceling");
                Err(e)
            }
        }
    }

    /// Live input level for a meter, in [0, 1].
    ///
    /// Samples the most recently queued chunks without consuming them, so
    /// the eventual transcription buffer is never perturbed. Best-effort:
    /// chunks may arrive between this peek and the final drain.
    pub fn audio_level(&self) -> f32 {
        if self.phase.load() != SessionPhase::Recording {
            return 0.0;
        }

        let chunks = self.audio.peek_recent_chunks(LEVEL_PEEK_CHUNKS);
        if chunks.is_empty() {
            return 0.0;
        }

        let samples: Vec<f32> = chunks.into_iter().flatten().collect();
        let level = rms(&samples) * LEVEL_GAIN;
        debug!(level, "Audio level sampled");
        level.clamp(0.0, 1.0)
    }

    /// Snapshot of the session for status/health queries. Lock-free on
    /// the phase, so it never blocks behind an in-flight operation.
    pub fn status(&self) -> SessionStatus {
        let engine = self.engine.lock().clone();
        SessionStatus {
            phase: self.phase.load(),
            model: engine.as_ref().map(|e| e.config().model_size),
            device: engine.as_ref().map(|e| e.resolved_device()),
            model_loaded: engine.map(|e| e.is_loaded()).unwrap_or(false),
        }
    }

    fn obtain_engine(
        &self,
        requested: EngineConfig,
    ) -> Result<Arc<dyn RecognitionEngine>, DomainError> {
        let mut slot = self.engine.lock();

        if let Some(engine) = slot.as_ref() {
            if engine.config() == requested {
                debug!(model = %requested.model_size, "Reusing existing engine");
                return Ok(Arc::clone(engine));
            }
        }

        let engine = (self.factory)(requested)?;
        *slot = Some(Arc::clone(&engine));
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ComputePrecision, TranscriptionOutcome, WHISPER_SAMPLE_RATE};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockAudioSource {
        queue: Mutex<VecDeque<Vec<f32>>>,
        capturing: AtomicBool,
        fail_start: bool,
    }

    impl MockAudioSource {
        fn new() -> Self {
            Self {
                queue: Mutex::new(VecDeque::new()),
                capturing: AtomicBool::new(false),
                fail_start: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_start: true,
                ..Self::new()
            }
        }

        fn push_chunk(&self, chunk: Vec<f32>) {
            self.queue.lock().push_back(chunk);
        }

        fn queued_chunks(&self) -> usize {
            self.queue.lock().len()
        }
    }

    #[async_trait]
    impl AudioSource for MockAudioSource {
        async fn start_capture(&self, _device_index: Option<usize>) -> Result<(), DomainError> {
            if self.fail_start {
                return Err(DomainError::AudioDevice("no microphone".to_string()));
            }
            self.capturing.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop_capture(&self) -> Result<Vec<f32>, DomainError> {
            self.capturing.store(false, Ordering::SeqCst);
            let mut queue = self.queue.lock();
            let mut samples = Vec::new();
            while let Some(chunk) = queue.pop_front() {
                samples.extend_from_slice(&chunk);
            }
            Ok(samples)
        }

        fn clear_buffer(&self) {
            self.queue.lock().clear();
        }

        fn peek_recent_chunks(&self, max_chunks: usize) -> Vec<Vec<f32>> {
            let queue = self.queue.lock();
            let skip = queue.len().saturating_sub(max_chunks);
            queue.iter().skip(skip).cloned().collect()
        }

        fn is_capturing(&self) -> bool {
            self.capturing.load(Ordering::SeqCst)
        }

        fn list_devices(&self) -> Result<Vec<crate::domain::AudioDevice>, DomainError> {
            Ok(Vec::new())
        }
    }

    struct MockEngine {
        config: EngineConfig,
        device: Device,
        loaded: AtomicBool,
        load_calls: AtomicUsize,
        transcribe_calls: AtomicUsize,
        fail_load: bool,
        fail_transcribe: bool,
        text: String,
    }

    impl MockEngine {
        fn new(config: EngineConfig, device: Device) -> Self {
            Self {
                config,
                device,
                loaded: AtomicBool::new(false),
                load_calls: AtomicUsize::new(0),
                transcribe_calls: AtomicUsize::new(0),
                fail_load: false,
                fail_transcribe: false,
                text: "hello world".to_string(),
            }
        }
    }

    #[async_trait]
    impl RecognitionEngine for MockEngine {
        fn config(&self) -> EngineConfig {
            self.config
        }

        fn resolved_device(&self) -> Device {
            self.device
        }

        fn precision(&self) -> ComputePrecision {
            ComputePrecision::for_device(self.device)
        }

        fn is_loaded(&self) -> bool {
            self.loaded.load(Ordering::SeqCst)
        }

        async fn load(&self) -> Result<(), DomainError> {
            self.load_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_load {
                return Err(DomainError::ModelLoad {
                    device: self.device,
                    message: "mock load failure".to_string(),
                });
            }
            self.loaded.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn transcribe(
            &self,
            samples: Vec<f32>,
            language: Option<String>,
        ) -> TranscriptionOutcome {
            self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
            let duration_secs = samples.len() as f32 / WHISPER_SAMPLE_RATE as f32;
            if self.fail_transcribe {
                return TranscriptionOutcome::failure("mock inference error", duration_secs);
            }
            TranscriptionOutcome {
                success: true,
                text: self.text.clone(),
                segments: Vec::new(),
                language: language.clone().or_else(|| Some("en".to_string())),
                language_probability: language.map(|_| 1.0),
                duration_secs,
                error: None,
            }
        }

        fn is_model_downloaded(&self) -> bool {
            false
        }
    }

    struct Harness {
        session: SessionManager,
        audio: Arc<MockAudioSource>,
        engines: Arc<Mutex<Vec<Arc<MockEngine>>>>,
        factory_calls: Arc<AtomicUsize>,
    }

    fn harness_with(audio: MockAudioSource, build: impl Fn(EngineConfig) -> MockEngine + Send + Sync + 'static) -> Harness {
        let audio = Arc::new(audio);
        let engines: Arc<Mutex<Vec<Arc<MockEngine>>>> = Arc::new(Mutex::new(Vec::new()));
        let factory_calls = Arc::new(AtomicUsize::new(0));

        let factory_engines = Arc::clone(&engines);
        let factory_count = Arc::clone(&factory_calls);
        let factory: EngineFactory = Box::new(move |config| {
            factory_count.fetch_add(1, Ordering::SeqCst);
            let engine = Arc::new(build(config));
            factory_engines.lock().push(Arc::clone(&engine));
            Ok(engine)
        });

        Harness {
            session: SessionManager::new(audio.clone(), factory),
            audio,
            engines,
            factory_calls,
        }
    }

    fn harness() -> Harness {
        harness_with(MockAudioSource::new(), |config| {
            MockEngine::new(config, Device::Cpu)
        })
    }

    async fn start_default(h: &Harness) -> StartOutcome {
        h.session
            .start(ModelSize::Small, RequestedDevice::Cpu, Some("en".to_string()), None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_stop_with_zero_audio_skips_load_path() {
        let sizes = [
            ModelSize::Tiny,
            ModelSize::Base,
            ModelSize::Small,
            ModelSize::Medium,
            ModelSize::LargeV3,
            ModelSize::LargeV3Turbo,
        ];
        let devices = [
            RequestedDevice::Auto,
            RequestedDevice::Cpu,
            RequestedDevice::Gpu,
        ];

        for size in sizes {
            for device in devices {
                let h = harness();
                h.session.start(size, device, None, None).await.unwrap();

                let outcome = h.session.stop().await.unwrap();
                assert_eq!(outcome.text, "");
                assert_eq!(outcome.duration_secs, 0.0);
                assert_eq!(outcome.model, size);
                assert_eq!(h.session.phase(), SessionPhase::Idle);

                let engine = h.engines.lock()[0].clone();
                assert_eq!(engine.load_calls.load(Ordering::SeqCst), 0);
                assert_eq!(engine.transcribe_calls.load(Ordering::SeqCst), 0);
            }
        }
    }

    #[tokio::test]
    async fn test_start_twice_fails_and_leaves_first_session() {
        let h = harness();
        start_default(&h).await;

        let err = h
            .session
            .start(ModelSize::Small, RequestedDevice::Cpu, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::AlreadyRecording));
        assert_eq!(h.session.phase(), SessionPhase::Recording);
        assert!(h.audio.is_capturing());
    }

    #[tokio::test]
    async fn test_stop_and_cancel_require_recording() {
        let h = harness();
        assert!(matches!(
            h.session.stop().await.unwrap_err(),
            DomainError::NotRecording
        ));
        assert!(matches!(
            h.session.cancel().await.unwrap_err(),
            DomainError::NotRecording
        ));
        assert_eq!(h.session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_three_seconds_of_silence() {
        let h = harness_with(MockAudioSource::new(), |config| {
            let mut engine = MockEngine::new(config, Device::Cpu);
            engine.text = String::new();
            engine
        });
        start_default(&h).await;

        for _ in 0..3 {
            h.audio.push_chunk(vec![0.0; WHISPER_SAMPLE_RATE as usize]);
        }

        let outcome = h.session.stop().await.unwrap();
        assert!(outcome.text.trim().is_empty());
        assert!((outcome.duration_secs - 3.0).abs() < 1e-3);
        assert_eq!(h.session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_engine_reused_for_matching_config() {
        let h = harness();

        start_default(&h).await;
        h.session.stop().await.unwrap();
        start_default(&h).await;
        h.session.stop().await.unwrap();

        assert_eq!(h.factory_calls.load(Ordering::SeqCst), 1);

        // A different model size forces a fresh engine.
        h.session
            .start(ModelSize::Medium, RequestedDevice::Cpu, None, None)
            .await
            .unwrap();
        h.session.stop().await.unwrap();
        assert_eq!(h.factory_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fallback_device_is_reported() {
        // Engine resolved to CPU even though GPU was requested, as after
        // a load-time fallback.
        let h = harness_with(MockAudioSource::new(), |config| {
            MockEngine::new(config, Device::Cpu)
        });

        h.session
            .start(ModelSize::Small, RequestedDevice::Gpu, None, None)
            .await
            .unwrap();
        h.audio.push_chunk(vec![0.1; 1600]);

        let outcome = h.session.stop().await.unwrap();
        assert_eq!(outcome.device, Device::Cpu);
        assert_eq!(h.session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_cancel_discards_without_transcribing() {
        let h = harness();
        start_default(&h).await;
        h.audio.push_chunk(vec![0.5; 1600]);

        h.session.cancel().await.unwrap();
        assert_eq!(h.session.phase(), SessionPhase::Idle);
        assert_eq!(h.audio.queued_chunks(), 0);

        let engine = h.engines.lock()[0].clone();
        assert_eq!(engine.transcribe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_failure_returns_to_idle() {
        let h = harness_with(MockAudioSource::failing(), |config| {
            MockEngine::new(config, Device::Cpu)
        });

        let err = h
            .session
            .start(ModelSize::Small, RequestedDevice::Cpu, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::AudioDevice(_)));
        assert_eq!(h.session.phase(), SessionPhase::Idle);

        // The session is usable again once the device comes back.
        assert!(matches!(
            h.session.stop().await.unwrap_err(),
            DomainError::NotRecording
        ));
    }

    #[tokio::test]
    async fn test_load_failure_surfaces_and_returns_to_idle() {
        let h = harness_with(MockAudioSource::new(), |config| {
            let mut engine = MockEngine::new(config, Device::Cpu);
            engine.fail_load = true;
            engine
        });
        start_default(&h).await;
        h.audio.push_chunk(vec![0.1; 1600]);

        let err = h.session.stop().await.unwrap_err();
        assert!(matches!(err, DomainError::ModelLoad { .. }));
        assert_eq!(h.session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_transcription_failure_surfaces_and_returns_to_idle() {
        let h = harness_with(MockAudioSource::new(), |config| {
            let mut engine = MockEngine::new(config, Device::Cpu);
            engine.fail_transcribe = true;
            engine
        });
        start_default(&h).await;
        h.audio.push_chunk(vec![0.1; 1600]);

        let err = h.session.stop().await.unwrap_err();
        assert!(matches!(err, DomainError::Transcription(_)));
        assert_eq!(h.session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_audio_level_metering() {
        let h = harness();
        assert_eq!(h.session.audio_level(), 0.0);

        start_default(&h).await;
        assert_eq!(h.session.audio_level(), 0.0);

        h.audio.push_chunk(vec![0.25; 1600]);
        h.audio.push_chunk(vec![0.25; 1600]);

        let level = h.session.audio_level();
        assert!(level > 0.0 && level <= 1.0);

        // Peeking never consumes: the full buffer still reaches stop.
        assert_eq!(h.audio.queued_chunks(), 2);
        let outcome = h.session.stop().await.unwrap();
        assert!((outcome.duration_secs - 0.2).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_level_clamped_to_one() {
        let h = harness();
        start_default(&h).await;
        h.audio.push_chunk(vec![1.0; 1600]);

        assert_eq!(h.session.audio_level(), 1.0);
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let h = harness();
        let status = h.session.status();
        assert_eq!(status.phase, SessionPhase::Idle);
        assert!(status.model.is_none());

        start_default(&h).await;
        let status = h.session.status();
        assert_eq!(status.phase, SessionPhase::Recording);
        assert_eq!(status.model, Some(ModelSize::Small));
        assert_eq!(status.device, Some(Device::Cpu));
        assert!(!status.model_loaded);
    }

    #[tokio::test]
    async fn test_stale_audio_cleared_on_start() {
        let h = harness();
        h.audio.push_chunk(vec![0.9; 1600]);

        start_default(&h).await;
        let outcome = h.session.stop().await.unwrap();
        // The stale chunk from before the session never reaches the
        // transcript.
        assert_eq!(outcome.duration_secs, 0.0);
    }
}
