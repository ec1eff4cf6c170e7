use serde::{Deserialize, Serialize};

/// Whisper model sizes supported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelSize {
    #[serde(rename = "tiny")]
    Tiny,
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "small")]
    Small,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "large-v3")]
    LargeV3,
    #[serde(rename = "large-v3-turbo")]
    LargeV3Turbo,
}

impl ModelSize {
    /// Canonical model name as it appears on the wire and in file names.
    pub fn name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::LargeV3 => "large-v3",
            ModelSize::LargeV3Turbo => "large-v3-turbo",
        }
    }

    /// Parse a model size from its canonical name.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Some(ModelSize::Tiny),
            "base" => Some(ModelSize::Base),
            "small" => Some(ModelSize::Small),
            "medium" => Some(ModelSize::Medium),
            "large-v3" => Some(ModelSize::LargeV3),
            "large-v3-turbo" => Some(ModelSize::LargeV3Turbo),
            _ => None,
        }
    }

    /// File name of the GGML weights in the model cache.
    pub fn file_name(&self) -> String {
        format!("ggml-{}.bin", self.name())
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Compute device requested by the caller.
///
/// `cuda` is accepted as a wire alias for `gpu` for compatibility with
/// clients written against the original device naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedDevice {
    #[default]
    Auto,
    Cpu,
    #[serde(alias = "cuda")]
    Gpu,
}

impl std::fmt::Display for RequestedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestedDevice::Auto => "auto",
            RequestedDevice::Cpu => "cpu",
            RequestedDevice::Gpu => "gpu",
        };
        write!(f, "{}", s)
    }
}

/// Compute device actually in use after auto-detection and any fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Gpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu => "gpu",
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute precision, derived from the resolved device: float16 for GPU
/// throughput, int8 for CPU efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputePrecision {
    Float16,
    Int8,
}

impl ComputePrecision {
    pub fn for_device(device: Device) -> Self {
        match device {
            Device::Gpu => ComputePrecision::Float16,
            Device::Cpu => ComputePrecision::Int8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComputePrecision::Float16 => "float16",
            ComputePrecision::Int8 => "int8",
        }
    }
}

/// Engine identity. Two requests with equal configs may share one engine
/// instance; any mismatch forces a fresh instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub model_size: ModelSize,
    pub requested_device: RequestedDevice,
}

impl EngineConfig {
    /// Tentatively resolve the requested device against the accelerator
    /// probe result. Actual usability is only confirmed at load time.
    pub fn resolve(&self, accelerator_present: bool) -> (Device, ComputePrecision) {
        let device = match self.requested_device {
            RequestedDevice::Cpu => Device::Cpu,
            RequestedDevice::Gpu => Device::Gpu,
            RequestedDevice::Auto => {
                if accelerator_present {
                    Device::Gpu
                } else {
                    Device::Cpu
                }
            }
        };
        (device, ComputePrecision::for_device(device))
    }
}

/// A timed span of the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Start offset in seconds.
    pub start: f32,
    /// End offset in seconds.
    pub end: f32,
    pub text: String,
}

/// Result of a transcription call. Engine-internal failures are reported
/// through `success`/`error` rather than propagated, so callers must check
/// the flag.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionOutcome {
    pub success: bool,
    pub text: String,
    pub segments: Vec<Segment>,
    /// Detected language (ISO 639-1 code).
    pub language: Option<String>,
    /// Confidence of the language detection, when the backend exposes one.
    pub language_probability: Option<f32>,
    /// Duration of the transcribed audio in seconds.
    pub duration_secs: f32,
    pub error: Option<String>,
}

impl TranscriptionOutcome {
    pub fn failure(reason: impl Into<String>, duration_secs: f32) -> Self {
        Self {
            success: false,
            text: String::new(),
            segments: Vec::new(),
            language: None,
            language_probability: None,
            duration_secs,
            error: Some(reason.into()),
        }
    }
}

/// Catalog of downloadable model weights, embedded at build time.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelCatalog {
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub size: ModelSize,
    pub url: String,
    pub approx_bytes: u64,
}

impl ModelCatalog {
    pub fn get(&self, size: ModelSize) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.size == size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_size_names() {
        assert_eq!(ModelSize::LargeV3Turbo.name(), "large-v3-turbo");
        assert_eq!(ModelSize::from_name("Large-V3"), Some(ModelSize::LargeV3));
        assert_eq!(ModelSize::from_name("huge"), None);
        assert_eq!(ModelSize::Small.file_name(), "ggml-small.bin");
    }

    #[test]
    fn test_requested_device_cuda_alias() {
        let device: RequestedDevice = serde_json::from_str("\"cuda\"").unwrap();
        assert_eq!(device, RequestedDevice::Gpu);
        let device: RequestedDevice = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(device, RequestedDevice::Auto);
    }

    #[test]
    fn test_device_resolution() {
        let auto = EngineConfig {
            model_size: ModelSize::Small,
            requested_device: RequestedDevice::Auto,
        };
        assert_eq!(auto.resolve(true), (Device::Gpu, ComputePrecision::Float16));
        assert_eq!(auto.resolve(false), (Device::Cpu, ComputePrecision::Int8));

        let cpu = EngineConfig {
            requested_device: RequestedDevice::Cpu,
            ..auto
        };
        // An explicit CPU request ignores the accelerator.
        assert_eq!(cpu.resolve(true), (Device::Cpu, ComputePrecision::Int8));

        let gpu = EngineConfig {
            requested_device: RequestedDevice::Gpu,
            ..auto
        };
        // An explicit GPU request is honored even without a probe hit;
        // load-time fallback handles the miss.
        assert_eq!(gpu.resolve(false), (Device::Gpu, ComputePrecision::Float16));
    }

    #[test]
    fn test_engine_config_reuse_key() {
        let a = EngineConfig {
            model_size: ModelSize::Small,
            requested_device: RequestedDevice::Auto,
        };
        let b = a;
        assert_eq!(a, b);
        let c = EngineConfig {
            model_size: ModelSize::Medium,
            ..a
        };
        assert_ne!(a, c);
    }
}
