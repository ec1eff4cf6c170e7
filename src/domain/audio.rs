use serde::{Deserialize, Serialize};

/// Sample rate the recognition engine expects. All captured audio is
/// resampled to this rate before it is queued.
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Target sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels delivered to the engine (always mono).
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: WHISPER_SAMPLE_RATE,
            channels: 1,
        }
    }
}

/// Input audio device information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Enumeration index used to select the device at capture start.
    pub index: usize,
    /// Human-readable device name.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
}

/// Root-mean-square amplitude of a block of float samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}
