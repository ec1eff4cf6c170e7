use async_trait::async_trait;

use crate::domain::{AudioDevice, DomainError};

/// Port for microphone capture.
///
/// Implementations produce mono 16 kHz f32 PCM chunks into an unbounded
/// queue while capture is active. Sessions are short, human-speech-length
/// recordings, so the queue is deliberately never bounded and no chunk is
/// ever dropped.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Start capturing from the given device index, or the system default
    /// input device when `None`.
    ///
    /// Returns an error if capture is already active or the device cannot
    /// be opened.
    async fn start_capture(&self, device_index: Option<usize>) -> Result<(), DomainError>;

    /// Stop capturing and return every queued chunk concatenated into one
    /// contiguous buffer. Returns an empty buffer when nothing arrived.
    async fn stop_capture(&self) -> Result<Vec<f32>, DomainError>;

    /// Discard any queued audio without stopping capture.
    fn clear_buffer(&self);

    /// Clone up to the `max_chunks` most recently queued chunks, oldest
    /// first, without removing anything from the queue. Used for level
    /// metering only; must never perturb what `stop_capture` will return.
    fn peek_recent_chunks(&self, max_chunks: usize) -> Vec<Vec<f32>>;

    /// Whether a capture stream is currently running.
    fn is_capturing(&self) -> bool;

    /// List available input devices.
    fn list_devices(&self) -> Result<Vec<AudioDevice>, DomainError>;
}
