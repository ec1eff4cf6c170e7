use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::domain::{AudioConfig, AudioDevice, DomainError};
use crate::ports::AudioSource;

/// Unbounded FIFO of capture chunks. One chunk per stream callback, mono
/// f32 at the target rate. The callback's critical section is a single
/// push, and the queue never applies backpressure, so no chunk is dropped.
type ChunkQueue = Arc<Mutex<VecDeque<Vec<f32>>>>;

/// Commands sent to the audio thread.
enum CaptureCommand {
    Start {
        device_index: Option<usize>,
        reply: oneshot::Sender<Result<(), DomainError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<Vec<f32>, DomainError>>,
    },
    Shutdown,
}

/// Audio processing utilities.
mod capture {
    use super::*;

    pub fn get_device(device_index: Option<usize>) -> Result<Device, DomainError> {
        let host = cpal::default_host();

        if let Some(index) = device_index {
            let mut devices = host.input_devices().map_err(|e| {
                DomainError::AudioDevice(format!("Failed to enumerate devices: {}", e))
            })?;

            return devices.nth(index).ok_or_else(|| {
                DomainError::AudioDevice(format!("No input device at index {}", index))
            });
        }

        host.default_input_device()
            .ok_or_else(|| DomainError::AudioDevice("No default input device available".to_string()))
    }

    pub fn build_stream_config(device: &Device) -> Result<(StreamConfig, SampleFormat), DomainError> {
        let supported = device.default_input_config().map_err(|e| {
            DomainError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        debug!(
            sample_rate = ?supported.sample_rate(),
            channels = supported.channels(),
            format = ?supported.sample_format(),
            "Device default config"
        );

        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok((config, supported.sample_format()))
    }

    pub fn build_stream(
        device: &Device,
        config: &StreamConfig,
        sample_format: SampleFormat,
        target_sample_rate: u32,
        queue: ChunkQueue,
    ) -> Result<Stream, DomainError> {
        let channels = config.channels as usize;
        let device_sample_rate = config.sample_rate.0;

        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    push_chunk(data, channels, device_sample_rate, target_sample_rate, &queue);
                },
                move |err| {
                    error!(?err, "Audio stream error");
                },
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let f32_data: Vec<f32> =
                        data.iter().map(|&s| s as f32 / 32768.0).collect();
                    push_chunk(&f32_data, channels, device_sample_rate, target_sample_rate, &queue);
                },
                move |err| {
                    error!(?err, "Audio stream error");
                },
                None,
            ),
            _ => {
                return Err(DomainError::AudioDevice(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        }
        .map_err(|e| DomainError::AudioDevice(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }

    fn push_chunk(
        data: &[f32],
        channels: usize,
        device_sample_rate: u32,
        target_sample_rate: u32,
        queue: &ChunkQueue,
    ) {
        let mono = downmix_to_mono(data, channels);

        let chunk = if device_sample_rate != target_sample_rate {
            resample(&mono, device_sample_rate, target_sample_rate)
        } else {
            mono
        };

        if !chunk.is_empty() {
            queue.lock().push_back(chunk);
        }
    }

    pub fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
        if channels <= 1 {
            return data.to_vec();
        }
        data.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Linear interpolation resampler. Plenty for speech going into a
    /// 16 kHz recognition model.
    pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
        if from_rate == to_rate || samples.is_empty() {
            return samples.to_vec();
        }

        let ratio = from_rate as f64 / to_rate as f64;
        let output_len = (samples.len() as f64 / ratio).ceil() as usize;
        let mut output = Vec::with_capacity(output_len);

        for i in 0..output_len {
            let src_pos = i as f64 * ratio;
            let src_idx = src_pos.floor() as usize;
            let frac = src_pos.fract() as f32;

            let sample = if src_idx + 1 < samples.len() {
                let s0 = samples[src_idx];
                let s1 = samples[src_idx + 1];
                s0 + (s1 - s0) * frac
            } else if src_idx < samples.len() {
                samples[src_idx]
            } else {
                0.0
            };
            output.push(sample);
        }
        output
    }

    /// Clone up to the `max_chunks` newest entries, oldest first, leaving
    /// the queue untouched.
    pub fn recent_chunks(queue: &VecDeque<Vec<f32>>, max_chunks: usize) -> Vec<Vec<f32>> {
        let skip = queue.len().saturating_sub(max_chunks);
        queue.iter().skip(skip).cloned().collect()
    }
}

/// Audio thread runner - creates the Stream on the audio thread because
/// cpal streams are not Send.
fn capture_thread_main(
    target_sample_rate: u32,
    queue: ChunkQueue,
    capturing: Arc<AtomicBool>,
    mut cmd_rx: mpsc::Receiver<CaptureCommand>,
) {
    let mut stream: Option<Stream> = None;

    while let Some(cmd) = cmd_rx.blocking_recv() {
        match cmd {
            CaptureCommand::Start { device_index, reply } => {
                let result = (|| -> Result<(), DomainError> {
                    if stream.is_some() {
                        return Err(DomainError::AlreadyRecording);
                    }

                    let device = capture::get_device(device_index)?;
                    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
                    let (stream_config, sample_format) = capture::build_stream_config(&device)?;

                    let new_stream = capture::build_stream(
                        &device,
                        &stream_config,
                        sample_format,
                        target_sample_rate,
                        Arc::clone(&queue),
                    )?;

                    new_stream
                        .play()
                        .map_err(|e| DomainError::AudioDevice(format!("Failed to start stream: {}", e)))?;

                    stream = Some(new_stream);
                    capturing.store(true, Ordering::Release);

                    info!(device = %device_name, "Capture started");
                    Ok(())
                })();
                let _ = reply.send(result);
            }
            CaptureCommand::Stop { reply } => {
                let result = (|| -> Result<Vec<f32>, DomainError> {
                    if stream.take().is_none() {
                        return Err(DomainError::NotRecording);
                    }
                    capturing.store(false, Ordering::Release);

                    // Drain every queued chunk into one contiguous buffer.
                    let mut chunks = queue.lock();
                    let total: usize = chunks.iter().map(|c| c.len()).sum();
                    let mut samples = Vec::with_capacity(total);
                    while let Some(chunk) = chunks.pop_front() {
                        samples.extend_from_slice(&chunk);
                    }

                    info!(samples = samples.len(), "Capture stopped");
                    Ok(samples)
                })();
                let _ = reply.send(result);
            }
            CaptureCommand::Shutdown => {
                break;
            }
        }
    }
    debug!("Audio thread shutting down");
}

/// cpal-based microphone source.
///
/// Uses a dedicated audio thread to handle the non-Send Stream type.
pub struct CpalAudioSource {
    config: AudioConfig,
    queue: ChunkQueue,
    capturing: Arc<AtomicBool>,
    cmd_tx: mpsc::Sender<CaptureCommand>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl CpalAudioSource {
    /// Create a new CpalAudioSource with default configuration.
    pub fn new() -> Result<Self, DomainError> {
        Self::with_config(AudioConfig::default())
    }

    /// Create a new CpalAudioSource with custom configuration.
    pub fn with_config(config: AudioConfig) -> Result<Self, DomainError> {
        let queue: ChunkQueue = Arc::new(Mutex::new(VecDeque::new()));
        let capturing = Arc::new(AtomicBool::new(false));

        let (cmd_tx, cmd_rx) = mpsc::channel(16);

        let thread_queue = Arc::clone(&queue);
        let thread_capturing = Arc::clone(&capturing);
        let target_sample_rate = config.sample_rate;

        let thread_handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                capture_thread_main(target_sample_rate, thread_queue, thread_capturing, cmd_rx)
            })
            .map_err(|e| DomainError::AudioDevice(format!("Failed to spawn audio thread: {}", e)))?;

        info!(sample_rate = config.sample_rate, "CpalAudioSource initialized");

        Ok(Self {
            config,
            queue,
            capturing,
            cmd_tx,
            thread_handle: Mutex::new(Some(thread_handle)),
        })
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }
}

impl Drop for CpalAudioSource {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(CaptureCommand::Shutdown);

        if let Some(handle) = self.thread_handle.lock().take() {
            let _ = handle.join();
        }
    }
}

#[async_trait]
impl AudioSource for CpalAudioSource {
    async fn start_capture(&self, device_index: Option<usize>) -> Result<(), DomainError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.cmd_tx
            .send(CaptureCommand::Start {
                device_index,
                reply: reply_tx,
            })
            .await
            .map_err(|_| DomainError::AudioDevice("Audio thread not running".to_string()))?;

        reply_rx
            .await
            .map_err(|_| DomainError::AudioDevice("Audio thread did not respond".to_string()))?
    }

    async fn stop_capture(&self) -> Result<Vec<f32>, DomainError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.cmd_tx
            .send(CaptureCommand::Stop { reply: reply_tx })
            .await
            .map_err(|_| DomainError::AudioDevice("Audio thread not running".to_string()))?;

        reply_rx
            .await
            .map_err(|_| DomainError::AudioDevice("Audio thread did not respond".to_string()))?
    }

    fn clear_buffer(&self) {
        let mut queue = self.queue.lock();
        let discarded = queue.len();
        queue.clear();
        if discarded > 0 {
            debug!(chunks = discarded, "Cleared stale audio");
        }
    }

    fn peek_recent_chunks(&self, max_chunks: usize) -> Vec<Vec<f32>> {
        capture::recent_chunks(&self.queue.lock(), max_chunks)
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>, DomainError> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let devices = host
            .input_devices()
            .map_err(|e| DomainError::AudioDevice(format!("Failed to enumerate devices: {}", e)))?;

        let mut result = Vec::new();
        for (index, device) in devices.enumerate() {
            match device.name() {
                Ok(name) => {
                    result.push(AudioDevice {
                        index,
                        is_default: Some(&name) == default_name.as_ref(),
                        name,
                    });
                }
                Err(e) => {
                    warn!(index, error = %e, "Skipping unnamed input device");
                }
            }
        }

        debug!(count = result.len(), "Listed input devices");
        Ok(result)
    }
}
