use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use dollclub_shared::constants::RECV_SAMPLE_RATE;
use dollclub_shared::error::MediaError;

/// Format the capture stream was actually opened with.  The device picks its
/// native rate; the codec layer resamples to the endpoint rate.
#[derive(Debug, Clone, Copy)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// One scheduled buffer handed to the playback engine.  The generation must
/// match the engine's current playback generation or the frame is dropped;
/// bumping the generation is the flush primitive for interruptions.
#[derive(Debug, Clone)]
pub struct PlaybackFrame {
    pub generation: u64,
    pub samples: Vec<f32>,
}

/// Capture frame length in milliseconds.
const FRAME_MS: u32 = 20;

pub struct AudioEngine {
    is_capturing: bool,
    active: Arc<AtomicBool>,
    /// Bumped to flush playback; frames from older generations are dropped
    /// wherever they are queued.
    generation: Arc<AtomicU64>,
}

impl AudioEngine {
    pub fn new() -> Self {
        Self {
            is_capturing: false,
            active: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared playback-generation counter.  Tag outgoing [`PlaybackFrame`]s
    /// with its current value; incrementing it flushes everything pending.
    pub fn playback_generation(&self) -> Arc<AtomicU64> {
        self.generation.clone()
    }

    /// Open the default input device and deliver fixed-length interleaved
    /// frames at the device's native format.
    pub fn start_capture(
        &mut self,
        frame_tx: tokio::sync::mpsc::Sender<Vec<f32>>,
    ) -> Result<CaptureFormat, MediaError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(MediaError::NoInputDevice)?;

        info!(device = ?device.name(), "Using input device");

        let supported = device
            .default_input_config()
            .map_err(|e| MediaError::Device(e.to_string()))?;
        let format = CaptureFormat {
            sample_rate: supported.sample_rate().0,
            channels: supported.channels(),
        };

        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let frame_size =
            (format.sample_rate as usize * format.channels as usize * FRAME_MS as usize) / 1000;
        let mut buffer = Vec::with_capacity(frame_size);
        let active = self.active.clone();

        active.store(true, Ordering::SeqCst);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if !active.load(Ordering::Relaxed) {
                        return;
                    }
                    buffer.extend_from_slice(data);
                    while buffer.len() >= frame_size {
                        let frame: Vec<f32> = buffer.drain(..frame_size).collect();
                        if frame_tx.try_send(frame).is_err() {
                            warn!("Audio frame channel full, dropping frame");
                        }
                    }
                },
                move |err| {
                    error!("Audio input error: {err}");
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => MediaError::PermissionDenied,
                other => MediaError::Stream(other.to_string()),
            })?;

        stream
            .play()
            .map_err(|e| MediaError::Stream(e.to_string()))?;

        // Keep stream alive (cleaned up via active flag — callback becomes no-op)
        std::mem::forget(stream);

        self.is_capturing = true;
        debug!(
            rate = format.sample_rate,
            channels = format.channels,
            "Audio capture started"
        );
        Ok(format)
    }

    /// Open the default output device at the co-host reply rate (24 kHz mono)
    /// and play whatever the scheduler releases, in order.
    pub fn start_playback(
        &mut self,
        mut frame_rx: tokio::sync::mpsc::Receiver<PlaybackFrame>,
    ) -> Result<(), MediaError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(MediaError::NoOutputDevice)?;

        info!(device = ?device.name(), "Using output device");

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(RECV_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let (playback_tx, playback_rx) = std::sync::mpsc::channel::<PlaybackFrame>();
        let active = self.active.clone();
        let generation = self.generation.clone();

        active.store(true, Ordering::SeqCst);

        // Bridge tokio channel to std channel for the audio callback
        let active_bridge = active.clone();
        tokio::spawn(async move {
            while active_bridge.load(Ordering::Relaxed) {
                match frame_rx.recv().await {
                    Some(frame) => {
                        if playback_tx.send(frame).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        });

        let mut play_buffer: std::collections::VecDeque<f32> = std::collections::VecDeque::new();
        let mut last_generation = generation.load(Ordering::Acquire);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    // A generation bump invalidates everything already
                    // admitted for playback.
                    let current = generation.load(Ordering::Acquire);
                    if current != last_generation {
                        play_buffer.clear();
                        last_generation = current;
                    }

                    // Drain available frames into play buffer, dropping
                    // stale generations that were queued before the flush.
                    while let Ok(frame) = playback_rx.try_recv() {
                        if frame.generation == current {
                            play_buffer.extend(frame.samples.iter());
                        }
                    }

                    for sample in data.iter_mut() {
                        *sample = play_buffer.pop_front().unwrap_or(0.0);
                    }
                },
                move |err| {
                    error!("Audio output error: {err}");
                },
                None,
            )
            .map_err(|e| MediaError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| MediaError::Stream(e.to_string()))?;

        std::mem::forget(stream);
        debug!("Audio playback started");
        Ok(())
    }

    pub fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.is_capturing = false;
        debug!("Audio engine stopped");
    }

    pub fn is_capturing(&self) -> bool {
        self.is_capturing
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}
