//! User-media acquisition: the camera+microphone handle a broadcast owns.
//!
//! Audio comes from the default cpal input device.  The physical camera is
//! platform glue outside this crate; callers inject a [`FrameSource`] that
//! pushes raw RGB frames, and the stream owns its lifetime.

use tokio::sync::mpsc;
use tracing::{debug, info};

use dollclub_shared::constants::FRAME_CHANNEL_CAPACITY;
use dollclub_shared::error::MediaError;

use crate::audio::{AudioEngine, CaptureFormat};

#[derive(Debug, Clone, Copy)]
pub struct CaptureConstraints {
    pub audio: bool,
    pub video: bool,
}

/// One uncompressed camera frame, tightly packed RGB8.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// A camera device delivering raw frames into the provided channel until
/// stopped.
pub trait FrameSource: Send {
    fn start(&mut self, frame_tx: mpsc::Sender<RawFrame>) -> Result<(), MediaError>;
    fn stop(&mut self);
}

/// The exclusive camera+microphone handle owned by one broadcast session.
pub struct MediaStream {
    audio_rx: Option<mpsc::Receiver<Vec<f32>>>,
    video_rx: Option<mpsc::Receiver<RawFrame>>,
    format: CaptureFormat,
    engine: AudioEngine,
    camera: Option<Box<dyn FrameSource>>,
    stopped: bool,
}

impl MediaStream {
    /// Capture format the input device was opened with.
    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    /// Take the audio frame receiver.  Yields interleaved f32 frames at the
    /// device format.  Returns `None` after the first call.
    pub fn take_audio_rx(&mut self) -> Option<mpsc::Receiver<Vec<f32>>> {
        self.audio_rx.take()
    }

    /// Take the camera frame receiver.  Returns `None` after the first call
    /// or when video was not requested.
    pub fn take_video_rx(&mut self) -> Option<mpsc::Receiver<RawFrame>> {
        self.video_rx.take()
    }

    /// Release the devices.  Idempotent; also runs on drop.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.engine.stop();
        if let Some(camera) = self.camera.as_mut() {
            camera.stop();
        }
        debug!("Media stream released");
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Request camera/microphone access and open the capture pipelines.
///
/// Fails with [`MediaError::PermissionDenied`] when the host refuses device
/// access; the caller stays idle and may retry.
pub fn open_user_media(
    constraints: CaptureConstraints,
    mut camera: Option<Box<dyn FrameSource>>,
) -> Result<MediaStream, MediaError> {
    let mut engine = AudioEngine::new();

    let (audio_rx, format) = if constraints.audio {
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let format = engine.start_capture(tx)?;
        (Some(rx), format)
    } else {
        (
            None,
            CaptureFormat {
                sample_rate: 0,
                channels: 0,
            },
        )
    };

    let video_rx = match (&mut camera, constraints.video) {
        (Some(source), true) => {
            let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
            if let Err(e) = source.start(tx) {
                // Release the microphone before reporting: every exit path
                // must leave no device held.
                engine.stop();
                return Err(e);
            }
            Some(rx)
        }
        _ => None,
    };

    info!(
        audio = constraints.audio,
        video = video_rx.is_some(),
        rate = format.sample_rate,
        "User media opened"
    );

    Ok(MediaStream {
        audio_rx,
        video_rx,
        format,
        engine,
        camera,
        stopped: false,
    })
}
