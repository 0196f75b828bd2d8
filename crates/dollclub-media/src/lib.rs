//! # dollclub-media
//!
//! Local media pipeline for broadcasts: cpal capture/playback, the gapless
//! playback scheduler for synthesized co-host audio, the PCM/JPEG framing
//! codecs, and the broadcast session state machine.

pub mod audio;
pub mod capture;
pub mod codec;
pub mod sched;
pub mod session;
pub mod video;

pub use audio::{AudioEngine, CaptureFormat, PlaybackFrame};
pub use capture::{open_user_media, CaptureConstraints, FrameSource, MediaStream, RawFrame};
pub use sched::{AudioScheduler, Clock, SystemClock};
pub use session::{BroadcastSession, SessionError};
pub use video::VideoSampler;
