use std::time::{Duration, Instant};

use tracing::debug;

use dollclub_shared::constants::VIDEO_FRAME_INTERVAL_MS;
use dollclub_shared::error::MediaError;
use dollclub_shared::protocol::MediaChunk;

use crate::capture::RawFrame;
use crate::codec::encode_jpeg_frame;

/// Rate-limits camera frames to the endpoint's sampling interval and encodes
/// the ones that pass as JPEG media chunks.
pub struct VideoSampler {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl VideoSampler {
    pub fn new() -> Self {
        Self {
            interval: Duration::from_millis(VIDEO_FRAME_INTERVAL_MS),
            last_emit: None,
        }
    }

    #[cfg(test)]
    fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Offer one camera frame.  Returns an encoded chunk when the sampling
    /// interval has elapsed, `None` when the frame is dropped.
    pub fn sample(&mut self, frame: &RawFrame, now: Instant) -> Option<Result<MediaChunk, MediaError>> {
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.interval {
                return None;
            }
        }
        self.last_emit = Some(now);

        debug!(
            width = frame.width,
            height = frame.height,
            "Sampling video frame"
        );
        Some(encode_jpeg_frame(&frame.rgb, frame.width, frame.height))
    }
}

impl Default for VideoSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> RawFrame {
        RawFrame {
            width: 8,
            height: 8,
            rgb: vec![200u8; 8 * 8 * 3],
        }
    }

    #[test]
    fn first_frame_is_emitted() {
        let mut sampler = VideoSampler::new();
        assert!(sampler.sample(&frame(), Instant::now()).is_some());
    }

    #[test]
    fn frames_inside_the_interval_are_dropped() {
        let mut sampler = VideoSampler::with_interval(Duration::from_secs(1));
        let t0 = Instant::now();

        assert!(sampler.sample(&frame(), t0).is_some());
        assert!(sampler.sample(&frame(), t0 + Duration::from_millis(200)).is_none());
        assert!(sampler.sample(&frame(), t0 + Duration::from_millis(999)).is_none());
        assert!(sampler.sample(&frame(), t0 + Duration::from_millis(1001)).is_some());
    }
}
