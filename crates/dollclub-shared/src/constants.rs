/// Application name
pub const APP_NAME: &str = "My Doll Club";

/// Sample rate of outbound microphone audio sent to the endpoint (Hz)
pub const SEND_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of inbound synthesized audio from the endpoint (Hz)
pub const RECV_SAMPLE_RATE: u32 = 24_000;

/// Content tag for outbound PCM audio chunks
pub const AUDIO_MIME: &str = "audio/pcm;rate=16000";

/// Content tag for outbound sampled video frames
pub const VIDEO_MIME: &str = "image/jpeg";

/// Outbound video sampling interval in milliseconds (1 frame per second)
pub const VIDEO_FRAME_INTERVAL_MS: u64 = 1_000;

/// JPEG quality for sampled video frames (0-100)
pub const JPEG_QUALITY: u8 = 70;

/// Maximum number of publications in the visible feed
pub const FEED_VISIBLE_LIMIT: usize = 50;

/// Default co-host model requested at endpoint setup
pub const DEFAULT_COHOST_MODEL: &str = "models/cohost-realtime-1";

/// Default synthetic voice requested at endpoint setup
pub const DEFAULT_COHOST_VOICE: &str = "Aria";

/// Capacity of the bounded capture frame channels
pub const FRAME_CHANNEL_CAPACITY: usize = 64;
