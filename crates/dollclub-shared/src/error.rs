use thiserror::Error;

/// Errors from local device capture and playback.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Camera/microphone access denied")]
    PermissionDenied,

    #[error("No input device available")]
    NoInputDevice,

    #[error("No output device available")]
    NoOutputDevice,

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Frame encode error: {0}")]
    Encode(String),
}

/// Errors from the realtime co-host endpoint connection.
#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("Failed to open endpoint connection: {0}")]
    Connect(String),

    #[error("Endpoint transport error: {0}")]
    Transport(String),

    #[error("Malformed endpoint message: {0}")]
    Protocol(String),

    #[error("Endpoint connection closed")]
    Closed,
}

/// Rejections raised before any remote call is issued.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Text publication has empty content")]
    EmptyText,

    #[error("Media publication has no media reference")]
    MissingMedia,
}

/// A remote write could not be issued or was refused by the backend.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote transport unavailable: {0}")]
    Transport(String),

    #[error("Remote write rejected: {0}")]
    Rejected(String),

    #[error("Feed channel closed")]
    ChannelClosed,
}
