use dollclub_media::FrameSource;
use dollclub_shared::types::BroadcastStatus;

use crate::{Client, ClientError};

impl Client {
    /// Start a broadcast with the AI co-host.  `camera` supplies raw frames
    /// from the platform camera glue; pass `None` for audio-only.
    pub async fn start_broadcast(
        &self,
        title: String,
        camera: Option<Box<dyn FrameSource>>,
    ) -> Result<(), ClientError> {
        self.broadcast().start(title, camera).await
    }

    /// Stop the broadcast.  Idempotent.
    pub async fn stop_broadcast(&self) {
        self.broadcast().stop().await;
    }

    pub fn broadcast_status(&self) -> BroadcastStatus {
        self.broadcast().status()
    }

    /// Toggle the microphone.  Takes effect on the next frame tick.
    pub fn set_mic_enabled(&self, enabled: bool) {
        self.broadcast().set_mic_enabled(enabled);
    }

    /// Toggle the camera.  Takes effect on the next frame tick.
    pub fn set_cam_enabled(&self, enabled: bool) {
        self.broadcast().set_cam_enabled(enabled);
    }
}
