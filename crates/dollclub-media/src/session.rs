use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use dollclub_shared::types::BroadcastStatus;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("A broadcast is already active")]
    AlreadyActive,
}

/// State machine of one outgoing broadcast.
///
/// Connection attempts are numbered by an epoch: every `begin_connect` and
/// `reset` bumps it, and completions carry the epoch of the attempt they
/// belong to.  A completion with a stale epoch is ignored, so a `stop()`
/// issued while a connect is still pending wins the race: the late open
/// acknowledgment becomes a no-op.
pub struct BroadcastSession {
    status: BroadcastStatus,
    mic_enabled: bool,
    cam_enabled: bool,
    title: String,
    started_at: Option<DateTime<Utc>>,
    epoch: u64,
}

impl BroadcastSession {
    pub fn new() -> Self {
        Self {
            status: BroadcastStatus::Idle,
            mic_enabled: true,
            cam_enabled: true,
            title: String::new(),
            started_at: None,
            epoch: 0,
        }
    }

    pub fn status(&self) -> BroadcastStatus {
        self.status
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn mic_enabled(&self) -> bool {
        self.mic_enabled
    }

    pub fn cam_enabled(&self) -> bool {
        self.cam_enabled
    }

    /// Enter `Connecting`.  Single-flight: fails while a session is already
    /// connecting or live.  Returns the epoch of this attempt.
    pub fn begin_connect(&mut self, title: String) -> Result<u64, SessionError> {
        match self.status {
            BroadcastStatus::Connecting | BroadcastStatus::Live => {
                warn!("Broadcast start refused: already active");
                Err(SessionError::AlreadyActive)
            }
            BroadcastStatus::Idle | BroadcastStatus::Error => {
                self.epoch += 1;
                self.status = BroadcastStatus::Connecting;
                self.title = title;
                self.mic_enabled = true;
                self.cam_enabled = true;
                self.started_at = None;
                info!(epoch = self.epoch, title = %self.title, "Broadcast connecting");
                Ok(self.epoch)
            }
        }
    }

    /// The endpoint acknowledged open for the attempt `epoch`.
    ///
    /// Returns `true` when the session transitioned to `Live`; `false` when
    /// the acknowledgment is stale (the attempt was cancelled in the
    /// interim) and must be discarded.
    pub fn mark_live(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.status != BroadcastStatus::Connecting {
            debug!(
                epoch,
                current = self.epoch,
                status = ?self.status,
                "Stale open acknowledgment ignored"
            );
            return false;
        }
        self.status = BroadcastStatus::Live;
        self.started_at = Some(Utc::now());
        info!(epoch, "Broadcast live");
        true
    }

    /// The endpoint failed or dropped for the attempt `epoch`.
    ///
    /// Returns `true` when the failure applies to the current attempt.
    pub fn mark_error(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.status == BroadcastStatus::Idle {
            return false;
        }
        self.status = BroadcastStatus::Error;
        warn!(epoch, "Broadcast failed");
        true
    }

    /// Force the session back to `Idle`.  Idempotent; bumps the epoch so
    /// every in-flight completion of the aborted attempt is discarded.
    pub fn reset(&mut self) {
        if self.status != BroadcastStatus::Idle {
            debug!(from = ?self.status, "Broadcast reset to idle");
        }
        self.epoch += 1;
        self.status = BroadcastStatus::Idle;
        self.started_at = None;
    }

    pub fn set_mic_enabled(&mut self, enabled: bool) {
        self.mic_enabled = enabled;
        debug!(enabled, "Microphone flag changed");
    }

    pub fn set_cam_enabled(&mut self, enabled: bool) {
        self.cam_enabled = enabled;
        debug!(enabled, "Camera flag changed");
    }
}

impl Default for BroadcastSession {
    fn default() -> Self {
        Self::new()
    }
}
