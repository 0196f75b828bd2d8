//! The broadcast session controller.
//!
//! Drives exactly one outgoing live session at a time through its
//! connect → stream → teardown life cycle: acquires the camera+microphone,
//! opens the co-host endpoint, forwards captured audio/video chunks while
//! the matching enable flag allows it, and schedules inbound synthesized
//! audio for gapless playback.
//!
//! Stop is the single cancellation primitive.  Every attempt carries the
//! session epoch; a stop issued while a connect is still pending wins the
//! race, and late completions of the abandoned attempt are discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dollclub_media::codec::{decode_audio_chunk, encode_audio_chunk};
use dollclub_media::{
    open_user_media, AudioEngine, AudioScheduler, BroadcastSession, CaptureConstraints,
    CaptureFormat, FrameSource, MediaStream, PlaybackFrame, RawFrame, SystemClock, VideoSampler,
};
use dollclub_net::{
    spawn_endpoint, EndpointCommand, EndpointConfig, EndpointNotification, RemoteClient,
};
use dollclub_shared::constants::{FRAME_CHANNEL_CAPACITY, RECV_SAMPLE_RATE};
use dollclub_shared::error::EndpointError;
use dollclub_shared::types::BroadcastStatus;

use crate::events::{emit, ClientEvent};
use crate::ClientError;

pub struct BroadcastController {
    inner: Arc<Inner>,
}

struct Inner {
    client: RemoteClient,
    endpoint_config: EndpointConfig,
    events: broadcast::Sender<ClientEvent>,
    session: Mutex<BroadcastSession>,
    active: AsyncMutex<Option<ActiveBroadcast>>,
}

/// Resources owned by one live (or connecting) session.
struct ActiveBroadcast {
    epoch: u64,
    endpoint_tx: mpsc::Sender<EndpointCommand>,
    media: Option<MediaStream>,
    playback: Option<AudioEngine>,
    tasks: Vec<JoinHandle<()>>,
}

impl BroadcastController {
    pub fn new(
        client: RemoteClient,
        endpoint_config: EndpointConfig,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                endpoint_config,
                events,
                session: Mutex::new(BroadcastSession::new()),
                active: AsyncMutex::new(None),
            }),
        }
    }

    pub fn status(&self) -> BroadcastStatus {
        self.inner.session.lock().unwrap().status()
    }

    /// Microphone flag, consulted by the audio forwarding loop on every
    /// frame tick.  Takes effect on the next frame, never retroactively.
    pub fn set_mic_enabled(&self, enabled: bool) {
        self.inner.session.lock().unwrap().set_mic_enabled(enabled);
    }

    /// Camera flag; same per-tick semantics as the microphone flag.
    pub fn set_cam_enabled(&self, enabled: bool) {
        self.inner.session.lock().unwrap().set_cam_enabled(enabled);
    }

    /// Start a broadcast.
    ///
    /// Fails when a session is already connecting or live, when device
    /// access is denied (the session stays idle and the caller may retry),
    /// or when the endpoint connection cannot be opened.  The transition to
    /// `Live` happens when the endpoint acknowledges setup, reported through
    /// [`ClientEvent::BroadcastStateChanged`].
    pub async fn start(
        &self,
        title: String,
        camera: Option<Box<dyn FrameSource>>,
    ) -> Result<(), ClientError> {
        let inner = &self.inner;

        let epoch = inner.session.lock().unwrap().begin_connect(title)?;
        emit(
            &inner.events,
            ClientEvent::BroadcastStateChanged {
                status: BroadcastStatus::Connecting,
            },
        );

        let constraints = CaptureConstraints {
            audio: true,
            video: camera.is_some(),
        };
        let mut media = match open_user_media(constraints, camera) {
            Ok(m) => m,
            Err(e) => {
                self.abort_connect();
                return Err(e.into());
            }
        };

        let (endpoint_tx, notif_rx) =
            match spawn_endpoint(&inner.client, inner.endpoint_config.clone()).await {
                Ok(pair) => pair,
                Err(e) => {
                    media.stop();
                    self.abort_connect();
                    return Err(EndpointError::Connect(e.to_string()).into());
                }
            };

        let mut playback = AudioEngine::new();
        let (play_tx, play_rx) = mpsc::channel::<PlaybackFrame>(FRAME_CHANNEL_CAPACITY);
        if let Err(e) = playback.start_playback(play_rx) {
            let _ = endpoint_tx.try_send(EndpointCommand::Close);
            media.stop();
            self.abort_connect();
            return Err(e.into());
        }
        let playback_gen = playback.playback_generation();

        let format = media.format();
        let mut tasks = Vec::new();

        if let Some(audio_rx) = media.take_audio_rx() {
            tasks.push(tokio::spawn(audio_forward_loop(
                inner.clone(),
                audio_rx,
                format,
                endpoint_tx.clone(),
            )));
        }
        if let Some(video_rx) = media.take_video_rx() {
            tasks.push(tokio::spawn(video_forward_loop(
                inner.clone(),
                video_rx,
                endpoint_tx.clone(),
            )));
        }
        tasks.push(tokio::spawn(inbound_loop(
            inner.clone(),
            epoch,
            notif_rx,
            play_tx,
            playback_gen,
        )));

        let mut guard = inner.active.lock().await;
        if inner.session.lock().unwrap().epoch() != epoch {
            // stop() raced the setup; the attempt is abandoned.  Release
            // everything just built and report success-as-no-op.
            info!("Broadcast start abandoned by concurrent stop");
            let _ = endpoint_tx.try_send(EndpointCommand::Close);
            media.stop();
            playback.stop();
            for task in tasks {
                task.abort();
            }
            return Ok(());
        }

        *guard = Some(ActiveBroadcast {
            epoch,
            endpoint_tx,
            media: Some(media),
            playback: Some(playback),
            tasks,
        });

        info!(epoch, "Broadcast setup complete, awaiting endpoint open");
        Ok(())
    }

    /// Stop the broadcast.  Idempotent, safe from any state and from within
    /// error handling; component teardown uses the same path.
    pub async fn stop(&self) {
        self.inner.teardown(None, None).await;
    }

    /// Device/endpoint setup failed before anything was stored: put the
    /// session back to idle and re-enable the start control.
    fn abort_connect(&self) {
        self.inner.session.lock().unwrap().reset();
        emit(
            &self.inner.events,
            ClientEvent::BroadcastStateChanged {
                status: BroadcastStatus::Idle,
            },
        );
    }

    #[cfg(test)]
    async fn inject_active(&self, epoch: u64, endpoint_tx: mpsc::Sender<EndpointCommand>) {
        *self.inner.active.lock().await = Some(ActiveBroadcast {
            epoch,
            endpoint_tx,
            media: None,
            playback: None,
            tasks: Vec::new(),
        });
    }
}

impl Inner {
    /// Tear the active session down and return to idle.
    ///
    /// With `epoch` set, only the matching attempt is torn down; a newer
    /// session started in the meantime is left untouched.  Everything after
    /// the lock acquisition is synchronous, so a task tearing itself down
    /// completes the cleanup before its own abort lands.
    async fn teardown(&self, epoch: Option<u64>, reason: Option<String>) {
        let mut guard = self.active.lock().await;

        let matches = match (guard.as_ref(), epoch) {
            (Some(active), Some(e)) => active.epoch == e,
            (Some(_), None) => true,
            (None, Some(e)) => {
                // The failing attempt was not stored yet (its start() is
                // still in flight).  Resetting bumps the epoch, so start()
                // sees the attempt is dead and releases what it built.
                let belongs_here = {
                    let mut session = self.session.lock().unwrap();
                    let hit = session.epoch() == e && session.status() != BroadcastStatus::Idle;
                    if hit {
                        session.reset();
                    }
                    hit
                };
                if belongs_here {
                    if let Some(reason) = reason {
                        warn!(reason = %reason, "Broadcast ended with error");
                        emit(&self.events, ClientEvent::BroadcastFailed { reason });
                    }
                    emit(
                        &self.events,
                        ClientEvent::BroadcastStateChanged {
                            status: BroadcastStatus::Idle,
                        },
                    );
                }
                return;
            }
            (None, None) => {
                // Nothing running; make sure the session reads idle anyway.
                self.session.lock().unwrap().reset();
                return;
            }
        };
        if !matches {
            debug!("Teardown for a stale attempt ignored");
            return;
        }

        let Some(mut active) = guard.take() else {
            return;
        };
        drop(guard);

        // Best effort: the endpoint task also closes when the command
        // channel is dropped, so the socket is closed exactly once.
        let _ = active.endpoint_tx.try_send(EndpointCommand::Close);
        if let Some(mut media) = active.media.take() {
            media.stop();
        }
        if let Some(mut playback) = active.playback.take() {
            playback.stop();
        }
        self.session.lock().unwrap().reset();

        if let Some(reason) = reason {
            warn!(reason = %reason, "Broadcast ended with error");
            emit(&self.events, ClientEvent::BroadcastFailed { reason });
        }
        emit(
            &self.events,
            ClientEvent::BroadcastStateChanged {
                status: BroadcastStatus::Idle,
            },
        );

        for task in &active.tasks {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Forwarding
// ---------------------------------------------------------------------------

/// Outbound media is transmitted only while the session is live and the
/// matching enable flag is set (checked per frame tick).
fn forward_audio_allowed(session: &BroadcastSession) -> bool {
    session.status() == BroadcastStatus::Live && session.mic_enabled()
}

fn forward_video_allowed(session: &BroadcastSession) -> bool {
    session.status() == BroadcastStatus::Live && session.cam_enabled()
}

async fn audio_forward_loop(
    inner: Arc<Inner>,
    mut audio_rx: mpsc::Receiver<Vec<f32>>,
    format: CaptureFormat,
    endpoint_tx: mpsc::Sender<EndpointCommand>,
) {
    while let Some(frame) = audio_rx.recv().await {
        if !forward_audio_allowed(&inner.session.lock().unwrap()) {
            continue;
        }
        let chunk = encode_audio_chunk(&frame, format.sample_rate, format.channels);
        if endpoint_tx
            .send(EndpointCommand::SendMedia(chunk))
            .await
            .is_err()
        {
            break;
        }
    }
    debug!("Audio forwarding ended");
}

async fn video_forward_loop(
    inner: Arc<Inner>,
    mut video_rx: mpsc::Receiver<RawFrame>,
    endpoint_tx: mpsc::Sender<EndpointCommand>,
) {
    let mut sampler = VideoSampler::new();

    while let Some(frame) = video_rx.recv().await {
        if !forward_video_allowed(&inner.session.lock().unwrap()) {
            continue;
        }
        match sampler.sample(&frame, Instant::now()) {
            Some(Ok(chunk)) => {
                if endpoint_tx
                    .send(EndpointCommand::SendMedia(chunk))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Some(Err(e)) => warn!(error = %e, "Video frame encode failed"),
            None => {}
        }
    }
    debug!("Video forwarding ended");
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

enum LoopAction {
    Continue,
    Teardown(Option<String>),
}

async fn inbound_loop(
    inner: Arc<Inner>,
    epoch: u64,
    mut notif_rx: mpsc::Receiver<EndpointNotification>,
    play_tx: mpsc::Sender<PlaybackFrame>,
    playback_gen: Arc<AtomicU64>,
) {
    let mut scheduler = AudioScheduler::new(Box::new(SystemClock::new()));

    while let Some(notification) = notif_rx.recv().await {
        match apply_notification(
            &inner,
            epoch,
            &mut scheduler,
            &play_tx,
            &playback_gen,
            notification,
        )
        .await
        {
            LoopAction::Continue => {}
            LoopAction::Teardown(reason) => {
                inner.teardown(Some(epoch), reason).await;
                break;
            }
        }
    }
    debug!(epoch, "Inbound loop ended");
}

async fn apply_notification(
    inner: &Inner,
    epoch: u64,
    scheduler: &mut AudioScheduler,
    play_tx: &mpsc::Sender<PlaybackFrame>,
    playback_gen: &Arc<AtomicU64>,
    notification: EndpointNotification,
) -> LoopAction {
    match notification {
        EndpointNotification::Open => {
            if inner.session.lock().unwrap().mark_live(epoch) {
                emit(
                    &inner.events,
                    ClientEvent::BroadcastStateChanged {
                        status: BroadcastStatus::Live,
                    },
                );
                LoopAction::Continue
            } else {
                // A stop was issued while the connect was pending; this
                // favorable completion is a no-op and the attempt is
                // released.
                LoopAction::Teardown(None)
            }
        }

        EndpointNotification::Transcription { speaker, text } => {
            emit(&inner.events, ClientEvent::Transcription { speaker, text });
            LoopAction::Continue
        }

        EndpointNotification::Audio { data } => {
            match decode_audio_chunk(&data) {
                Ok(samples) => {
                    let slot = scheduler.enqueue(samples.len(), RECV_SAMPLE_RATE);
                    debug!(
                        id = slot.id,
                        start = slot.start,
                        duration = slot.duration,
                        "Audio chunk scheduled"
                    );
                    let frame = PlaybackFrame {
                        generation: playback_gen.load(Ordering::Acquire),
                        samples,
                    };
                    if play_tx.send(frame).await.is_err() {
                        debug!("Playback channel closed");
                    }
                }
                Err(e) => warn!(error = %e, "Malformed inbound audio payload"),
            }
            LoopAction::Continue
        }

        EndpointNotification::Interrupted => {
            let flushed = scheduler.interrupt();
            playback_gen.fetch_add(1, Ordering::AcqRel);
            debug!(flushed, "Interruption: playback flushed");
            LoopAction::Continue
        }

        EndpointNotification::TurnComplete => {
            debug!("Co-host turn complete");
            LoopAction::Continue
        }

        EndpointNotification::Error(message) => {
            inner.session.lock().unwrap().mark_error(epoch);
            LoopAction::Teardown(Some(message))
        }

        EndpointNotification::Closed => {
            let still_ours = {
                let session = inner.session.lock().unwrap();
                session.epoch() == epoch && session.status() != BroadcastStatus::Idle
            };
            if still_ours {
                LoopAction::Teardown(Some("endpoint connection closed".into()))
            } else {
                LoopAction::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dollclub_net::RemoteConfig;
    use dollclub_shared::types::Speaker;

    fn test_controller() -> (BroadcastController, broadcast::Receiver<ClientEvent>) {
        let client = RemoteClient::new(RemoteConfig {
            api_url: "https://api.test".into(),
            realtime_url: "wss://rt.test".into(),
            app_id: "test".into(),
            auth_token: "tok".into(),
        });
        let (events, events_rx) = crate::events::event_channel();
        (
            BroadcastController::new(client, EndpointConfig::default(), events),
            events_rx,
        )
    }

    fn playback_parts() -> (
        AudioScheduler,
        mpsc::Sender<PlaybackFrame>,
        mpsc::Receiver<PlaybackFrame>,
        Arc<AtomicU64>,
    ) {
        let scheduler = AudioScheduler::new(Box::new(SystemClock::new()));
        let (play_tx, play_rx) = mpsc::channel(8);
        (scheduler, play_tx, play_rx, Arc::new(AtomicU64::new(0)))
    }

    /// Base64 of `n` zero PCM16 samples (zero bytes encode to 'A's).
    fn silence_b64(n: usize) -> String {
        let bytes = vec![0u8; n * 2];
        let mut out = String::new();
        for chunk in bytes.chunks(3) {
            match chunk.len() {
                3 => out.push_str("AAAA"),
                2 => out.push_str("AAA="),
                _ => out.push_str("AA=="),
            }
        }
        out
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_closes_the_endpoint_once() {
        let (controller, _events) = test_controller();
        let epoch = controller
            .inner
            .session
            .lock()
            .unwrap()
            .begin_connect("show".into())
            .unwrap();

        let (endpoint_tx, mut endpoint_rx) = mpsc::channel(4);
        controller.inject_active(epoch, endpoint_tx).await;

        controller.stop().await;
        assert_eq!(controller.status(), BroadcastStatus::Idle);
        assert!(matches!(
            endpoint_rx.try_recv(),
            Ok(EndpointCommand::Close)
        ));

        controller.stop().await;
        assert_eq!(controller.status(), BroadcastStatus::Idle);
        // No second close command was issued.
        assert!(endpoint_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn late_open_after_stop_is_a_no_op() {
        let (controller, _events) = test_controller();
        let epoch = controller
            .inner
            .session
            .lock()
            .unwrap()
            .begin_connect("show".into())
            .unwrap();

        // stop() wins the race before the endpoint acknowledges open.
        controller.stop().await;
        assert_eq!(controller.status(), BroadcastStatus::Idle);

        let (mut scheduler, play_tx, _play_rx, generation) = playback_parts();
        let action = apply_notification(
            &controller.inner,
            epoch,
            &mut scheduler,
            &play_tx,
            &generation,
            EndpointNotification::Open,
        )
        .await;

        assert!(matches!(action, LoopAction::Teardown(None)));
        assert_eq!(controller.status(), BroadcastStatus::Idle);
    }

    #[tokio::test]
    async fn open_for_the_current_attempt_goes_live() {
        let (controller, mut events) = test_controller();
        let epoch = controller
            .inner
            .session
            .lock()
            .unwrap()
            .begin_connect("show".into())
            .unwrap();

        let (mut scheduler, play_tx, _play_rx, generation) = playback_parts();
        let action = apply_notification(
            &controller.inner,
            epoch,
            &mut scheduler,
            &play_tx,
            &generation,
            EndpointNotification::Open,
        )
        .await;

        assert!(matches!(action, LoopAction::Continue));
        assert_eq!(controller.status(), BroadcastStatus::Live);
        assert!(matches!(
            events.recv().await.unwrap(),
            ClientEvent::BroadcastStateChanged {
                status: BroadcastStatus::Live
            }
        ));
    }

    #[tokio::test]
    async fn inbound_audio_is_scheduled_and_forwarded_in_order() {
        let (controller, _events) = test_controller();
        let epoch = controller
            .inner
            .session
            .lock()
            .unwrap()
            .begin_connect("show".into())
            .unwrap();
        controller.inner.session.lock().unwrap().mark_live(epoch);

        let (mut scheduler, play_tx, mut play_rx, generation) = playback_parts();

        for _ in 0..2 {
            let action = apply_notification(
                &controller.inner,
                epoch,
                &mut scheduler,
                &play_tx,
                &generation,
                EndpointNotification::Audio {
                    data: silence_b64(240),
                },
            )
            .await;
            assert!(matches!(action, LoopAction::Continue));
        }

        let first = play_rx.try_recv().unwrap();
        let second = play_rx.try_recv().unwrap();
        assert_eq!(first.samples.len(), 240);
        assert_eq!(first.generation, 0);
        assert_eq!(second.generation, 0);
        assert_eq!(scheduler.pending(), 2);
        assert!(scheduler.cursor() > 0.0);
    }

    #[tokio::test]
    async fn interruption_flushes_the_schedule_and_bumps_the_generation() {
        let (controller, _events) = test_controller();
        let epoch = controller
            .inner
            .session
            .lock()
            .unwrap()
            .begin_connect("show".into())
            .unwrap();
        controller.inner.session.lock().unwrap().mark_live(epoch);

        let (mut scheduler, play_tx, mut play_rx, generation) = playback_parts();

        apply_notification(
            &controller.inner,
            epoch,
            &mut scheduler,
            &play_tx,
            &generation,
            EndpointNotification::Audio {
                data: silence_b64(240),
            },
        )
        .await;

        apply_notification(
            &controller.inner,
            epoch,
            &mut scheduler,
            &play_tx,
            &generation,
            EndpointNotification::Interrupted,
        )
        .await;

        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.cursor(), 0.0);
        assert_eq!(generation.load(Ordering::Acquire), 1);

        // Audio after the interruption carries the new generation, so the
        // playback engine drops everything older.
        apply_notification(
            &controller.inner,
            epoch,
            &mut scheduler,
            &play_tx,
            &generation,
            EndpointNotification::Audio {
                data: silence_b64(120),
            },
        )
        .await;

        let stale = play_rx.try_recv().unwrap();
        let fresh = play_rx.try_recv().unwrap();
        assert_eq!(stale.generation, 0);
        assert_eq!(fresh.generation, 1);
        assert_eq!(fresh.samples.len(), 120);
    }

    #[tokio::test]
    async fn endpoint_error_while_live_tears_down_with_a_reason() {
        let (controller, _events) = test_controller();
        let epoch = controller
            .inner
            .session
            .lock()
            .unwrap()
            .begin_connect("show".into())
            .unwrap();
        controller.inner.session.lock().unwrap().mark_live(epoch);

        let (mut scheduler, play_tx, _play_rx, generation) = playback_parts();
        let action = apply_notification(
            &controller.inner,
            epoch,
            &mut scheduler,
            &play_tx,
            &generation,
            EndpointNotification::Error("stream reset".into()),
        )
        .await;

        match action {
            LoopAction::Teardown(Some(reason)) => assert_eq!(reason, "stream reset"),
            _ => panic!("expected teardown with reason"),
        }
    }

    #[tokio::test]
    async fn transcriptions_are_forwarded_verbatim() {
        let (controller, mut events) = test_controller();
        let epoch = controller
            .inner
            .session
            .lock()
            .unwrap()
            .begin_connect("show".into())
            .unwrap();
        controller.inner.session.lock().unwrap().mark_live(epoch);

        let (mut scheduler, play_tx, _play_rx, generation) = playback_parts();
        apply_notification(
            &controller.inner,
            epoch,
            &mut scheduler,
            &play_tx,
            &generation,
            EndpointNotification::Transcription {
                speaker: Speaker::CoHost,
                text: "welcome to the club".into(),
            },
        )
        .await;

        match events.recv().await.unwrap() {
            ClientEvent::Transcription { speaker, text } => {
                assert_eq!(speaker, Speaker::CoHost);
                assert_eq!(text, "welcome to the club");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn mic_toggle_suppresses_outbound_audio_without_closing() {
        let mut session = BroadcastSession::new();
        let epoch = session.begin_connect("show".into()).unwrap();

        // Nothing is forwarded before the session is live.
        assert!(!forward_audio_allowed(&session));

        session.mark_live(epoch);
        assert!(forward_audio_allowed(&session));
        assert!(forward_video_allowed(&session));

        session.set_mic_enabled(false);
        assert!(!forward_audio_allowed(&session));
        // The camera path and the session itself are untouched.
        assert!(forward_video_allowed(&session));
        assert_eq!(session.status(), BroadcastStatus::Live);

        session.set_mic_enabled(true);
        assert!(forward_audio_allowed(&session));
    }
}
