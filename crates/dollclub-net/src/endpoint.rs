//! The realtime co-host streaming session.
//!
//! [`spawn_endpoint`] opens the WebSocket, performs session setup, and runs
//! the session as a background task driven by a command channel.  Everything
//! the socket produces is flattened into [`EndpointNotification`] values, so
//! the broadcast controller never touches the vendor calling convention.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use dollclub_shared::constants::{DEFAULT_COHOST_MODEL, DEFAULT_COHOST_VOICE};
use dollclub_shared::protocol::{
    ClientMessage, MediaChunk, RealtimeInput, ServerEvent, ServerMessage, Setup,
};
use dollclub_shared::types::Speaker;

use crate::client::RemoteClient;

/// Commands sent *to* the endpoint session task.
#[derive(Debug)]
pub enum EndpointCommand {
    /// Forward one captured media chunk.
    SendMedia(MediaChunk),
    /// Close the session gracefully.
    Close,
}

/// Notifications sent *from* the endpoint session task.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointNotification {
    /// Session setup acknowledged; the broadcast may go live.
    Open,
    /// A transcribed-text fragment, tagged by speaker.
    Transcription { speaker: Speaker, text: String },
    /// Inline synthesized audio, still base64 PCM16 at 24 kHz.
    Audio { data: String },
    /// The host spoke over playback; flush everything pending.
    Interrupted,
    /// The co-host finished a reply turn.
    TurnComplete,
    /// Transport or protocol failure.  Always followed by `Closed`.
    Error(String),
    /// The session ended; no further notifications follow.
    Closed,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub model: String,
    pub system_instruction: Option<String>,
    pub voice: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_COHOST_MODEL.to_string(),
            system_instruction: None,
            voice: Some(DEFAULT_COHOST_VOICE.to_string()),
        }
    }
}

const COMMAND_BUFFER: usize = 64;
const NOTIFY_BUFFER: usize = 256;

/// Open the endpoint connection and spawn the session task.
///
/// # Returns
///
/// `(command_tx, notification_rx)`.  Dropping `command_tx` closes the
/// session; the task always emits [`EndpointNotification::Closed`] last.
pub async fn spawn_endpoint(
    client: &RemoteClient,
    config: EndpointConfig,
) -> anyhow::Result<(
    mpsc::Sender<EndpointCommand>,
    mpsc::Receiver<EndpointNotification>,
)> {
    let url = client.endpoint_url();
    let (mut ws, _response) = connect_async(url.as_str()).await?;

    let setup = ClientMessage::Setup(Setup {
        model: config.model.clone(),
        system_instruction: config.system_instruction.clone(),
        voice: config.voice.clone(),
    });
    ws.send(Message::Text(setup.to_json()?)).await?;

    info!(model = %config.model, "Endpoint connection opened, setup sent");

    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (notif_tx, notif_rx) = mpsc::channel(NOTIFY_BUFFER);

    tokio::spawn(async move {
        session_loop(ws, cmd_rx, notif_tx.clone()).await;
        let _ = notif_tx.send(EndpointNotification::Closed).await;
        debug!("Endpoint session task ended");
    });

    Ok((cmd_tx, notif_rx))
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn session_loop(
    ws: WsStream,
    mut cmd_rx: mpsc::Receiver<EndpointCommand>,
    notif_tx: mpsc::Sender<EndpointNotification>,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(EndpointCommand::SendMedia(chunk)) => {
                        let msg = ClientMessage::RealtimeInput(RealtimeInput {
                            media_chunks: vec![chunk],
                        });
                        let json = match msg.to_json() {
                            Ok(j) => j,
                            Err(e) => {
                                warn!(error = %e, "Failed to encode realtime input");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            let _ = notif_tx
                                .send(EndpointNotification::Error(e.to_string()))
                                .await;
                            break;
                        }
                    }
                    Some(EndpointCommand::Close) | None => {
                        // Sender dropped counts as a close request.
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_server_frame(&text, &notif_tx).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Endpoint closed the connection");
                        break;
                    }
                    Some(Err(e)) => {
                        let _ = notif_tx
                            .send(EndpointNotification::Error(e.to_string()))
                            .await;
                        break;
                    }
                }
            }
        }
    }
}

/// Parse one server frame and forward its facts.  Returns `false` when the
/// notification channel is gone and the session should end.
async fn handle_server_frame(
    text: &str,
    notif_tx: &mpsc::Sender<EndpointNotification>,
) -> bool {
    let msg = match ServerMessage::from_json(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "Malformed endpoint frame, skipping");
            return true;
        }
    };

    for event in msg.events() {
        let notification = match event {
            ServerEvent::SetupComplete => EndpointNotification::Open,
            ServerEvent::Transcription { speaker, text } => {
                EndpointNotification::Transcription { speaker, text }
            }
            ServerEvent::Audio { data } => EndpointNotification::Audio { data },
            ServerEvent::Interrupted => EndpointNotification::Interrupted,
            ServerEvent::TurnComplete => EndpointNotification::TurnComplete,
        };
        if notif_tx.send(notification).await.is_err() {
            return false;
        }
    }

    true
}
