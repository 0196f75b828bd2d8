//! The remote feed channel: a realtime push subscription over the hosted
//! backend's publications collection, plus the write path (create,
//! counter increments, comment appends) over REST.
//!
//! The channel task owns the authoritative document cache and the set of
//! locally-issued writes still in flight; every change, whether a remote
//! push or a local optimistic write, is published downstream as a full
//! [`FeedSnapshot`] carrying the per-document pending flag.  The store never
//! merges documents itself; this task is the single source of truth for set
//! membership.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use dollclub_shared::documents::{CommentDoc, DocumentSnapshot, FeedSnapshot, PublicationDoc};
use dollclub_shared::error::SyncError;
use dollclub_shared::types::PublicationId;

use crate::client::RemoteClient;

/// Counter fields a client may increment on a publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    Likes,
    Dislikes,
}

impl CounterField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Likes => "likeCount",
            Self::Dislikes => "dislikeCount",
        }
    }
}

/// Commands sent *to* the feed channel task.
#[derive(Debug)]
pub enum FeedCommand {
    /// Create a publication.  The reply resolves once the remote create has
    /// been issued and acknowledged (or refused).
    Create {
        id: PublicationId,
        doc: PublicationDoc,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    /// Fire-and-forget counter increment.
    Increment {
        id: PublicationId,
        field: CounterField,
    },
    /// Fire-and-forget comment append.
    AppendComment {
        id: PublicationId,
        comment: CommentDoc,
    },
    /// Gracefully shut down the channel.
    Shutdown,
}

/// Notifications sent *from* the feed channel task.
#[derive(Debug)]
pub enum FeedNotification {
    /// A new full view of the collection.
    Snapshot(FeedSnapshot),
    /// The subscription transport failed.  The last snapshot stays valid;
    /// no automatic resubscription is attempted.
    Error(String),
}

/// Which collection to watch.
#[derive(Debug, Clone)]
pub struct FeedQuery {
    pub collection: String,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            collection: "publications".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Realtime channel wire frames
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ChannelFrame {
    /// Initial full state of the collection, sent right after subscribing.
    Snapshot { docs: Vec<RemoteDoc> },
    Insert { id: String, doc: PublicationDoc },
    Update { id: String, doc: PublicationDoc },
    Delete { id: String },
    Error { message: String },
}

#[derive(Debug, Deserialize)]
struct RemoteDoc {
    id: String,
    doc: PublicationDoc,
}

/// Server reply to a REST create.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAck {
    created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Document cache
// ---------------------------------------------------------------------------

/// The channel task's view of the collection: server documents in
/// push-arrival order plus per-document in-flight local write counts.
#[derive(Default)]
struct FeedState {
    /// Documents in the order their first push (or local create) arrived.
    docs: Vec<(PublicationId, PublicationDoc)>,
    /// In-flight local writes per document.  A document is `pending` while
    /// its count is non-zero.
    in_flight: HashMap<PublicationId, u32>,
}

impl FeedState {
    fn upsert(&mut self, id: PublicationId, doc: PublicationDoc) {
        match self.docs.iter_mut().find(|(d, _)| *d == id) {
            Some((_, existing)) => *existing = doc,
            None => self.docs.push((id, doc)),
        }
    }

    fn remove(&mut self, id: &PublicationId) {
        self.docs.retain(|(d, _)| d != id);
    }

    fn get_mut(&mut self, id: &PublicationId) -> Option<&mut PublicationDoc> {
        self.docs
            .iter_mut()
            .find(|(d, _)| d == id)
            .map(|(_, doc)| doc)
    }

    /// Replace the server state wholesale, preserving documents that only
    /// exist locally because their create is still in flight.
    fn replace_all(&mut self, server_docs: Vec<(PublicationId, PublicationDoc)>) {
        let locals: Vec<(PublicationId, PublicationDoc)> = self
            .docs
            .iter()
            .filter(|(id, _)| {
                self.in_flight.get(id).copied().unwrap_or(0) > 0
                    && !server_docs.iter().any(|(sid, _)| sid == id)
            })
            .cloned()
            .collect();

        self.docs = server_docs;
        self.docs.extend(locals);
    }

    fn begin_write(&mut self, id: &PublicationId) {
        *self.in_flight.entry(id.clone()).or_insert(0) += 1;
    }

    fn end_write(&mut self, id: &PublicationId) {
        if let Some(count) = self.in_flight.get_mut(id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.in_flight.remove(id);
            }
        }
    }

    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            docs: self
                .docs
                .iter()
                .map(|(id, doc)| DocumentSnapshot {
                    id: id.clone(),
                    doc: doc.clone(),
                    pending: self.in_flight.get(id).copied().unwrap_or(0) > 0,
                })
                .collect(),
            received_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

const COMMAND_BUFFER: usize = 64;
const NOTIFY_BUFFER: usize = 64;

/// Subscribe to the collection and spawn the channel task.
///
/// # Returns
///
/// `(command_tx, notification_rx)`.  The first notification is the initial
/// snapshot once the server delivers it.
pub async fn spawn_feed_channel(
    client: RemoteClient,
    query: FeedQuery,
) -> anyhow::Result<(mpsc::Sender<FeedCommand>, mpsc::Receiver<FeedNotification>)> {
    let url = client.channel_url(&query.collection);
    let (ws, _response) = connect_async(url.as_str()).await?;

    info!(collection = %query.collection, "Feed channel subscribed");

    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (notif_tx, notif_rx) = mpsc::channel(NOTIFY_BUFFER);

    tokio::spawn(async move {
        channel_loop(client, query, ws, cmd_rx, notif_tx).await;
        debug!("Feed channel task ended");
    });

    Ok((cmd_tx, notif_rx))
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn channel_loop(
    client: RemoteClient,
    query: FeedQuery,
    ws: WsStream,
    mut cmd_rx: mpsc::Receiver<FeedCommand>,
    notif_tx: mpsc::Sender<FeedNotification>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut state = FeedState::default();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(FeedCommand::Create { id, doc, reply }) => {
                        handle_create(&client, &query, &mut state, &notif_tx, id, doc, reply).await;
                    }
                    Some(FeedCommand::Increment { id, field }) => {
                        handle_increment(&client, &query, &mut state, &notif_tx, id, field).await;
                    }
                    Some(FeedCommand::AppendComment { id, comment }) => {
                        handle_append_comment(&client, &query, &mut state, &notif_tx, id, comment)
                            .await;
                    }
                    Some(FeedCommand::Shutdown) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if handle_push(&mut state, &notif_tx, &text).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("Feed channel connection closed by server");
                        let _ = notif_tx
                            .send(FeedNotification::Error("subscription closed".into()))
                            .await;
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Feed channel transport error");
                        let _ = notif_tx.send(FeedNotification::Error(e.to_string())).await;
                        break;
                    }
                }
            }
        }
    }
}

async fn emit(state: &FeedState, notif_tx: &mpsc::Sender<FeedNotification>) -> Result<(), ()> {
    notif_tx
        .send(FeedNotification::Snapshot(state.snapshot()))
        .await
        .map_err(|_| ())
}

async fn handle_push(
    state: &mut FeedState,
    notif_tx: &mpsc::Sender<FeedNotification>,
    text: &str,
) -> Result<(), ()> {
    let frame: ChannelFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "Malformed feed push, skipping");
            return Ok(());
        }
    };

    match frame {
        ChannelFrame::Snapshot { docs } => {
            debug!(count = docs.len(), "Initial feed snapshot received");
            state.replace_all(
                docs.into_iter()
                    .map(|d| (PublicationId(d.id), d.doc))
                    .collect(),
            );
        }
        ChannelFrame::Insert { id, doc } | ChannelFrame::Update { id, doc } => {
            state.upsert(PublicationId(id), doc);
        }
        ChannelFrame::Delete { id } => {
            state.remove(&PublicationId(id));
        }
        ChannelFrame::Error { message } => {
            warn!(message = %message, "Feed channel reported an error");
            let _ = notif_tx.send(FeedNotification::Error(message)).await;
            return Err(());
        }
    }

    emit(state, notif_tx).await
}

async fn handle_create(
    client: &RemoteClient,
    query: &FeedQuery,
    state: &mut FeedState,
    notif_tx: &mpsc::Sender<FeedNotification>,
    id: PublicationId,
    doc: PublicationDoc,
    reply: oneshot::Sender<Result<(), SyncError>>,
) {
    // The document becomes visible immediately, flagged pending, without a
    // commit time; the store resolves its display timestamp locally.
    state.begin_write(&id);
    state.upsert(id.clone(), doc.clone());
    let _ = emit(state, notif_tx).await;

    let url = client.document_url(&query.collection, &id.0);
    let result = client
        .http()
        .put(&url)
        .bearer_auth(client.auth_token())
        .json(&doc)
        .send()
        .await;

    let outcome = match result {
        Ok(response) if response.status().is_success() => {
            match response.json::<CreateAck>().await {
                Ok(ack) => {
                    if let Some(cached) = state.get_mut(&id) {
                        cached.created_at = Some(ack.created_at);
                    }
                    Ok(())
                }
                // Acknowledged but no commit time in the body; the next
                // server push will carry it.
                Err(_) => Ok(()),
            }
        }
        Ok(response) => Err(SyncError::Rejected(format!(
            "create returned {}",
            response.status()
        ))),
        Err(e) => Err(SyncError::Transport(e.to_string())),
    };

    state.end_write(&id);
    if outcome.is_err() {
        // A failed post produces no remote entry.
        state.remove(&id);
    }
    let _ = emit(state, notif_tx).await;

    if reply.send(outcome).is_err() {
        debug!("Create reply receiver dropped");
    }
}

async fn handle_increment(
    client: &RemoteClient,
    query: &FeedQuery,
    state: &mut FeedState,
    notif_tx: &mpsc::Sender<FeedNotification>,
    id: PublicationId,
    field: CounterField,
) {
    // Optimistic bump; the next server push is authoritative either way.
    if let Some(doc) = state.get_mut(&id) {
        match field {
            CounterField::Likes => doc.like_count += 1,
            CounterField::Dislikes => doc.dislike_count += 1,
        }
        state.begin_write(&id);
        let _ = emit(state, notif_tx).await;
    } else {
        debug!(id = %id, "Increment for unknown publication");
        return;
    }

    let url = format!("{}/increment", client.document_url(&query.collection, &id.0));
    let result = client
        .http()
        .post(&url)
        .bearer_auth(client.auth_token())
        .json(&serde_json::json!({ "field": field.as_str(), "by": 1 }))
        .send()
        .await;

    if let Err(e) = result {
        warn!(id = %id, field = field.as_str(), error = %e, "Counter increment failed");
    }

    state.end_write(&id);
    let _ = emit(state, notif_tx).await;
}

async fn handle_append_comment(
    client: &RemoteClient,
    query: &FeedQuery,
    state: &mut FeedState,
    notif_tx: &mpsc::Sender<FeedNotification>,
    id: PublicationId,
    comment: CommentDoc,
) {
    if let Some(doc) = state.get_mut(&id) {
        doc.comments.push(comment.clone());
        state.begin_write(&id);
        let _ = emit(state, notif_tx).await;
    } else {
        debug!(id = %id, "Comment for unknown publication");
        return;
    }

    let url = format!("{}/comments", client.document_url(&query.collection, &id.0));
    let result = client
        .http()
        .post(&url)
        .bearer_auth(client.auth_token())
        .json(&comment)
        .send()
        .await;

    if let Err(e) = result {
        warn!(id = %id, error = %e, "Comment append failed");
    }

    state.end_write(&id);
    let _ = emit(state, notif_tx).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use dollclub_shared::types::{PublicationKind, UserId};

    fn doc(content: &str) -> PublicationDoc {
        PublicationDoc {
            author: UserId("u1".into()),
            kind: PublicationKind::Text,
            content: content.into(),
            description: None,
            like_count: 0,
            dislike_count: 0,
            comments: Vec::new(),
            created_at: None,
        }
    }

    #[test]
    fn pending_follows_in_flight_writes() {
        let mut state = FeedState::default();
        let id = PublicationId("p1".into());

        state.begin_write(&id);
        state.upsert(id.clone(), doc("hi"));
        assert!(state.snapshot().docs[0].pending);

        state.end_write(&id);
        assert!(!state.snapshot().docs[0].pending);
    }

    #[test]
    fn overlapping_writes_keep_the_doc_pending() {
        let mut state = FeedState::default();
        let id = PublicationId("p1".into());
        state.upsert(id.clone(), doc("hi"));

        state.begin_write(&id);
        state.begin_write(&id);
        state.end_write(&id);
        assert!(state.snapshot().docs[0].pending);

        state.end_write(&id);
        assert!(!state.snapshot().docs[0].pending);
    }

    #[test]
    fn full_snapshot_preserves_in_flight_creates() {
        let mut state = FeedState::default();
        let local = PublicationId("local".into());

        state.begin_write(&local);
        state.upsert(local.clone(), doc("optimistic"));

        state.replace_all(vec![(PublicationId("server".into()), doc("committed"))]);

        let snap = state.snapshot();
        assert_eq!(snap.docs.len(), 2);
        assert!(snap.docs.iter().any(|d| d.id == local && d.pending));
    }

    #[test]
    fn upsert_preserves_arrival_order() {
        let mut state = FeedState::default();
        state.upsert(PublicationId("a".into()), doc("1"));
        state.upsert(PublicationId("b".into()), doc("2"));
        state.upsert(PublicationId("a".into()), doc("1-updated"));

        let snap = state.snapshot();
        assert_eq!(snap.docs[0].id, PublicationId("a".into()));
        assert_eq!(snap.docs[0].doc.content, "1-updated");
        assert_eq!(snap.docs[1].id, PublicationId("b".into()));
    }

    #[test]
    fn channel_frames_parse() {
        let insert = r#"{"event":"insert","id":"p9","doc":{"author":"u2","kind":"image","content":"https://cdn/x.jpg"}}"#;
        match serde_json::from_str::<ChannelFrame>(insert).unwrap() {
            ChannelFrame::Insert { id, doc } => {
                assert_eq!(id, "p9");
                assert_eq!(doc.kind, PublicationKind::Image);
                assert_eq!(doc.like_count, 0);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
