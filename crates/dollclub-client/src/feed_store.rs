//! The feed synchronization store.
//!
//! Presents a single, time-ordered, duplicate-free view of the publication
//! feed to any number of subscribers, combining the remote push subscription
//! with locally-issued writes.  The remote channel is the sole source of
//! truth for set membership; this store only validates writes, resolves
//! display timestamps, orders, and truncates.

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, warn};

use dollclub_net::{CounterField, FeedCommand, FeedNotification};
use dollclub_shared::constants::FEED_VISIBLE_LIMIT;
use dollclub_shared::documents::{CommentDoc, FeedSnapshot, PublicationDoc};
use dollclub_shared::error::{SyncError, ValidationError};
use dollclub_shared::types::{CommentId, PublicationId, PublicationKind, UserId};
use dollclub_store::{Publication, PublicationComment, PublicationDraft};

use crate::events::{emit, ClientEvent};
use crate::ClientError;

pub struct FeedSyncStore {
    author: UserId,
    cmd_tx: mpsc::Sender<FeedCommand>,
    view_rx: watch::Receiver<Vec<Publication>>,
}

impl FeedSyncStore {
    /// Wire the store to the channel halves returned by
    /// [`dollclub_net::spawn_feed_channel`] and spawn the reconciliation
    /// task.
    pub fn new(
        author: UserId,
        cmd_tx: mpsc::Sender<FeedCommand>,
        mut notif_rx: mpsc::Receiver<FeedNotification>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let (view_tx, view_rx) = watch::channel(Vec::new());

        tokio::spawn(async move {
            while let Some(notification) = notif_rx.recv().await {
                match notification {
                    FeedNotification::Snapshot(snapshot) => {
                        let view = reconcile(&snapshot);
                        let count = view.len();
                        if view_tx.send(view).is_err() {
                            // Every receiver is gone; keep draining so the
                            // channel task is not blocked on a full buffer.
                            debug!("No feed subscribers left");
                        }
                        emit(&events, ClientEvent::FeedUpdated { count });
                    }
                    FeedNotification::Error(message) => {
                        // Keep serving the last known-good snapshot until
                        // the subscription recovers.
                        warn!(message = %message, "Feed subscription error");
                    }
                }
            }
            debug!("Feed notification stream ended");
        });

        Self {
            author,
            cmd_tx,
            view_rx,
        }
    }

    /// Register a subscriber.  Every subscriber observes the same ordered
    /// snapshot; dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Publication>> {
        self.view_rx.clone()
    }

    /// The current ordered feed view.
    pub fn current(&self) -> Vec<Publication> {
        self.view_rx.borrow().clone()
    }

    /// Publish a new entry.
    ///
    /// Validation failures are rejected before any remote call.  The store
    /// does not synthesize a local entry: the entry becomes visible through
    /// the remote channel's own pending push.
    pub async fn post(&self, draft: PublicationDraft) -> Result<PublicationId, ClientError> {
        validate(&draft)?;

        let id = PublicationId::new();
        let doc = PublicationDoc {
            author: self.author.clone(),
            kind: draft.kind,
            content: draft.content,
            description: draft.description,
            like_count: 0,
            dislike_count: 0,
            comments: Vec::new(),
            created_at: None,
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(FeedCommand::Create {
                id: id.clone(),
                doc,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;

        reply_rx.await.map_err(|_| SyncError::ChannelClosed)??;

        debug!(id = %id, "Publication created");
        Ok(id)
    }

    /// Best-effort like counter bump.  Failures are logged, never surfaced.
    pub async fn like(&self, id: PublicationId) {
        self.increment(id, CounterField::Likes).await;
    }

    /// Best-effort dislike counter bump.
    pub async fn dislike(&self, id: PublicationId) {
        self.increment(id, CounterField::Dislikes).await;
    }

    async fn increment(&self, id: PublicationId, field: CounterField) {
        if self
            .cmd_tx
            .send(FeedCommand::Increment {
                id: id.clone(),
                field,
            })
            .await
            .is_err()
        {
            warn!(id = %id, field = field.as_str(), "Counter increment dropped: channel closed");
        }
    }

    /// Close the remote channel gracefully.  The last snapshot keeps
    /// serving subscribers that are still attached.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(FeedCommand::Shutdown).await;
    }

    /// Append a comment with a client-generated id and client-stamped time.
    /// Best-effort: failures are logged, never surfaced.
    pub async fn comment(&self, id: PublicationId, text: String) {
        let comment = CommentDoc {
            id: CommentId::new(),
            author: self.author.clone(),
            text,
            created_at: Utc::now(),
        };

        if self
            .cmd_tx
            .send(FeedCommand::AppendComment {
                id: id.clone(),
                comment,
            })
            .await
            .is_err()
        {
            warn!(id = %id, "Comment dropped: channel closed");
        }
    }
}

/// Reject drafts the backend would never accept: text entries need content,
/// media entries need a media reference.
fn validate(draft: &PublicationDraft) -> Result<(), ValidationError> {
    match draft.kind {
        PublicationKind::Text if draft.content.trim().is_empty() => {
            Err(ValidationError::EmptyText)
        }
        PublicationKind::Image | PublicationKind::Video if draft.content.trim().is_empty() => {
            Err(ValidationError::MissingMedia)
        }
        _ => Ok(()),
    }
}

/// Rebuild the visible feed from one remote push.
///
/// Display timestamps resolve to the server commit time whenever present,
/// unconditionally; otherwise to the snapshot's local receipt time.  The
/// sort is stable, so entries with equal resolved timestamps keep the
/// arrival order of the underlying push.
fn reconcile(snapshot: &FeedSnapshot) -> Vec<Publication> {
    let mut view: Vec<Publication> = snapshot
        .docs
        .iter()
        .map(|entry| Publication {
            id: entry.id.clone(),
            author: entry.doc.author.clone(),
            kind: entry.doc.kind,
            content: entry.doc.content.clone(),
            description: entry.doc.description.clone(),
            like_count: entry.doc.like_count,
            dislike_count: entry.doc.dislike_count,
            comments: entry
                .doc
                .comments
                .iter()
                .map(|c| PublicationComment {
                    id: c.id,
                    author: c.author.clone(),
                    text: c.text.clone(),
                    created_at: c.created_at,
                })
                .collect(),
            created_at: entry.doc.created_at.unwrap_or(snapshot.received_at),
            pending: entry.pending,
        })
        .collect();

    view.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    view.truncate(FEED_VISIBLE_LIMIT);
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use dollclub_shared::documents::DocumentSnapshot;

    fn doc(content: &str, created_at: Option<chrono::DateTime<Utc>>) -> PublicationDoc {
        PublicationDoc {
            author: UserId("u1".into()),
            kind: PublicationKind::Text,
            content: content.into(),
            description: None,
            like_count: 0,
            dislike_count: 0,
            comments: Vec::new(),
            created_at,
        }
    }

    fn store_with_channel() -> (
        FeedSyncStore,
        mpsc::Receiver<FeedCommand>,
        mpsc::Sender<FeedNotification>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (notif_tx, notif_rx) = mpsc::channel(8);
        // Emitting with no subscribers is fine; the sender ignores it.
        let (events, _rx) = crate::events::event_channel();
        let store = FeedSyncStore::new(UserId("me".into()), cmd_tx, notif_rx, events);
        (store, cmd_rx, notif_tx)
    }

    #[tokio::test]
    async fn empty_text_post_is_rejected_before_any_remote_call() {
        let (store, mut cmd_rx, _notif_tx) = store_with_channel();

        let result = store
            .post(PublicationDraft {
                kind: PublicationKind::Text,
                content: "   ".into(),
                description: None,
            })
            .await;

        assert!(matches!(
            result,
            Err(ClientError::Validation(ValidationError::EmptyText))
        ));
        assert!(cmd_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn media_post_without_reference_is_rejected() {
        let (store, mut cmd_rx, _notif_tx) = store_with_channel();

        let result = store
            .post(PublicationDraft {
                kind: PublicationKind::Image,
                content: "".into(),
                description: Some("my album".into()),
            })
            .await;

        assert!(matches!(
            result,
            Err(ClientError::Validation(ValidationError::MissingMedia))
        ));
        assert!(cmd_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn valid_post_issues_exactly_one_create() {
        let (store, mut cmd_rx, _notif_tx) = store_with_channel();

        let responder = tokio::spawn(async move {
            let mut creates = 0;
            if let Some(FeedCommand::Create { reply, .. }) = cmd_rx.recv().await {
                creates += 1;
                reply.send(Ok(())).unwrap();
            }
            // No further command may follow.
            assert!(cmd_rx.try_recv().is_err());
            creates
        });

        let id = store
            .post(PublicationDraft {
                kind: PublicationKind::Text,
                content: "hello".into(),
                description: None,
            })
            .await
            .expect("post should succeed");
        assert!(!id.0.is_empty());

        assert_eq!(responder.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_create_surfaces_a_sync_error() {
        let (store, mut cmd_rx, _notif_tx) = store_with_channel();

        tokio::spawn(async move {
            if let Some(FeedCommand::Create { reply, .. }) = cmd_rx.recv().await {
                reply
                    .send(Err(SyncError::Transport("offline".into())))
                    .unwrap();
            }
        });

        let result = store
            .post(PublicationDraft {
                kind: PublicationKind::Text,
                content: "hello".into(),
                description: None,
            })
            .await;

        assert!(matches!(result, Err(ClientError::Sync(_))));
    }

    #[tokio::test]
    async fn like_and_comment_are_fire_and_forget() {
        let (store, mut cmd_rx, _notif_tx) = store_with_channel();
        let id = PublicationId("p1".into());

        store.like(id.clone()).await;
        store.comment(id.clone(), "cute!".into()).await;

        match cmd_rx.recv().await.unwrap() {
            FeedCommand::Increment { field, .. } => assert_eq!(field, CounterField::Likes),
            other => panic!("unexpected command: {other:?}"),
        }
        match cmd_rx.recv().await.unwrap() {
            FeedCommand::AppendComment { comment, .. } => {
                assert_eq!(comment.text, "cute!");
                assert_eq!(comment.author, UserId("me".into()));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn snapshots_reach_every_subscriber_ordered_and_truncated() {
        let (store, _cmd_rx, notif_tx) = store_with_channel();
        let mut sub_a = store.subscribe();
        let mut sub_b = store.subscribe();

        let received_at = Utc::now();
        // 60 docs, oldest first, so ordering and the 50-entry cap both matter.
        let docs = (0..60i64)
            .map(|i| DocumentSnapshot {
                id: PublicationId(format!("p{i}")),
                doc: doc(
                    &format!("entry {i}"),
                    Some(received_at - Duration::seconds(60 - i)),
                ),
                pending: false,
            })
            .collect();

        notif_tx
            .send(FeedNotification::Snapshot(FeedSnapshot {
                docs,
                received_at,
            }))
            .await
            .unwrap();

        sub_a.changed().await.unwrap();
        sub_b.changed().await.unwrap();

        let view = sub_a.borrow().clone();
        assert_eq!(view.len(), FEED_VISIBLE_LIMIT);
        // Most recent first.
        assert_eq!(view[0].id, PublicationId("p59".into()));
        assert!(view.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert_eq!(*sub_b.borrow(), view);
    }

    #[test]
    fn pending_docs_resolve_to_receipt_time_and_sort_first() {
        let received_at = Utc::now();
        let snapshot = FeedSnapshot {
            docs: vec![
                DocumentSnapshot {
                    id: PublicationId("committed".into()),
                    doc: doc("old", Some(received_at - Duration::minutes(5))),
                    pending: false,
                },
                DocumentSnapshot {
                    id: PublicationId("pending".into()),
                    doc: doc("just posted", None),
                    pending: true,
                },
            ],
            received_at,
        };

        let view = reconcile(&snapshot);
        assert_eq!(view[0].id, PublicationId("pending".into()));
        assert_eq!(view[0].created_at, received_at);
        assert!(view[0].pending);
    }

    #[test]
    fn server_commit_time_is_preferred_unconditionally() {
        // Once the commit time arrives, it wins even if the receipt time
        // would sort the entry elsewhere.
        let received_at = Utc::now();
        let commit = received_at + Duration::seconds(30);
        let snapshot = FeedSnapshot {
            docs: vec![DocumentSnapshot {
                id: PublicationId("p1".into()),
                doc: doc("hello", Some(commit)),
                pending: true,
            }],
            received_at,
        };

        assert_eq!(reconcile(&snapshot)[0].created_at, commit);
    }

    #[test]
    fn equal_timestamps_keep_push_arrival_order() {
        let received_at = Utc::now();
        let ts = Some(received_at - Duration::seconds(1));
        let snapshot = FeedSnapshot {
            docs: vec![
                DocumentSnapshot {
                    id: PublicationId("first".into()),
                    doc: doc("a", ts),
                    pending: false,
                },
                DocumentSnapshot {
                    id: PublicationId("second".into()),
                    doc: doc("b", ts),
                    pending: false,
                },
            ],
            received_at,
        };

        let view = reconcile(&snapshot);
        assert_eq!(view[0].id, PublicationId("first".into()));
        assert_eq!(view[1].id, PublicationId("second".into()));
    }
}
