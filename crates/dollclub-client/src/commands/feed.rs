use tokio::sync::watch;

use dollclub_shared::types::PublicationId;
use dollclub_store::{Publication, PublicationDraft};

use crate::{Client, ClientError};

impl Client {
    /// Subscribe to the ordered feed view.  Dropping the receiver
    /// unsubscribes.
    pub fn subscribe_feed(&self) -> watch::Receiver<Vec<Publication>> {
        self.feed().subscribe()
    }

    /// The current ordered feed view.
    pub fn current_feed(&self) -> Vec<Publication> {
        self.feed().current()
    }

    /// Publish a new entry to the feed.
    pub async fn post(&self, draft: PublicationDraft) -> Result<PublicationId, ClientError> {
        self.feed().post(draft).await
    }

    /// Best-effort like; failures are logged, never surfaced.
    pub async fn like(&self, id: PublicationId) {
        self.feed().like(id).await;
    }

    /// Best-effort dislike.
    pub async fn dislike(&self, id: PublicationId) {
        self.feed().dislike(id).await;
    }

    /// Best-effort comment with a client-generated id and timestamp.
    pub async fn comment(&self, id: PublicationId, text: String) {
        self.feed().comment(id, text).await;
    }
}
