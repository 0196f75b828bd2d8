//! Read/write access to user account documents.

use tracing::{debug, info};

use dollclub_shared::documents::{UserDoc, UserPatch};
use dollclub_shared::error::SyncError;
use dollclub_shared::types::UserId;

use crate::client::RemoteClient;

const COLLECTION: &str = "users";

/// Gateway to the hosted user-account collection.  Profile fields read by
/// the presentation layer (diamonds balance, role, banned status, album,
/// withdrawal records) live behind this store.
#[derive(Clone)]
pub struct UserAccountStore {
    client: RemoteClient,
}

impl UserAccountStore {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    pub async fn get_user(&self, id: &UserId) -> Result<UserDoc, SyncError> {
        let url = self.client.document_url(COLLECTION, &id.0);
        let response = self
            .client
            .http()
            .get(&url)
            .bearer_auth(self.client.auth_token())
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::Rejected(format!(
                "get_user returned {}",
                response.status()
            )));
        }

        let doc = response
            .json::<UserDoc>()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        debug!(user = %id.short(), "Fetched user document");
        Ok(doc)
    }

    /// Apply a partial update.  Only fields present in the patch are sent.
    pub async fn upsert_user(&self, id: &UserId, patch: UserPatch) -> Result<(), SyncError> {
        let url = self.client.document_url(COLLECTION, &id.0);
        let response = self
            .client
            .http()
            .patch(&url)
            .bearer_auth(self.client.auth_token())
            .json(&patch)
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::Rejected(format!(
                "upsert_user returned {}",
                response.status()
            )));
        }

        info!(user = %id.short(), "User document updated");
        Ok(())
    }
}
