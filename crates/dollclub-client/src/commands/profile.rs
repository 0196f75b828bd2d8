use anyhow::anyhow;
use chrono::Utc;
use tracing::warn;

use dollclub_shared::documents::{UserDoc, UserPatch};
use dollclub_shared::types::UserId;
use dollclub_store::CachedProfile;

use crate::events::{emit, ClientEvent};
use crate::{Client, ClientError};

impl Client {
    /// Fetch a user's profile from the account store, refreshing the local
    /// cache.  Falls back to the cached copy when the backend is
    /// unreachable.
    pub async fn fetch_profile(&self, user_id: &UserId) -> Result<CachedProfile, ClientError> {
        match self.accounts.get_user(user_id).await {
            Ok(doc) => {
                let profile = profile_from_doc(user_id, doc);
                {
                    let db = self.db.lock().map_err(|_| anyhow!("db lock poisoned"))?;
                    db.upsert_profile(&profile)?;
                }
                emit(
                    &self.events,
                    ClientEvent::ProfileUpdated {
                        user_id: user_id.clone(),
                    },
                );
                Ok(profile)
            }
            Err(e) => {
                warn!(user = %user_id.short(), error = %e, "Profile fetch failed, trying cache");
                let db = self.db.lock().map_err(|_| anyhow!("db lock poisoned"))?;
                db.get_profile(user_id).map_err(|_| ClientError::Sync(e))
            }
        }
    }

    /// Apply a partial update to the signed-in user's profile.
    pub async fn update_profile(&self, patch: UserPatch) -> Result<(), ClientError> {
        self.accounts.upsert_user(&self.user.id, patch).await?;
        emit(
            &self.events,
            ClientEvent::ProfileUpdated {
                user_id: self.user.id.clone(),
            },
        );
        Ok(())
    }

    /// The signed-in user's virtual-currency balance.
    pub async fn diamonds_balance(&self) -> Result<u64, ClientError> {
        self.fetch_profile(&self.user.id).await.map(|p| p.diamonds)
    }
}

fn profile_from_doc(user_id: &UserId, doc: UserDoc) -> CachedProfile {
    CachedProfile {
        user_id: user_id.clone(),
        display_name: doc.display_name,
        avatar_url: doc.avatar_url,
        diamonds: doc.diamonds,
        role: doc.role,
        banned: doc.banned,
        updated_at: Utc::now(),
    }
}
