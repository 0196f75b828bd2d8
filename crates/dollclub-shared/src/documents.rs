//! Remote document schemas pushed by the hosted backend.
//!
//! The backend performs partial updates: a push for a publication may omit
//! counter and array fields entirely, so every such field defaults to its
//! zero/empty value on deserialization.  The server commit timestamp is
//! absent until the write that produced the document is durable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CommentId, PublicationId, PublicationKind, UserId};

/// A feed publication as stored remotely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicationDoc {
    pub author: UserId,
    pub kind: PublicationKind,
    /// Text body for text publications, media reference otherwise.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub dislike_count: u32,
    #[serde(default)]
    pub comments: Vec<CommentDoc>,
    /// Server-assigned commit time.  `None` while the creating write is not
    /// yet acknowledged as durable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A comment embedded in a publication document (insertion-ordered).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommentDoc {
    pub id: CommentId,
    pub author: UserId,
    pub text: String,
    /// Client-stamped creation time.
    pub created_at: DateTime<Utc>,
}

/// One publication document plus its local-write state.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: PublicationId,
    pub doc: PublicationDoc,
    /// True while a locally-issued write to this document has not yet been
    /// acknowledged as durable by the backend.
    pub pending: bool,
}

/// One full push from the remote feed channel.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub docs: Vec<DocumentSnapshot>,
    /// Local receipt time, used to resolve display timestamps for documents
    /// that have no server commit time yet.
    pub received_at: DateTime<Utc>,
}

/// Account role as stored remotely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    #[default]
    Member,
    Host,
    Admin,
}

/// A user account document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Virtual-currency balance.
    #[serde(default)]
    pub diamonds: u64,
    #[serde(default)]
    pub role: AccountRole,
    #[serde(default)]
    pub banned: bool,
    /// Photo album media references.
    #[serde(default)]
    pub album: Vec<String>,
    #[serde(default)]
    pub withdrawals: Vec<WithdrawalDoc>,
}

/// One diamonds-withdrawal record on a user account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalDoc {
    pub amount: u64,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Requested,
    Paid,
    Refused,
}

/// Partial account update for `upsert_user`.  Only present fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diamonds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_publication_defaults_counters() {
        // A push carrying only the identity fields must not fail; every
        // counter/array defaults to its zero value.
        let json = r#"{ "author": "u1", "kind": "text", "content": "hi" }"#;
        let doc: PublicationDoc = serde_json::from_str(json).unwrap();

        assert_eq!(doc.like_count, 0);
        assert_eq!(doc.dislike_count, 0);
        assert!(doc.comments.is_empty());
        assert!(doc.created_at.is_none());
    }

    #[test]
    fn user_patch_serializes_only_present_fields() {
        let patch = UserPatch {
            diamonds: Some(120),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&patch).unwrap(),
            r#"{"diamonds":120}"#
        );
    }
}
