//! Domain model structs handed to the presentation layer.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can cross the
//! process boundary to whatever UI consumes the client library.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dollclub_shared::documents::AccountRole;
use dollclub_shared::types::{CommentId, ConversationId, PublicationId, PublicationKind, UserId};

// ---------------------------------------------------------------------------
// Publication (resolved feed entry)
// ---------------------------------------------------------------------------

/// A feed entry as presented to the UI: remote document plus resolved
/// display timestamp and local-write state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Publication {
    /// Remote document id.
    pub id: PublicationId,
    pub author: UserId,
    pub kind: PublicationKind,
    /// Text body for text publications, media reference otherwise.
    pub content: String,
    pub description: Option<String>,
    pub like_count: u32,
    pub dislike_count: u32,
    /// Embedded comments, insertion-ordered.
    pub comments: Vec<PublicationComment>,
    /// Resolved display timestamp: server commit time when present,
    /// local receipt time otherwise.
    pub created_at: DateTime<Utc>,
    /// True while a write to this entry is not yet durable remotely.
    pub pending: bool,
}

/// One comment on a publication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicationComment {
    pub id: CommentId,
    pub author: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A draft submitted through `post`.
#[derive(Debug, Clone)]
pub struct PublicationDraft {
    pub kind: PublicationKind,
    /// Text body for text publications, media reference otherwise.
    pub content: String,
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversation / private message
// ---------------------------------------------------------------------------

/// A direct-message thread with one other user.  Local-only: threads live in
/// the local database, not the hosted backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    /// The other participant.
    pub participant_id: UserId,
    pub participant_name: Option<String>,
    pub unread_count: u32,
    pub online: bool,
    pub created_at: DateTime<Utc>,
}

/// Payload of a private message, per kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text { text: String },
    Sticker { sticker_id: String },
    Voice { media_ref: String, duration_ms: u32 },
}

/// A single private message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrivateMessage {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    /// True when this user sent the message, false when the other side did.
    pub outgoing: bool,
    pub body: MessageBody,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Cached profile
// ---------------------------------------------------------------------------

/// Locally cached copy of a user document, refreshed from the account store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedProfile {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub diamonds: u64,
    pub role: AccountRole,
    pub banned: bool,
    pub updated_at: DateTime<Utc>,
}
