use tokio::sync::broadcast;

use dollclub_shared::types::{BroadcastStatus, ConversationId, Speaker, UserId};

/// Capacity of the client event channel.  Slow subscribers lag and skip,
/// they never block the core.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events pushed to presentation-layer subscribers.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The visible feed changed; the new view is on the feed watch channel.
    FeedUpdated { count: usize },

    /// The broadcast session entered a new state.
    BroadcastStateChanged { status: BroadcastStatus },

    /// A broadcast attempt or live session failed.  The session is back to
    /// idle; the start control should be re-enabled.
    BroadcastFailed { reason: String },

    /// A transcribed-text fragment from the live session, verbatim.
    Transcription { speaker: Speaker, text: String },

    /// A private message was stored for this conversation.
    NewPrivateMessage { conversation_id: ConversationId },

    /// A profile document was fetched or updated.
    ProfileUpdated { user_id: UserId },
}

pub fn event_channel() -> (broadcast::Sender<ClientEvent>, broadcast::Receiver<ClientEvent>) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}

/// Publish an event.  Having no subscribers is not an error.
pub fn emit(events: &broadcast::Sender<ClientEvent>, event: ClientEvent) {
    let _ = events.send(event);
}
