// Remote transport layer: the hosted backend (REST + realtime channel) and
// the co-host streaming endpoint (JSON over WebSocket).

pub mod accounts;
pub mod client;
pub mod endpoint;
pub mod feed;

pub use accounts::UserAccountStore;
pub use client::{RemoteClient, RemoteConfig};
pub use endpoint::{spawn_endpoint, EndpointCommand, EndpointConfig, EndpointNotification};
pub use feed::{spawn_feed_channel, CounterField, FeedCommand, FeedNotification, FeedQuery};
