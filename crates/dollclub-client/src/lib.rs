//! # dollclub-client
//!
//! The Doll Club client core: feed synchronization, broadcast sessions,
//! private messaging, and profile access, exposed as a library facade for
//! whatever presentation layer sits on top.  Subscribers receive state
//! through [`events::ClientEvent`] and the feed watch channel; commands are
//! grouped by domain under [`commands`].

pub mod broadcast;
pub mod commands;
pub mod events;
pub mod feed_store;
pub mod state;

use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::broadcast as tokio_broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use dollclub_media::SessionError;
use dollclub_net::{
    spawn_feed_channel, FeedQuery, RemoteClient, UserAccountStore,
};
use dollclub_shared::error::{EndpointError, MediaError, SyncError, ValidationError};
use dollclub_store::{Database, StoreError};

use crate::broadcast::BroadcastController;
use crate::events::{event_channel, ClientEvent};
use crate::feed_store::FeedSyncStore;
use crate::state::{AuthUser, ClientConfig};

/// Errors surfaced by the client facade.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Initialise the tracing subscriber with the default filter.  Call once
/// from the process entry point.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "dollclub_client=debug,dollclub_net=debug,dollclub_store=info,dollclub_media=info,warn",
        )
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// The connected client.  One instance per signed-in session; cheap handles
/// (the feed subscription, the event receiver) are cloned out of it.
pub struct Client {
    user: AuthUser,
    db: Mutex<Database>,
    accounts: UserAccountStore,
    feed: FeedSyncStore,
    broadcast: BroadcastController,
    events: tokio_broadcast::Sender<ClientEvent>,
}

impl Client {
    /// Construct the remote client, open the local database, subscribe to
    /// the publication feed, and wire up the broadcast controller.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        tracing::info!(user = %config.user.id.short(), "Starting Doll Club client");

        let remote = RemoteClient::new(config.remote);

        let db = match &config.db_path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };

        let (events, _initial_rx) = event_channel();

        let (feed_cmd_tx, feed_notif_rx) =
            spawn_feed_channel(remote.clone(), FeedQuery::default())
                .await
                .map_err(|e| SyncError::Transport(e.to_string()))?;
        let feed = FeedSyncStore::new(
            config.user.id.clone(),
            feed_cmd_tx,
            feed_notif_rx,
            events.clone(),
        );

        let broadcast = BroadcastController::new(remote.clone(), config.endpoint, events.clone());
        let accounts = UserAccountStore::new(remote);

        Ok(Self {
            user: config.user,
            db: Mutex::new(db),
            accounts,
            feed,
            broadcast,
            events,
        })
    }

    pub fn user(&self) -> &AuthUser {
        &self.user
    }

    /// Subscribe to client events.  Slow subscribers lag and skip.
    pub fn events(&self) -> tokio_broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn feed(&self) -> &FeedSyncStore {
        &self.feed
    }

    pub fn broadcast(&self) -> &BroadcastController {
        &self.broadcast
    }

    /// Graceful teardown: stop any running broadcast and close the feed
    /// subscription.
    pub async fn shutdown(&self) {
        self.broadcast.stop().await;
        self.feed.shutdown().await;
    }
}
