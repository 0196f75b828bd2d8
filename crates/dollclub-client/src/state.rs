//! Client construction inputs: the signed-in identity and the connection
//! settings the entry point wires into [`crate::Client::connect`].

use std::path::PathBuf;

use dollclub_net::{EndpointConfig, RemoteConfig};
use dollclub_shared::types::UserId;

/// The signed-in user, as reported by the hosted auth service.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub display_name: Option<String>,
}

/// Everything needed to bring the client up.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user: AuthUser,
    pub remote: RemoteConfig,
    /// Co-host session settings used for broadcasts.
    pub endpoint: EndpointConfig,
    /// Explicit database location; the platform data directory when `None`.
    pub db_path: Option<PathBuf>,
}
