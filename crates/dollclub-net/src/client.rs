//! The hosted-backend client handle.
//!
//! One [`RemoteClient`] exists per process: the entry point constructs it
//! from [`RemoteConfig`] and injects a clone into every consumer (feed
//! channel, account store, endpoint session).  Cloning shares the underlying
//! HTTP connection pool.

use tracing::info;

/// Connection settings for the hosted backend and the co-host endpoint.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the backend REST API, e.g. `https://api.mydollclub.app`.
    pub api_url: String,
    /// Base URL of the realtime channels, e.g. `wss://rt.mydollclub.app`.
    pub realtime_url: String,
    /// Application/project identifier.
    pub app_id: String,
    /// Bearer token of the signed-in user.
    pub auth_token: String,
}

#[derive(Clone)]
pub struct RemoteClient {
    config: RemoteConfig,
    http: reqwest::Client,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> Self {
        info!(app = %config.app_id, api = %config.api_url, "Remote client created");
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn auth_token(&self) -> &str {
        &self.config.auth_token
    }

    /// REST URL of a collection: `{api}/v1/{app}/{collection}`.
    pub fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/v1/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.app_id,
            collection
        )
    }

    /// REST URL of a single document.
    pub fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(collection), id)
    }

    /// WebSocket URL of a realtime channel topic.
    pub fn channel_url(&self, topic: &str) -> String {
        format!(
            "{}/realtime/{}/{}?token={}",
            self.config.realtime_url.trim_end_matches('/'),
            self.config.app_id,
            topic,
            self.config.auth_token
        )
    }

    /// WebSocket URL of the co-host streaming endpoint.
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/cohost/{}/stream?token={}",
            self.config.realtime_url.trim_end_matches('/'),
            self.config.app_id,
            self.config.auth_token
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RemoteClient {
        RemoteClient::new(RemoteConfig {
            api_url: "https://api.example.com/".into(),
            realtime_url: "wss://rt.example.com".into(),
            app_id: "dollclub".into(),
            auth_token: "tok".into(),
        })
    }

    #[test]
    fn urls_are_well_formed() {
        let c = client();
        assert_eq!(
            c.document_url("publications", "p1"),
            "https://api.example.com/v1/dollclub/publications/p1"
        );
        assert_eq!(
            c.channel_url("publications"),
            "wss://rt.example.com/realtime/dollclub/publications?token=tok"
        );
    }
}
