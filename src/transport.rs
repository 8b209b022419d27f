// src/transport.rs
//! Raw text fetching through the pass-through relay. No caching and no
//! request-level retries: failure policy belongs to the orchestrator.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, WatchError};

pub const DEFAULT_RELAY_URL: &str = "https://api.allorigins.win/raw?url=";
pub const ENV_RELAY_URL: &str = "NEWSWATCH_RELAY_URL";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "NEWSWATCH_HTTP_TIMEOUT_SECS";

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// `reqwest`-backed transport that routes every request through a relay
/// prefix, e.g. `https://relay/raw?url=<encoded target>`.
#[derive(Debug, Clone)]
pub struct RelayTransport {
    client: reqwest::Client,
    relay: String,
}

impl RelayTransport {
    pub fn new(relay: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("newswatch/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            relay: relay.into(),
        })
    }

    /// Relay from `NEWSWATCH_RELAY_URL`, timeout from
    /// `NEWSWATCH_HTTP_TIMEOUT_SECS` (default 20s).
    pub fn from_env() -> anyhow::Result<Self> {
        let relay = std::env::var(ENV_RELAY_URL).unwrap_or_else(|_| DEFAULT_RELAY_URL.to_string());
        let secs: u64 = std::env::var(ENV_HTTP_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);
        Self::new(relay, Duration::from_secs(secs))
    }

    pub fn relayed_url(&self, target: &str) -> String {
        relayed_url(&self.relay, target)
    }
}

/// An empty relay means "talk to the target directly".
pub fn relayed_url(relay: &str, target: &str) -> String {
    if relay.is_empty() {
        return target.to_string();
    }
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("{relay}{encoded}")
}

#[async_trait]
impl Transport for RelayTransport {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let full = self.relayed_url(url);
        tracing::debug!(target: "transport", url, "GET via relay");

        let resp = self
            .client
            .get(&full)
            .send()
            .await
            .map_err(|e| WatchError::transport(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(WatchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| WatchError::transport(url, e))
    }
}
