// tests/common/mod.rs
// Shared doubles for the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use newswatch::config::{AgentConfig, ConfigStore, Source};
use newswatch::error::{Result, WatchError};
use newswatch::storage::{MemoryStorage, Storage};
use newswatch::transport::Transport;
use newswatch::Monitor;

#[derive(Clone)]
enum Reply {
    Body(String),
    Fail(String),
}

/// Transport that answers from a per-URL script. Unknown URLs fail.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, Reply>>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, body: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Body(body.into()));
    }

    pub fn fail(&self, url: &str, reason: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Fail(reason.to_string()));
    }

    /// Every request takes this long before answering.
    pub fn set_latency(&self, d: Duration) {
        *self.latency.lock().unwrap() = Some(d);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(u, _)| u == url).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.calls.lock().unwrap().push((url.to_string(), Instant::now()));
        let latency = *self.latency.lock().unwrap();
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
        let reply = self.replies.lock().unwrap().get(url).cloned();
        match reply {
            Some(Reply::Body(b)) => Ok(b),
            Some(Reply::Fail(reason)) => Err(WatchError::transport(url, reason)),
            None => Err(WatchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Minimal RSS 2.0 document; each entry is (title, link, pubDate, description).
pub fn rss(entries: &[(&str, &str, &str, &str)]) -> String {
    let mut items = String::new();
    for (title, link, date, desc) in entries {
        items.push_str(&format!(
            "<item><title>{title}</title><link>{link}</link><pubDate>{date}</pubDate><description>{desc}</description></item>"
        ));
    }
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title>{items}</channel></rss>"#)
}

pub fn config_with(sources: Vec<Source>, request_delay_ms: u64) -> AgentConfig {
    AgentConfig {
        sources,
        request_delay_ms,
        ..AgentConfig::default()
    }
}

pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub storage: Arc<MemoryStorage>,
    pub config: Arc<ConfigStore>,
    pub monitor: Monitor,
}

pub async fn harness(transport: Arc<ScriptedTransport>, cfg: AgentConfig) -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    harness_with_storage(transport, storage, cfg).await
}

pub async fn harness_with_storage(
    transport: Arc<ScriptedTransport>,
    storage: Arc<MemoryStorage>,
    cfg: AgentConfig,
) -> Harness {
    let dyn_storage: Arc<dyn Storage> = storage.clone();
    let config = Arc::new(ConfigStore::open(dyn_storage.clone(), cfg).await);
    let monitor = Monitor::open(transport.clone(), dyn_storage, config.clone()).await;
    Harness {
        transport,
        storage,
        config,
        monitor,
    }
}
