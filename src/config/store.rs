// src/config/store.rs
//! Observable, persisted config store: `current()` / `update(partial)` /
//! `subscribe()`. Subscribers get the current value replayed on subscribe
//! (a `watch` receiver always holds the latest snapshot).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};

use super::{AgentConfig, ConfigPatch, FilterPatch, Source};
use crate::storage::{self, MemoryStorage, Storage, KEY_AGENT_CONFIG};

pub struct ConfigStore {
    tx: watch::Sender<AgentConfig>,
    storage: Arc<dyn Storage>,
    // Serializes modify+persist so the stored record never lags a newer one.
    write_lock: Mutex<()>,
}

impl ConfigStore {
    /// Open the store. A persisted record wins over `seed`; an unreadable
    /// record is ignored and `seed` is used instead.
    pub async fn open(storage: Arc<dyn Storage>, seed: AgentConfig) -> Self {
        let mut cfg = match storage::load_json::<AgentConfig>(storage.as_ref(), KEY_AGENT_CONFIG).await {
            Some(stored) => {
                tracing::info!(sources = stored.sources.len(), "loaded persisted config");
                stored
            }
            None => seed,
        };
        cfg.sanitize();
        let (tx, _rx) = watch::channel(cfg);
        Self {
            tx,
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Store that keeps nothing beyond the process.
    pub fn in_memory(cfg: AgentConfig) -> Self {
        let (tx, _rx) = watch::channel(cfg);
        Self {
            tx,
            storage: Arc::new(MemoryStorage::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn current(&self) -> AgentConfig {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentConfig> {
        self.tx.subscribe()
    }

    pub async fn update(&self, patch: ConfigPatch) -> AgentConfig {
        self.modify(|cfg| cfg.apply(patch)).await
    }

    pub async fn update_filters(&self, patch: FilterPatch) -> AgentConfig {
        self.modify(|cfg| cfg.filters.apply(patch)).await
    }

    pub async fn add_source(&self, source: Source) -> AgentConfig {
        self.modify(|cfg| {
            cfg.sources.push(source);
            cfg.sanitize();
        })
        .await
    }

    pub async fn remove_source(&self, source_id: &str) -> AgentConfig {
        self.modify(|cfg| cfg.sources.retain(|s| s.id != source_id)).await
    }

    pub async fn toggle_source(&self, source_id: &str) -> AgentConfig {
        self.modify(|cfg| {
            if let Some(s) = cfg.sources.iter_mut().find(|s| s.id == source_id) {
                s.enabled = !s.enabled;
            }
        })
        .await
    }

    pub async fn reset(&self) -> AgentConfig {
        self.modify(|cfg| *cfg = AgentConfig::default()).await
    }

    /// Record a successful check on a source. Unknown ids (source removed
    /// mid-cycle) are ignored.
    pub(crate) async fn mark_checked(&self, source_id: &str, at: DateTime<Utc>, fingerprint: Option<u64>) {
        self.modify(|cfg| {
            if let Some(s) = cfg.sources.iter_mut().find(|s| s.id == source_id) {
                s.last_checked = Some(at);
                if fingerprint.is_some() {
                    s.last_fingerprint = fingerprint;
                }
            }
        })
        .await;
    }

    async fn modify<F>(&self, f: F) -> AgentConfig
    where
        F: FnOnce(&mut AgentConfig),
    {
        let _guard = self.write_lock.lock().await;
        self.tx.send_modify(f);
        let snapshot = self.current();
        storage::save_json(self.storage.as_ref(), KEY_AGENT_CONFIG, &snapshot).await;
        snapshot
    }
}
