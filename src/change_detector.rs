// src/change_detector.rs
//! Size-fingerprint change detection for plain pages. The byte length of the
//! fetched body stands in for its content; a different length means the page
//! changed since the previous check.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use metrics::counter;
use tokio::sync::Mutex;

use crate::ingest::ChangeRecord;
use crate::storage::{self, Storage, KEY_CHANGE_RECORDS};
use crate::transport::Transport;

pub struct ChangeDetector {
    transport: Arc<dyn Transport>,
    storage: Arc<dyn Storage>,
    // Held across the persist step so saved snapshots never go backwards.
    records: Mutex<HashMap<String, ChangeRecord>>,
}

impl ChangeDetector {
    /// Detector seeded from the persisted record map (absent or unreadable
    /// map = fresh start).
    pub async fn open(transport: Arc<dyn Transport>, storage: Arc<dyn Storage>) -> Self {
        let records: HashMap<String, ChangeRecord> =
            storage::load_json(storage.as_ref(), KEY_CHANGE_RECORDS)
                .await
                .unwrap_or_default();
        if !records.is_empty() {
            tracing::info!(target: "change_detector", urls = records.len(), "loaded monitor data");
        }
        Self {
            transport,
            storage,
            records: Mutex::new(records),
        }
    }

    /// Check one URL. Never fails: transport errors come back inside the
    /// record. The record is persisted before it is returned.
    pub async fn check(&self, url: &str) -> ChangeRecord {
        let fetched = self.transport.fetch_text(url).await;
        counter!("change_detector_checks_total").increment(1);

        let mut records = self.records.lock().await;
        let previous = records.get(url).and_then(ChangeRecord::fingerprint);

        let record = match fetched {
            Ok(body) => {
                let current_size = body.len() as u64;
                let changed = previous.is_some_and(|prev| prev != current_size);
                if changed {
                    counter!("change_detector_changes_total").increment(1);
                    tracing::info!(
                        target: "change_detector",
                        url,
                        last = previous.unwrap_or_default(),
                        current = current_size,
                        "page changed"
                    );
                }
                ChangeRecord {
                    url: url.to_string(),
                    last_size: previous,
                    current_size,
                    changed,
                    checked_at: Utc::now(),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(target: "change_detector", url, error = %e, "page check failed");
                ChangeRecord {
                    url: url.to_string(),
                    last_size: previous,
                    current_size: 0,
                    changed: false,
                    checked_at: Utc::now(),
                    error: Some(e.to_string()),
                }
            }
        };

        records.insert(url.to_string(), record.clone());
        storage::save_json(self.storage.as_ref(), KEY_CHANGE_RECORDS, &*records).await;
        record
    }

    /// Check all URLs concurrently; one record per input URL, in input order.
    pub async fn check_many(&self, urls: &[String]) -> Vec<ChangeRecord> {
        join_all(urls.iter().map(|u| self.check(u))).await
    }

    pub async fn record(&self, url: &str) -> Option<ChangeRecord> {
        self.records.lock().await.get(url).cloned()
    }

    pub async fn monitored(&self) -> Vec<ChangeRecord> {
        let records = self.records.lock().await;
        let mut out: Vec<ChangeRecord> = records.values().cloned().collect();
        out.sort_by(|a, b| a.url.cmp(&b.url));
        out
    }

    pub async fn changed(&self) -> Vec<ChangeRecord> {
        self.monitored().await.into_iter().filter(|r| r.changed).collect()
    }

    /// Forget one URL; its next check counts as a first check.
    pub async fn reset_url(&self, url: &str) {
        let mut records = self.records.lock().await;
        records.remove(url);
        storage::save_json(self.storage.as_ref(), KEY_CHANGE_RECORDS, &*records).await;
    }

    pub async fn clear(&self) {
        let mut records = self.records.lock().await;
        records.clear();
        storage::remove_logged(self.storage.as_ref(), KEY_CHANGE_RECORDS).await;
    }
}
