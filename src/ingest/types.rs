// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One normalized unit of aggregated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub title: String,
    pub description: String,
    pub link: String,
    #[serde(rename = "pubDate")]
    pub published_at: DateTime<Utc>,
    /// Name of the source the item came from.
    pub source: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Frequency-ranked, at most ten.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub relevance_score: i32,
}

/// Latest size check for one monitored URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub url: String,
    #[serde(default)]
    pub last_size: Option<u64>,
    pub current_size: u64,
    pub changed: bool,
    #[serde(rename = "lastChecked")]
    pub checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChangeRecord {
    /// Size this record vouches for. A failed check carries the last good
    /// size forward instead of its own zero.
    pub fn fingerprint(&self) -> Option<u64> {
        if self.error.is_none() {
            Some(self.current_size)
        } else {
            self.last_size
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStats {
    /// Size of the merged list (new unique items plus the collection) before
    /// filtering, on the last merge. The loaded collection size at startup.
    pub total_news: usize,
    /// Size of the retained collection.
    pub filtered_news: usize,
    /// Successful sources in the current/last cycle.
    pub sources_checked: usize,
    pub last_update: DateTime<Utc>,
    /// Sources whose latest attempt failed (non-zero failure streak).
    pub errors: usize,
    /// Sources at or over the error threshold, left out of cycles.
    pub excluded_sources: usize,
}

impl MonitoringStats {
    pub fn empty() -> Self {
        Self {
            total_news: 0,
            filtered_news: 0,
            sources_checked: 0,
            last_update: Utc::now(),
            errors: 0,
            excluded_sources: 0,
        }
    }
}

impl Default for MonitoringStats {
    fn default() -> Self {
        Self::empty()
    }
}
