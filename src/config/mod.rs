// src/config/mod.rs
//! Agent policy: sources, filter criteria, refresh cadence, rate-limit knobs
//! and the stop-word list. Every field has a default so partial records
//! (older persisted configs, hand-written seed files) merge cleanly.

pub mod store;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub use store::ConfigStore;

pub const ENV_CONFIG_PATH: &str = "NEWSWATCH_CONFIG_PATH";
const DEFAULT_TOML_PATH: &str = "config/newswatch.toml";
const DEFAULT_JSON_PATH: &str = "config/newswatch.json";

pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 300_000;
pub const DEFAULT_MAX_NEWS_ITEMS: usize = 100;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 1_000;
pub const DEFAULT_ERROR_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Item-list XML feed.
    #[serde(alias = "rss")]
    Feed,
    /// Plain page watched by content size.
    #[serde(alias = "http")]
    Page,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: SourceKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_fingerprint: Option<u64>,
}

impl Source {
    pub fn feed(id: &str, name: &str, url: &str) -> Self {
        Self::new(id, name, url, SourceKind::Feed)
    }

    pub fn page(id: &str, name: &str, url: &str) -> Self {
        Self::new(id, name, url, SourceKind::Page)
    }

    fn new(id: &str, name: &str, url: &str, kind: SourceKind) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            kind,
            enabled: true,
            last_checked: None,
            last_fingerprint: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterCriteria {
    pub keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub categories: Vec<String>,
    pub sources: Vec<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// Partial update of [`FilterCriteria`]; `None` leaves a field untouched.
/// Date bounds use a nested option so they can be cleared explicitly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterPatch {
    pub keywords: Option<Vec<String>>,
    pub exclude_keywords: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
    pub sources: Option<Vec<String>>,
    #[serde(with = "double_option")]
    pub date_from: Option<Option<DateTime<Utc>>>,
    #[serde(with = "double_option")]
    pub date_to: Option<Option<DateTime<Utc>>>,
}

impl FilterCriteria {
    pub fn apply(&mut self, patch: FilterPatch) {
        if let Some(v) = patch.keywords {
            self.keywords = v;
        }
        if let Some(v) = patch.exclude_keywords {
            self.exclude_keywords = v;
        }
        if let Some(v) = patch.categories {
            self.categories = v;
        }
        if let Some(v) = patch.sources {
            self.sources = v;
        }
        if let Some(v) = patch.date_from {
            self.date_from = v;
        }
        if let Some(v) = patch.date_to {
            self.date_to = v;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfig {
    pub sources: Vec<Source>,
    pub filters: FilterCriteria,
    /// Period of the auto-refresh timer; 0 disables the timer.
    #[serde(rename = "checkInterval")]
    pub check_interval_ms: u64,
    pub max_news_items: usize,
    pub auto_refresh: bool,
    pub stop_words: Vec<String>,
    /// Floor on spacing between two consecutive source fetches in a cycle.
    #[serde(rename = "requestDelay")]
    pub request_delay_ms: u64,
    /// Consecutive failures after which a source is left out of cycles.
    pub error_threshold: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            filters: FilterCriteria::default(),
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            max_news_items: DEFAULT_MAX_NEWS_ITEMS,
            auto_refresh: false,
            stop_words: default_stop_words(),
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }
}

/// Partial update of [`AgentConfig`] (`update(partial)` on the store).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigPatch {
    pub sources: Option<Vec<Source>>,
    pub filters: Option<FilterCriteria>,
    #[serde(rename = "checkInterval")]
    pub check_interval_ms: Option<u64>,
    pub max_news_items: Option<usize>,
    pub auto_refresh: Option<bool>,
    pub stop_words: Option<Vec<String>>,
    #[serde(rename = "requestDelay")]
    pub request_delay_ms: Option<u64>,
    pub error_threshold: Option<u32>,
}

impl AgentConfig {
    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(v) = patch.sources {
            self.sources = v;
        }
        if let Some(v) = patch.filters {
            self.filters = v;
        }
        if let Some(v) = patch.check_interval_ms {
            self.check_interval_ms = v;
        }
        if let Some(v) = patch.max_news_items {
            self.max_news_items = v;
        }
        if let Some(v) = patch.auto_refresh {
            self.auto_refresh = v;
        }
        if let Some(v) = patch.stop_words {
            self.stop_words = v;
        }
        if let Some(v) = patch.request_delay_ms {
            self.request_delay_ms = v;
        }
        if let Some(v) = patch.error_threshold {
            self.error_threshold = v;
        }
        self.sanitize();
    }

    /// Clamp knobs into usable ranges and drop sources with duplicate ids
    /// (first one wins).
    pub fn sanitize(&mut self) {
        if self.max_news_items == 0 {
            self.max_news_items = DEFAULT_MAX_NEWS_ITEMS;
        }
        if self.error_threshold == 0 {
            self.error_threshold = DEFAULT_ERROR_THRESHOLD;
        }
        let mut seen = HashSet::new();
        self.sources.retain(|s| {
            let fresh = seen.insert(s.id.clone());
            if !fresh {
                tracing::warn!(source = %s.id, "duplicate source id dropped from config");
            }
            fresh
        });
    }

    pub fn enabled_sources(&self) -> Vec<Source> {
        self.sources.iter().filter(|s| s.enabled).cloned().collect()
    }

    pub fn stop_word_set(&self) -> HashSet<String> {
        self.stop_words.iter().map(|w| w.to_lowercase()).collect()
    }
}

pub fn default_stop_words() -> Vec<String> {
    [
        "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
        "one", "our", "out", "has", "have", "been", "this", "that", "with", "from", "they", "will",
        "would", "there", "their", "what", "about", "which", "when", "make", "like", "time", "just",
        "know", "take", "into", "year", "your", "some", "could", "them", "than", "then", "now",
        "look", "only", "come", "over", "also", "back", "after", "most", "other", "more", "these",
        "such", "very", "were", "said", "says", "while", "where", "being", "does", "here", "how",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Load a seed config from an explicit path. Supports TOML or JSON.
pub fn load_config_from(path: &Path) -> Result<AgentConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
}

/// Load the seed config using env var + fallbacks:
/// 1) $NEWSWATCH_CONFIG_PATH
/// 2) config/newswatch.toml
/// 3) config/newswatch.json
/// 4) built-in defaults
pub fn load_config_default() -> Result<AgentConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from(DEFAULT_JSON_PATH);
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Ok(AgentConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AgentConfig> {
    let looks_json = s.trim_start().starts_with('{');
    let mut cfg: AgentConfig = if hint_ext == "json" || (hint_ext != "toml" && looks_json) {
        serde_json::from_str(s).context("parsing JSON config")?
    } else {
        toml::from_str(s).context("parsing TOML config")?
    };
    cfg.sanitize();
    Ok(cfg)
}

/// `Option<Option<T>>` where a missing key is `None` and an explicit `null`
/// is `Some(None)`.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(de).map(Some)
    }
}
