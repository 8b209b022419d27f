// src/storage.rs
//! Key/value persistence used for the item collection, the change-detector
//! map and the agent config. Every failure is logged and swallowed by the
//! callers: in-memory state stays authoritative for the running process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;

use crate::error::{Result, WatchError};

pub const KEY_NEWS_ITEMS: &str = "news_items";
pub const KEY_CHANGE_RECORDS: &str = "website_monitor";
pub const KEY_AGENT_CONFIG: &str = "agent_config";

#[async_trait]
pub trait Storage: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON file per key under `dir`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are internal constants, but keep the file name flat anyway.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WatchError::storage(key, e)),
        }
    }

    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| WatchError::storage(key, e))?;
        // Write-then-rename so a crash never leaves a half-written record.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| WatchError::storage(key, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| WatchError::storage(key, e))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WatchError::storage(key, e)),
        }
    }
}

/// In-process storage; handy for tests and for running without a state dir.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = match self.inner.lock() {
            Ok(map) => map.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        keys.sort();
        keys
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let map = self
            .inner
            .lock()
            .map_err(|_| WatchError::storage(key, "mutex poisoned"))?;
        Ok(map.get(key).cloned())
    }

    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| WatchError::storage(key, "mutex poisoned"))?;
        map.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| WatchError::storage(key, "mutex poisoned"))?;
        map.remove(key);
        Ok(())
    }
}

pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Load and decode a JSON record. Read failures and undecodable records are
/// logged and reported as absent.
pub async fn load_json<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Option<T> {
    let bytes = match storage.load(key).await {
        Ok(Some(b)) => b,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, key, "storage load failed");
            return None;
        }
    };
    match decode_json(&bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(error = %e, key, "persisted record unreadable; starting fresh");
            None
        }
    }
}

/// Best-effort JSON save; returns whether the record was written.
pub async fn save_json<T: Serialize + ?Sized>(storage: &dyn Storage, key: &str, value: &T) -> bool {
    let bytes = match encode_json(value) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, key, "serialize record failed");
            return false;
        }
    };
    match storage.save(key, bytes).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, key, "storage save failed");
            false
        }
    }
}

pub async fn remove_logged(storage: &dyn Storage, key: &str) {
    if let Err(e) = storage.remove(key).await {
        tracing::warn!(error = %e, key, "storage remove failed");
    }
}
