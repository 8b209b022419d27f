// src/error.rs
//! Error taxonomy shared by the collaborators and the core.

/// Errors surfaced by the collaborators (transport, storage) and by the
/// feed normalizer. None of these abort a polling cycle; the orchestrator
/// records them per source and moves on.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("storage error for key `{key}`: {reason}")]
    Storage { key: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WatchError {
    pub fn transport(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn storage(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Storage {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
