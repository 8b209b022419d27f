// src/lib.rs
// Public library surface for the binary and the integration tests.

pub mod api;
pub mod change_detector;
pub mod config;
pub mod error;
pub mod ingest;
pub mod monitor;
pub mod relevance;
pub mod storage;
pub mod telemetry;
pub mod transport;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::{AgentConfig, ConfigPatch, ConfigStore, FilterCriteria, Source, SourceKind};
pub use crate::error::{Result, WatchError};
pub use crate::ingest::{ChangeRecord, Item, MonitoringStats};
pub use crate::monitor::{CycleOutcome, Monitor, SkipReason};
pub use crate::storage::{FileStorage, MemoryStorage, Storage};
pub use crate::transport::{RelayTransport, Transport};
