// src/monitor/mod.rs
//! Monitoring scheduler: owns the aggregate state and the per-source health
//! table, arms the auto-refresh timer and reacts to config changes.
//!
//! State machine: `Idle -> Monitoring` on [`Monitor::start`], back to `Idle`
//! on [`Monitor::stop`]. Each poll cycle (`Idle -> Fetching -> Idle`) nests
//! inside; overlapping cycles are never run (see [`Monitor::fetch_all`]).

pub mod health;
pub mod orchestrator;
pub mod state;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::change_detector::ChangeDetector;
use crate::config::{AgentConfig, ConfigStore, SourceKind};
use crate::ingest::{ensure_metrics_described, ChangeRecord, Item};
use crate::storage::{self, Storage, KEY_NEWS_ITEMS};
use crate::transport::Transport;

pub use health::{HealthTable, SourceHealth};
pub use orchestrator::{page_update_item, CycleOutcome, SkipReason, PROGRESS_GRACE};
pub use state::{AggregateState, CyclePhase, PollCycleState};

/// Cheap-to-clone handle; all clones drive the same scheduler.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    storage: Arc<dyn Storage>,
    config: Arc<ConfigStore>,
    detector: Arc<ChangeDetector>,
    state: AggregateState,
    health: Mutex<HealthTable>,
    /// Bumped by every new cycle and by cancel; a cycle that sees a newer
    /// epoch than its own stops publishing.
    epoch: AtomicU64,
    explicit_stop: AtomicBool,
    timer: Mutex<Option<Timer>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    /// Serializes item commits with their persistence.
    persist_lock: tokio::sync::Mutex<()>,
}

struct Timer {
    handle: JoinHandle<()>,
    period: Duration,
}

impl Monitor {
    /// Build the monitor: re-hydrate the persisted collection and change
    /// records, then start following config changes.
    pub async fn open(
        transport: Arc<dyn Transport>,
        storage: Arc<dyn Storage>,
        config: Arc<ConfigStore>,
    ) -> Self {
        ensure_metrics_described();

        let items: Vec<Item> = storage::load_json(storage.as_ref(), KEY_NEWS_ITEMS)
            .await
            .unwrap_or_default();
        if !items.is_empty() {
            tracing::info!(target: "monitor", items = items.len(), "loaded persisted items");
        }
        let detector = Arc::new(ChangeDetector::open(transport.clone(), storage.clone()).await);

        let monitor = Self {
            inner: Arc::new(Inner {
                transport,
                storage,
                config,
                detector,
                state: AggregateState::new(items),
                health: Mutex::new(HealthTable::default()),
                epoch: AtomicU64::new(0),
                explicit_stop: AtomicBool::new(false),
                timer: Mutex::new(None),
                watcher: Mutex::new(None),
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        };
        monitor.spawn_config_watcher();
        monitor
    }

    pub fn state(&self) -> &AggregateState {
        &self.inner.state
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.inner.config
    }

    pub fn detector(&self) -> &Arc<ChangeDetector> {
        &self.inner.detector
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.state.is_monitoring()
    }

    pub fn source_health(&self) -> Vec<SourceHealth> {
        self.with_health(|h| h.snapshot())
    }

    /// Begin monitoring: fresh health table, zeroed error stats, one cycle
    /// right away and, with auto-refresh on, a repeating timer.
    pub fn start(&self) {
        let inner = &self.inner;
        if inner.state.is_monitoring() {
            return;
        }
        inner.explicit_stop.store(false, Ordering::SeqCst);
        self.with_health(|h| h.clear());
        inner.state.modify_stats(|s| {
            s.errors = 0;
            s.excluded_sources = 0;
        });
        inner.state.set_monitoring(true);
        tracing::info!(target: "monitor", "monitoring started");

        let this = self.clone();
        tokio::spawn(async move {
            this.fetch_all().await;
        });

        let cfg = inner.config.current();
        if cfg.auto_refresh && cfg.check_interval_ms > 0 {
            self.arm_timer(Duration::from_millis(cfg.check_interval_ms));
        }
    }

    /// Manual stop. Also suppresses config-driven auto-start until the next
    /// explicit [`Monitor::start`].
    pub fn stop(&self) {
        self.inner.explicit_stop.store(true, Ordering::SeqCst);
        self.halt();
    }

    fn halt(&self) {
        self.disarm_timer();
        if self.inner.state.is_monitoring() {
            tracing::info!(target: "monitor", "monitoring stopped");
        }
        self.inner.state.set_monitoring(false);
    }

    pub fn timer_armed(&self) -> bool {
        self.inner
            .timer
            .lock()
            .map(|t| t.is_some())
            .unwrap_or(false)
    }

    fn arm_timer(&self, period: Duration) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let monitor = Monitor { inner };
                // Spawned so a disarm never tears down a running cycle.
                tokio::spawn(async move {
                    monitor.fetch_all().await;
                });
            }
        });

        if let Ok(mut slot) = self.inner.timer.lock() {
            if let Some(old) = slot.replace(Timer { handle, period }) {
                old.handle.abort();
            }
        }
        tracing::debug!(target: "monitor", period_ms = period.as_millis() as u64, "timer armed");
    }

    fn disarm_timer(&self) {
        if let Ok(mut slot) = self.inner.timer.lock() {
            if let Some(old) = slot.take() {
                old.handle.abort();
            }
        }
    }

    fn timer_period(&self) -> Option<Duration> {
        self.inner
            .timer
            .lock()
            .ok()
            .and_then(|t| t.as_ref().map(|t| t.period))
    }

    fn spawn_config_watcher(&self) {
        let weak = Arc::downgrade(&self.inner);
        let mut rx = self.inner.config.subscribe();
        let handle = tokio::spawn(async move {
            // The current value counts as the first change, so a config that
            // already has auto-refresh on starts monitoring.
            let mut prev_auto = false;
            loop {
                let cfg = rx.borrow_and_update().clone();
                let Some(inner) = weak.upgrade() else { break };
                Monitor { inner }.on_config(prev_auto, &cfg);
                prev_auto = cfg.auto_refresh;
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
        if let Ok(mut slot) = self.inner.watcher.lock() {
            *slot = Some(handle);
        }
    }

    fn on_config(&self, prev_auto: bool, cfg: &AgentConfig) {
        let explicit_stop = self.inner.explicit_stop.load(Ordering::SeqCst);
        let monitoring = self.is_monitoring();
        let period = Duration::from_millis(cfg.check_interval_ms);

        match (prev_auto, cfg.auto_refresh) {
            (false, true) if !explicit_stop => {
                if monitoring {
                    if cfg.check_interval_ms > 0 {
                        self.arm_timer(period);
                    }
                } else {
                    self.start();
                }
            }
            (true, false) if monitoring => self.halt(),
            (true, true) if monitoring => {
                if cfg.check_interval_ms == 0 {
                    self.disarm_timer();
                } else if self.timer_period() != Some(period) {
                    self.arm_timer(period);
                }
            }
            _ => {}
        }
    }

    /// Stop timers and the config watcher. In-flight cycles finish on their
    /// own.
    pub fn shutdown(&self) {
        self.halt();
        if let Ok(mut slot) = self.inner.watcher.lock() {
            if let Some(h) = slot.take() {
                h.abort();
            }
        }
    }

    pub async fn mark_as_read(&self, item_id: &str) -> bool {
        let _guard = self.inner.persist_lock.lock().await;
        let found = self.inner.state.modify_items(|items| {
            match items.iter_mut().find(|i| i.id == item_id) {
                Some(it) => {
                    it.is_read = true;
                    true
                }
                None => false,
            }
        });
        if found {
            let snapshot = self.inner.state.items();
            storage::save_json(self.inner.storage.as_ref(), KEY_NEWS_ITEMS, &snapshot).await;
        }
        found
    }

    /// Drop the whole collection, its persisted record and the stats.
    pub async fn clear_all(&self) {
        let _guard = self.inner.persist_lock.lock().await;
        self.inner.state.modify_items(|items| items.clear());
        storage::remove_logged(self.inner.storage.as_ref(), KEY_NEWS_ITEMS).await;
        self.inner.state.modify_stats(|s| *s = crate::ingest::MonitoringStats::empty());
    }

    /// Size-check every enabled page source at once.
    pub async fn check_pages(&self) -> Vec<ChangeRecord> {
        let urls: Vec<String> = self
            .inner
            .config
            .current()
            .enabled_sources()
            .into_iter()
            .filter(|s| s.kind == SourceKind::Page)
            .map(|s| s.url)
            .collect();
        self.inner.detector.check_many(&urls).await
    }

    fn with_health<R>(&self, f: impl FnOnce(&mut HealthTable) -> R) -> R {
        match self.inner.health.lock() {
            Ok(mut h) => f(&mut h),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}
