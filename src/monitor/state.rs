// src/monitor/state.rs
//! Observable aggregate state. Each field is a `watch` channel: subscribers
//! see the latest committed value immediately and every later change.
//! Only the monitor mutates it.

use serde::Serialize;
use tokio::sync::watch;

use crate::ingest::{Item, MonitoringStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Fetching,
    Completed,
    Cancelled,
}

/// Progress of the running cycle; `None` between cycles.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollCycleState {
    pub phase: CyclePhase,
    pub sources_total: usize,
    pub sources_processed: usize,
    pub sources_succeeded: usize,
    pub progress_percent: f64,
    pub cancelled: bool,
}

impl PollCycleState {
    pub(crate) fn begin(total: usize) -> Self {
        Self {
            phase: CyclePhase::Fetching,
            sources_total: total,
            sources_processed: 0,
            sources_succeeded: 0,
            progress_percent: 0.0,
            cancelled: false,
        }
    }

    pub(crate) fn advance(&mut self, succeeded: bool) {
        self.sources_processed += 1;
        if succeeded {
            self.sources_succeeded += 1;
        }
        self.progress_percent = if self.sources_total == 0 {
            100.0
        } else {
            self.sources_processed as f64 / self.sources_total as f64 * 100.0
        };
    }
}

#[derive(Debug)]
pub struct AggregateState {
    items: watch::Sender<Vec<Item>>,
    stats: watch::Sender<MonitoringStats>,
    monitoring: watch::Sender<bool>,
    loading: watch::Sender<bool>,
    progress: watch::Sender<f64>,
    cycle: watch::Sender<Option<PollCycleState>>,
}

impl AggregateState {
    pub(crate) fn new(items: Vec<Item>) -> Self {
        let mut stats = MonitoringStats::empty();
        stats.total_news = items.len();
        stats.filtered_news = items.len();
        Self {
            items: watch::Sender::new(items),
            stats: watch::Sender::new(stats),
            monitoring: watch::Sender::new(false),
            loading: watch::Sender::new(false),
            progress: watch::Sender::new(0.0),
            cycle: watch::Sender::new(None),
        }
    }

    pub fn items(&self) -> Vec<Item> {
        self.items.borrow().clone()
    }

    pub fn stats(&self) -> MonitoringStats {
        self.stats.borrow().clone()
    }

    pub fn is_monitoring(&self) -> bool {
        *self.monitoring.borrow()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn progress(&self) -> f64 {
        *self.progress.borrow()
    }

    pub fn cycle(&self) -> Option<PollCycleState> {
        self.cycle.borrow().clone()
    }

    pub fn subscribe_items(&self) -> watch::Receiver<Vec<Item>> {
        self.items.subscribe()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<MonitoringStats> {
        self.stats.subscribe()
    }

    pub fn subscribe_monitoring(&self) -> watch::Receiver<bool> {
        self.monitoring.subscribe()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<f64> {
        self.progress.subscribe()
    }

    pub fn subscribe_cycle(&self) -> watch::Receiver<Option<PollCycleState>> {
        self.cycle.subscribe()
    }

    /// Atomically flip `loading` false -> true. Returns false when a cycle
    /// already holds it.
    pub(crate) fn try_begin_loading(&self) -> bool {
        self.loading.send_if_modified(|loading| {
            if *loading {
                false
            } else {
                *loading = true;
                true
            }
        })
    }

    pub(crate) fn set_loading(&self, on: bool) {
        self.loading.send_if_modified(|l| std::mem::replace(l, on) != on);
    }

    pub(crate) fn set_monitoring(&self, on: bool) {
        self.monitoring.send_if_modified(|m| std::mem::replace(m, on) != on);
    }

    pub(crate) fn set_progress(&self, pct: f64) {
        self.progress.send_replace(pct);
    }

    pub(crate) fn set_cycle(&self, cycle: Option<PollCycleState>) {
        self.cycle.send_replace(cycle);
    }

    pub(crate) fn modify_items<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Vec<Item>) -> R,
        R: Default,
    {
        let mut out = R::default();
        self.items.send_modify(|items| out = f(items));
        out
    }

    pub(crate) fn modify_stats<F>(&self, f: F)
    where
        F: FnOnce(&mut MonitoringStats),
    {
        self.stats.send_modify(f);
    }
}
