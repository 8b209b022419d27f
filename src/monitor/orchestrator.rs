// src/monitor/orchestrator.rs
//! One poll cycle over the enabled sources: strictly sequential fetches with
//! a delay floor between request starts, incremental merges into the
//! collection and cooperative cancellation at source boundaries.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::time::{sleep, sleep_until, Instant};

use super::state::PollCycleState;
use super::Monitor;
use crate::config::{AgentConfig, Source, SourceKind};
use crate::error::{Result, WatchError};
use crate::ingest::feed::try_parse_feed;
use crate::ingest::{item_id, ChangeRecord, Item};
use crate::relevance::{self, RelevanceFilter};
use crate::storage::{self, KEY_NEWS_ITEMS};

/// How long a finished cycle keeps showing 100% before progress drops to 0.
pub const PROGRESS_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    NoEnabledSources,
    AllExcluded,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CycleOutcome {
    Skipped { reason: SkipReason },
    Completed { processed: usize, succeeded: usize },
    Cancelled { processed: usize },
}

/// Result of polling one source.
struct Polled {
    items: Vec<Item>,
    fingerprint: Option<u64>,
}

/// Resets loading/progress if a cycle unwinds without reaching its normal
/// end while it still owns the state.
struct LoadingGuard<'a> {
    monitor: &'a Monitor,
    epoch: u64,
    armed: bool,
}

impl LoadingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed && !self.monitor.is_stale(self.epoch) {
            tracing::error!(target: "monitor", "poll cycle aborted; resetting to idle");
            self.monitor.reset_cycle_state();
        }
    }
}

impl Monitor {
    /// Run one poll cycle against a snapshot of the current config. A call
    /// while another cycle is running does nothing.
    pub async fn fetch_all(&self) -> CycleOutcome {
        let cfg = self.inner.config.current();
        let enabled = cfg.enabled_sources();
        if enabled.is_empty() {
            tracing::debug!(target: "monitor", "no enabled sources");
            return CycleOutcome::Skipped { reason: SkipReason::NoEnabledSources };
        }
        if self.inner.state.is_loading() {
            tracing::debug!(target: "monitor", "cycle already running; trigger dropped");
            return CycleOutcome::Skipped { reason: SkipReason::AlreadyRunning };
        }

        let threshold = cfg.error_threshold;
        let eligible: Vec<Source> = self.with_health(|h| {
            enabled
                .into_iter()
                .filter(|s| !h.is_excluded(&s.id, threshold))
                .collect()
        });
        if eligible.is_empty() {
            tracing::warn!(target: "monitor", threshold, "every enabled source is over the error threshold");
            return CycleOutcome::Skipped { reason: SkipReason::AllExcluded };
        }

        if !self.inner.state.try_begin_loading() {
            return CycleOutcome::Skipped { reason: SkipReason::AlreadyRunning };
        }
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = LoadingGuard {
            monitor: self,
            epoch,
            armed: true,
        };

        counter!("monitor_cycles_total").increment(1);
        let t0 = std::time::Instant::now();
        let total = eligible.len();
        tracing::info!(target: "monitor", sources = total, "poll cycle started");

        let mut cycle = PollCycleState::begin(total);
        self.inner.state.set_progress(0.0);
        self.inner.state.set_cycle(Some(cycle.clone()));

        let stop_words = cfg.stop_word_set();
        let delay = Duration::from_millis(cfg.request_delay_ms);
        let mut fetched = 0usize;
        let mut last_start: Option<Instant> = None;

        for source in &eligible {
            if self.is_stale(epoch) {
                return self.cancelled(guard, &cycle);
            }
            if let Some(prev) = last_start {
                sleep_until(prev + delay).await;
                if self.is_stale(epoch) {
                    return self.cancelled(guard, &cycle);
                }
            }
            last_start = Some(Instant::now());

            let polled = self.poll_source(source, &stop_words).await;
            if self.is_stale(epoch) {
                // Cancelled while the request was in flight: its result is dropped.
                return self.cancelled(guard, &cycle);
            }

            let ok = match polled {
                Ok(Polled { items, fingerprint }) => {
                    self.with_health(|h| h.record_success(&source.id));
                    self.inner
                        .config
                        .mark_checked(&source.id, Utc::now(), fingerprint)
                        .await;
                    fetched += items.len();
                    self.commit(epoch, items, &cfg).await;
                    self.inner.state.modify_stats(|s| {
                        s.sources_checked = cycle.sources_succeeded + 1;
                        s.last_update = Utc::now();
                    });
                    true
                }
                Err(e) => {
                    let streak = self.with_health(|h| h.record_failure(&source.id));
                    counter!("monitor_source_errors_total").increment(1);
                    tracing::warn!(
                        target: "monitor",
                        source = %source.id,
                        url = %source.url,
                        streak,
                        error = %e,
                        "source fetch failed"
                    );
                    if streak == threshold {
                        tracing::warn!(target: "monitor", source = %source.id, "source excluded until it succeeds again");
                    }
                    false
                }
            };
            self.publish_error_stats(threshold);

            cycle.advance(ok);
            self.inner.state.set_progress(cycle.progress_percent);
            self.inner.state.set_cycle(Some(cycle.clone()));
        }

        guard.disarm();
        self.finish(epoch);
        histogram!("monitor_cycle_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        gauge!("monitor_last_cycle_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "monitor",
            processed = cycle.sources_processed,
            succeeded = cycle.sources_succeeded,
            items = fetched,
            "poll cycle completed"
        );
        CycleOutcome::Completed {
            processed: cycle.sources_processed,
            succeeded: cycle.sources_succeeded,
        }
    }

    /// Abort the running cycle before its next source. The request already
    /// in flight finishes but its result is discarded.
    pub fn cancel_fetch(&self) {
        if !self.inner.state.is_loading() {
            return;
        }
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.reset_cycle_state();
        tracing::info!(target: "monitor", "poll cycle cancelled");
    }

    pub(super) fn is_stale(&self, epoch: u64) -> bool {
        self.inner.epoch.load(Ordering::SeqCst) != epoch
    }

    fn reset_cycle_state(&self) {
        let state = &self.inner.state;
        state.set_cycle(None);
        state.set_progress(0.0);
        state.set_loading(false);
    }

    fn cancelled(&self, guard: LoadingGuard<'_>, cycle: &PollCycleState) -> CycleOutcome {
        guard.disarm();
        tracing::debug!(target: "monitor", processed = cycle.sources_processed, "cycle stopped at source boundary");
        CycleOutcome::Cancelled {
            processed: cycle.sources_processed,
        }
    }

    fn finish(&self, epoch: u64) {
        let state = &self.inner.state;
        state.set_progress(100.0);
        state.set_cycle(None);
        state.set_loading(false);

        let this = self.clone();
        tokio::spawn(async move {
            sleep(PROGRESS_GRACE).await;
            if !this.is_stale(epoch) && !this.inner.state.is_loading() {
                this.inner.state.set_progress(0.0);
            }
        });
    }

    async fn poll_source(&self, source: &Source, stop_words: &HashSet<String>) -> Result<Polled> {
        match source.kind {
            SourceKind::Feed => {
                let body = self.inner.transport.fetch_text(&source.url).await?;
                let items = try_parse_feed(&body, &source.name, &source.url, stop_words)?;
                Ok(Polled {
                    items,
                    fingerprint: None,
                })
            }
            SourceKind::Page => {
                let record = self.inner.detector.check(&source.url).await;
                if let Some(reason) = &record.error {
                    return Err(WatchError::transport(&source.url, reason));
                }
                let items = if record.changed {
                    vec![page_update_item(source, &record)]
                } else {
                    Vec::new()
                };
                Ok(Polled {
                    items,
                    fingerprint: Some(record.current_size),
                })
            }
        }
    }

    /// Merge a batch into the collection and persist it. Skipped once the
    /// cycle has been superseded.
    async fn commit(&self, epoch: u64, new: Vec<Item>, cfg: &AgentConfig) {
        let _guard = self.inner.persist_lock.lock().await;
        if self.is_stale(epoch) {
            return;
        }
        let filter = RelevanceFilter::new(&cfg.filters);
        let (merged, retained) = self.inner.state.modify_items(|items| {
            let merged = relevance::dedup_prepend(items, &new);
            let merged_len = merged.len();
            *items = filter.rank(merged, cfg.max_news_items);
            (merged_len, items.len())
        });
        gauge!("monitor_items_retained").set(retained as f64);
        self.inner.state.modify_stats(|s| {
            s.total_news = merged;
            s.filtered_news = retained;
        });

        let snapshot = self.inner.state.items();
        storage::save_json(self.inner.storage.as_ref(), KEY_NEWS_ITEMS, &snapshot).await;
    }

    fn publish_error_stats(&self, threshold: u32) {
        let (failing, excluded) = self.with_health(|h| (h.failing(), h.excluded(threshold)));
        self.inner.state.modify_stats(|s| {
            s.errors = failing;
            s.excluded_sources = excluded;
        });
    }
}

/// Synthetic item announcing that a monitored page changed size.
pub fn page_update_item(source: &Source, record: &ChangeRecord) -> Item {
    let checked = record.checked_at.to_rfc3339();
    let description = match record.last_size {
        Some(last) => format!(
            "Page size changed from {last} to {} bytes.",
            record.current_size
        ),
        None => format!("Page size is now {} bytes.", record.current_size),
    };
    Item {
        id: item_id(&source.url, &checked),
        title: format!("{} updated", source.name),
        description,
        link: source.url.clone(),
        published_at: record.checked_at,
        source: source.name.clone(),
        category: None,
        keywords: Vec::new(),
        is_read: false,
        relevance_score: 0,
    }
}
