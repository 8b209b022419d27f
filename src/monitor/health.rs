// src/monitor/health.rs
//! Per-source failure streaks. Process-local, never persisted.

use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub source_id: String,
    pub consecutive_errors: u32,
}

/// Streak table keyed by source id. Entries appear on the first failure and
/// drop back to zero on any success. There is no timed recovery: a source at
/// or over the threshold stays out of cycles until it succeeds once.
#[derive(Debug, Default)]
pub struct HealthTable {
    streaks: HashMap<String, u32>,
}

impl HealthTable {
    pub fn consecutive_errors(&self, source_id: &str) -> u32 {
        self.streaks.get(source_id).copied().unwrap_or(0)
    }

    pub fn is_excluded(&self, source_id: &str, threshold: u32) -> bool {
        self.consecutive_errors(source_id) >= threshold
    }

    pub fn record_success(&mut self, source_id: &str) {
        if let Some(n) = self.streaks.get_mut(source_id) {
            *n = 0;
        }
    }

    /// Returns the new streak length.
    pub fn record_failure(&mut self, source_id: &str) -> u32 {
        let n = self.streaks.entry(source_id.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    pub fn clear(&mut self) {
        self.streaks.clear();
    }

    /// Sources whose latest attempt failed.
    pub fn failing(&self) -> usize {
        self.streaks.values().filter(|&&n| n > 0).count()
    }

    pub fn excluded(&self, threshold: u32) -> usize {
        self.streaks.values().filter(|&&n| n >= threshold).count()
    }

    pub fn snapshot(&self) -> Vec<SourceHealth> {
        let mut out: Vec<SourceHealth> = self
            .streaks
            .iter()
            .map(|(id, &n)| SourceHealth {
                source_id: id.clone(),
                consecutive_errors: n,
            })
            .collect();
        out.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        out
    }
}
