// src/ingest/mod.rs
pub mod feed;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

pub use feed::{extract_keywords, item_id, parse_feed};
pub use types::{ChangeRecord, Item, MonitoringStats};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Items parsed from feed payloads.");
        describe_counter!(
            "ingest_parse_errors_total",
            "Feed payloads that failed to parse."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!("monitor_cycles_total", "Poll cycles started.");
        describe_counter!(
            "monitor_source_errors_total",
            "Source fetches that failed inside a cycle."
        );
        describe_histogram!("monitor_cycle_ms", "Wall time of a full poll cycle.");
        describe_gauge!(
            "monitor_items_retained",
            "Items in the collection after the last merge."
        );
        describe_gauge!(
            "monitor_last_cycle_ts",
            "Unix ts when the last poll cycle finished."
        );
        describe_counter!("change_detector_checks_total", "Page size checks.");
        describe_counter!(
            "change_detector_changes_total",
            "Page size checks that reported a change."
        );
    });
}

/// Clean feed text: strip markup, decode entities, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[a-z!][^>]*>").unwrap());
    let stripped = re_tags.replace_all(s, "");

    // 2) HTML entity decode
    let decoded = html_escape::decode_html_entities(&stripped);

    // 3) Collapse whitespace (incl. decoded &nbsp;)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").unwrap());
    re_ws.replace_all(&decoded, " ").trim().to_string()
}
