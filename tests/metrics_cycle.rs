// tests/metrics_cycle.rs
#![cfg(feature = "strict-metrics")]
mod common;

use common::{config_with, harness, rss, ScriptedTransport};
use newswatch::config::Source;
use newswatch::telemetry::Metrics;

#[tokio::test]
async fn metrics_exposed_after_a_cycle() {
    // Installs the global recorder; this binary must not install another.
    let metrics = Metrics::init().expect("recorder");

    let t = ScriptedTransport::new();
    t.respond("https://a.test/rss", rss(&[("one", "https://a.test/1", "2024-01-01", "")]));
    t.fail("https://b.test/rss", "down");
    t.respond("https://p.test/", "body");
    let h = harness(
        t,
        config_with(
            vec![
                Source::feed("a", "A", "https://a.test/rss"),
                Source::feed("b", "B", "https://b.test/rss"),
                Source::page("p", "P", "https://p.test/"),
            ],
            0,
        ),
    )
    .await;
    h.monitor.fetch_all().await;

    let out = metrics.handle.render();
    for series in [
        "ingest_events_total",
        "ingest_parse_ms",
        "monitor_cycles_total",
        "monitor_source_errors_total",
        "monitor_cycle_ms",
        "monitor_items_retained",
        "change_detector_checks_total",
    ] {
        assert!(out.contains(series), "missing {series}");
    }
}
