// tests/change_detector.rs
mod common;

use std::sync::Arc;

use common::ScriptedTransport;
use newswatch::change_detector::ChangeDetector;
use newswatch::storage::{MemoryStorage, Storage, KEY_CHANGE_RECORDS};

async fn detector(t: &Arc<ScriptedTransport>, storage: &Arc<MemoryStorage>) -> ChangeDetector {
    let s: Arc<dyn Storage> = storage.clone();
    ChangeDetector::open(t.clone(), s).await
}

#[tokio::test]
async fn first_check_never_reports_a_change() {
    let t = ScriptedTransport::new();
    t.respond("https://p.test/", "12345");
    let d = detector(&t, &Arc::new(MemoryStorage::new())).await;

    let r = d.check("https://p.test/").await;
    assert!(!r.changed);
    assert_eq!(r.current_size, 5);
    assert_eq!(r.last_size, None);
    assert!(r.error.is_none());
}

#[tokio::test]
async fn size_difference_on_second_check_is_a_change() {
    let t = ScriptedTransport::new();
    let d = detector(&t, &Arc::new(MemoryStorage::new())).await;

    t.respond("https://p.test/", "aaaa");
    d.check("https://p.test/").await;
    t.respond("https://p.test/", "bbbb");
    let same = d.check("https://p.test/").await;
    assert!(!same.changed, "same length is not a change");

    t.respond("https://p.test/", "bbbbbb");
    let grown = d.check("https://p.test/").await;
    assert!(grown.changed);
    assert_eq!(grown.last_size, Some(4));
    assert_eq!(grown.current_size, 6);
    assert_eq!(d.changed().await.len(), 1);
}

#[tokio::test]
async fn size_counts_bytes_not_chars() {
    let t = ScriptedTransport::new();
    t.respond("https://p.test/", "ü");
    let d = detector(&t, &Arc::new(MemoryStorage::new())).await;
    assert_eq!(d.check("https://p.test/").await.current_size, 2);
}

#[tokio::test]
async fn failure_is_recorded_and_keeps_previous_size() {
    let t = ScriptedTransport::new();
    let storage = Arc::new(MemoryStorage::new());
    let d = detector(&t, &storage).await;

    t.respond("https://p.test/", "abc");
    d.check("https://p.test/").await;
    t.fail("https://p.test/", "timeout");
    let failed = d.check("https://p.test/").await;
    assert_eq!(failed.current_size, 0);
    assert!(!failed.changed);
    assert!(failed.error.as_deref().unwrap().contains("timeout"));
    assert_eq!(failed.last_size, Some(3));

    // The failed check does not reset the baseline.
    t.respond("https://p.test/", "abcd");
    let next = d.check("https://p.test/").await;
    assert!(next.changed);
    assert_eq!(next.last_size, Some(3));
}

#[tokio::test]
async fn records_survive_a_reopen() {
    let t = ScriptedTransport::new();
    let storage = Arc::new(MemoryStorage::new());
    t.respond("https://p.test/", "abc");
    detector(&t, &storage).await.check("https://p.test/").await;
    assert!(storage.keys().contains(&KEY_CHANGE_RECORDS.to_string()));

    let reopened = detector(&t, &storage).await;
    t.respond("https://p.test/", "abcdef");
    assert!(reopened.check("https://p.test/").await.changed);
}

#[tokio::test]
async fn check_many_returns_one_record_per_url_in_order() {
    let t = ScriptedTransport::new();
    t.respond("https://a.test/", "a");
    t.fail("https://b.test/", "refused");
    t.respond("https://c.test/", "ccc");
    let d = detector(&t, &Arc::new(MemoryStorage::new())).await;

    let urls: Vec<String> = ["https://a.test/", "https://b.test/", "https://c.test/", "https://unknown.test/"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let out = d.check_many(&urls).await;
    assert_eq!(out.len(), 4);
    let got: Vec<&str> = out.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(got, urls.iter().map(String::as_str).collect::<Vec<_>>());
    assert!(out[1].error.is_some());
    assert!(out[3].error.is_some());
    assert_eq!(d.monitored().await.len(), 4);
}

#[tokio::test]
async fn reset_and_clear_forget_urls() {
    let t = ScriptedTransport::new();
    t.respond("https://a.test/", "a");
    t.respond("https://b.test/", "b");
    let storage = Arc::new(MemoryStorage::new());
    let d = detector(&t, &storage).await;
    d.check("https://a.test/").await;
    d.check("https://b.test/").await;

    d.reset_url("https://a.test/").await;
    assert!(d.record("https://a.test/").await.is_none());
    t.respond("https://a.test/", "aaaa");
    assert!(!d.check("https://a.test/").await.changed);

    d.clear().await;
    assert!(d.monitored().await.is_empty());
    assert!(!storage.keys().contains(&KEY_CHANGE_RECORDS.to_string()));
}
