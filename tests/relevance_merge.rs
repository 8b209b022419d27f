// tests/relevance_merge.rs
use chrono::{Duration, TimeZone, Utc};
use newswatch::config::FilterCriteria;
use newswatch::ingest::Item;
use newswatch::relevance::{merge, RelevanceFilter};

fn item(link: &str, day: u32, title: &str, desc: &str) -> Item {
    Item {
        id: newswatch::ingest::item_id(link, &format!("2024-01-{day:02}")),
        title: title.to_string(),
        description: desc.to_string(),
        link: link.to_string(),
        published_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        source: "A".to_string(),
        category: None,
        keywords: Vec::new(),
        is_read: false,
        relevance_score: 0,
    }
}

#[test]
fn pass_through_keeps_both_newest_first() {
    let new = vec![
        item("https://x/1", 1, "first", "one"),
        item("https://x/2", 2, "second", "two"),
    ];
    let out = merge(&[], &new, &FilterCriteria::default(), 50);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].link, "https://x/2");
    assert_eq!(out[1].link, "https://x/1");
    assert!(out.iter().all(|i| i.relevance_score == 1));
}

#[test]
fn sponsored_item_is_dropped_even_when_keywords_match() {
    let criteria = FilterCriteria {
        keywords: vec!["rust".into()],
        exclude_keywords: vec!["sponsored".into()],
        ..Default::default()
    };
    let new = vec![
        item("https://x/1", 1, "Rust tips", "Sponsored content"),
        item("https://x/2", 2, "Rust news", "Plain"),
    ];
    let out = merge(&[], &new, &criteria, 50);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].link, "https://x/2");
}

#[test]
fn merging_the_same_batch_twice_is_idempotent() {
    let criteria = FilterCriteria::default();
    let new: Vec<Item> = (1..=5)
        .map(|d| item(&format!("https://x/{d}"), d, "t", "d"))
        .collect();
    let once = merge(&[], &new, &criteria, 50);
    let twice = merge(&once, &new, &criteria, 50);
    assert_eq!(once, twice);
}

#[test]
fn truncation_keeps_exactly_max_and_drops_the_lowest() {
    let criteria = FilterCriteria {
        keywords: vec!["rust".into(), "tokio".into()],
        ..Default::default()
    };
    let mut new = Vec::new();
    for d in 1..=9u32 {
        let title = match d % 3 {
            0 => "rust and tokio",
            1 => "rust only",
            _ => "tokio only",
        };
        new.push(item(&format!("https://x/{d}"), d, title, ""));
    }
    let max = 4;
    let out = merge(&[], &new, &criteria, max);
    assert_eq!(out.len(), max);

    let f = RelevanceFilter::new(&criteria);
    let min_kept = out.iter().map(|i| i.relevance_score).min().unwrap();
    let kept: Vec<&str> = out.iter().map(|i| i.id.as_str()).collect();
    for dropped in new.iter().filter(|i| !kept.contains(&i.id.as_str())) {
        assert!(f.score(dropped) <= min_kept);
    }
    // Both-keyword items rank first.
    assert_eq!(out[0].relevance_score, 4);
}

#[test]
fn score_is_stable_and_bonuses_add_up() {
    let mut it = item("https://x/1", 1, "Rust release", "");
    it.category = Some("tech".into());
    it.keywords = vec!["rust".into()];
    let f = RelevanceFilter::new(&FilterCriteria {
        keywords: vec!["rust".into()],
        categories: vec!["tech".into()],
        sources: vec!["A".into()],
        ..Default::default()
    });
    // 2 substring + 1 keyword + 1 category + 1 source
    assert_eq!(f.score(&it), 5);
    assert_eq!(f.score(&it), f.score(&it));
}

#[test]
fn criteria_change_rescores_existing_items() {
    let existing = merge(
        &[],
        &[item("https://x/1", 1, "golang", ""), item("https://x/2", 2, "rust", "")],
        &FilterCriteria::default(),
        50,
    );
    let narrowed = FilterCriteria {
        keywords: vec!["rust".into()],
        ..Default::default()
    };
    let out = merge(&existing, &[], &narrowed, 50);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "rust");
}

#[test]
fn ties_on_score_break_by_recency() {
    let a = item("https://x/a", 3, "same", "");
    let mut b = item("https://x/b", 3, "same", "");
    b.published_at += Duration::hours(1);
    let out = merge(&[], &[a, b], &FilterCriteria::default(), 50);
    assert_eq!(out[0].link, "https://x/b");
}
