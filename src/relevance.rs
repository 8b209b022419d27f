// src/relevance.rs
//! Relevance filter: dedup new items into the collection, score everything
//! against the current criteria, keep positives, rank and cap.

use std::collections::HashSet;

use crate::config::FilterCriteria;
use crate::ingest::Item;

/// Score that removes an item no matter what else matched.
pub const EXCLUDED: i32 = -1;

/// Criteria prepared for scoring: lower-cased, blanks dropped.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    keywords: Vec<String>,
    exclude: Vec<String>,
    categories: HashSet<String>,
    sources: HashSet<String>,
    criteria: FilterCriteria,
}

impl RelevanceFilter {
    /// Keywords and exclude keywords are trimmed; blank entries are dropped,
    /// so a blank exclude keyword never matches.
    pub fn new(criteria: &FilterCriteria) -> Self {
        Self {
            keywords: lowered(&criteria.keywords),
            exclude: lowered(&criteria.exclude_keywords),
            categories: criteria.categories.iter().cloned().collect(),
            sources: criteria.sources.iter().cloned().collect(),
            criteria: criteria.clone(),
        }
    }

    /// Pure function of (item content, criteria).
    pub fn score(&self, item: &Item) -> i32 {
        let text = format!("{} {}", item.title, item.description).to_lowercase();

        if self.exclude.iter().any(|k| text.contains(k.as_str())) {
            return EXCLUDED;
        }
        if let Some(from) = self.criteria.date_from {
            if item.published_at < from {
                return EXCLUDED;
            }
        }
        if let Some(to) = self.criteria.date_to {
            if item.published_at > to {
                return EXCLUDED;
            }
        }

        let mut score = 0;
        if self.keywords.is_empty() {
            score = 1;
        } else {
            for k in &self.keywords {
                if text.contains(k.as_str()) {
                    score += 2;
                }
            }
            for kw in &item.keywords {
                let kw = kw.to_lowercase();
                if self.keywords.iter().any(|k| *k == kw) {
                    score += 1;
                }
            }
        }

        if !self.categories.is_empty() {
            if let Some(cat) = &item.category {
                if self.categories.contains(cat) {
                    score += 1;
                }
            }
        }
        if !self.sources.is_empty() && self.sources.contains(&item.source) {
            score += 1;
        }
        score
    }

    /// Re-score every item, keep positives, sort by score then recency
    /// (both descending) and truncate to `max_count`.
    pub fn rank(&self, items: Vec<Item>, max_count: usize) -> Vec<Item> {
        let before = items.len();
        let mut kept: Vec<Item> = items
            .into_iter()
            .filter_map(|mut it| {
                it.relevance_score = self.score(&it);
                (it.relevance_score > 0).then_some(it)
            })
            .collect();

        // Stable: equal (score, time) keep merge order.
        kept.sort_by(|a, b| {
            b.relevance_score
                .cmp(&a.relevance_score)
                .then_with(|| b.published_at.cmp(&a.published_at))
        });
        let passed = kept.len();
        kept.truncate(max_count);

        tracing::debug!(
            target: "relevance",
            considered = before,
            passed,
            retained = kept.len(),
            "ranked collection"
        );
        kept
    }
}

fn lowered(words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Prepend the new items whose id is not yet known (in the collection or
/// earlier in `new`) to `existing`.
pub fn dedup_prepend(existing: &[Item], new: &[Item]) -> Vec<Item> {
    let mut seen: HashSet<&str> = existing.iter().map(|i| i.id.as_str()).collect();
    let mut out = Vec::with_capacity(existing.len() + new.len());
    for it in new {
        if seen.insert(it.id.as_str()) {
            out.push(it.clone());
        }
    }
    out.extend(existing.iter().cloned());
    out
}

/// Full merge step: dedup, score the whole merged list, rank, cap.
pub fn merge(existing: &[Item], new: &[Item], criteria: &FilterCriteria, max_count: usize) -> Vec<Item> {
    let merged = dedup_prepend(existing, new);
    RelevanceFilter::new(criteria).rank(merged, max_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(id: &str, title: &str, desc: &str, day: u32) -> Item {
        Item {
            id: id.to_string(),
            title: title.to_string(),
            description: desc.to_string(),
            link: format!("https://x/{id}"),
            published_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            source: "A".to_string(),
            category: None,
            keywords: Vec::new(),
            is_read: false,
            relevance_score: 0,
        }
    }

    #[test]
    fn keyword_substring_and_extracted_keyword_bonus() {
        let mut it = item("1", "Rust 2.0 released", "Faster builds", 1);
        it.keywords = vec!["rust".into(), "released".into()];
        let f = RelevanceFilter::new(&FilterCriteria {
            keywords: vec!["RUST".into(), "python".into()],
            ..Default::default()
        });
        // +2 substring, +1 extracted keyword
        assert_eq!(f.score(&it), 3);
    }

    #[test]
    fn exclusion_overrides_category_and_source_bonus() {
        let mut it = item("1", "Deal", "Sponsored content", 1);
        it.category = Some("tech".into());
        let f = RelevanceFilter::new(&FilterCriteria {
            exclude_keywords: vec!["sponsored".into()],
            categories: vec!["tech".into()],
            sources: vec!["A".into()],
            ..Default::default()
        });
        assert_eq!(f.score(&it), EXCLUDED);
    }

    #[test]
    fn date_window_excludes() {
        let it = item("1", "t", "d", 5);
        let f = RelevanceFilter::new(&FilterCriteria {
            date_from: Some(Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap()),
            ..Default::default()
        });
        assert_eq!(f.score(&it), EXCLUDED);
        let g = RelevanceFilter::new(&FilterCriteria {
            date_to: Some(Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap()),
            ..Default::default()
        });
        assert_eq!(g.score(&it), EXCLUDED);
    }

    #[test]
    fn blank_keywords_are_ignored() {
        let it = item("1", "t", "d", 1);
        let f = RelevanceFilter::new(&FilterCriteria {
            keywords: vec!["  ".into()],
            ..Default::default()
        });
        assert_eq!(f.score(&it), 1);
    }

    #[test]
    fn blank_exclude_keyword_excludes_nothing() {
        let it = item("1", "t", "d", 1);
        let f = RelevanceFilter::new(&FilterCriteria {
            exclude_keywords: vec!["".into(), " ".into()],
            ..Default::default()
        });
        assert_eq!(f.score(&it), 1);
    }

    #[test]
    fn duplicate_ids_inside_one_batch_collapse() {
        let a = item("same", "a", "", 1);
        let b = item("same", "b", "", 2);
        let out = dedup_prepend(&[], &[a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "a");
    }
}
