// src/ingest/feed.rs
//! Feed normalizer: one raw item-list XML payload in, ordered `Item`s out.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use super::normalize_text;
use super::types::Item;
use crate::error::{Result, WatchError};

const MAX_KEYWORDS: usize = 10;
const MIN_KEYWORD_LEN: usize = 4;

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    channel: Option<Channel>,
    // RSS 1.0 / RDF keeps items next to the channel instead of inside it.
    #[serde(default, rename = "item")]
    item: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default, rename = "item")]
    item: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(default)]
    category: Vec<String>,
}

/// Parse a feed payload; a malformed payload is logged and yields no items.
pub fn parse_feed(xml: &str, source_name: &str, source_url: &str, stop_words: &HashSet<String>) -> Vec<Item> {
    match try_parse_feed(xml, source_name, source_url, stop_words) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(target: "ingest", error = %e, source = source_name, url = source_url, "feed dropped");
            Vec::new()
        }
    }
}

/// Like [`parse_feed`] but reports malformed payloads, so the caller can
/// count them against the source.
pub fn try_parse_feed(
    xml: &str,
    source_name: &str,
    source_url: &str,
    stop_words: &HashSet<String>,
) -> Result<Vec<Item>> {
    let t0 = std::time::Instant::now();
    let now = Utc::now();

    let xml_clean = scrub_html_entities_for_xml(xml);
    let doc: Document = from_str(&xml_clean).map_err(|e| {
        counter!("ingest_parse_errors_total").increment(1);
        WatchError::Parse(format!("{source_url}: {e}"))
    })?;

    let raw_items = doc
        .channel
        .map(|c| c.item)
        .unwrap_or_default()
        .into_iter()
        .chain(doc.item);

    let mut out = Vec::new();
    for it in raw_items {
        let title = it.title.as_deref().map(str::trim).unwrap_or_default();
        let link = it.link.as_deref().map(str::trim).unwrap_or_default();
        if title.is_empty() || link.is_empty() {
            continue;
        }
        let raw_date = it.pub_date.as_deref().map(str::trim).unwrap_or_default();

        let title = normalize_text(title);
        let description = normalize_text(it.description.as_deref().unwrap_or_default());
        let keywords = extract_keywords(&format!("{title} {description}"), stop_words);

        out.push(Item {
            id: item_id(link, raw_date),
            title,
            description,
            link: link.to_string(),
            published_at: parse_pub_date(raw_date).unwrap_or(now),
            source: source_name.to_string(),
            category: it
                .category
                .iter()
                .map(|c| c.trim())
                .find(|c| !c.is_empty())
                .map(str::to_string),
            keywords,
            is_read: false,
            relevance_score: 0,
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    counter!("ingest_events_total").increment(out.len() as u64);
    tracing::debug!(target: "ingest", source = source_name, items = out.len(), "feed parsed");
    Ok(out)
}

/// Stable item id: 32-bit polynomial hash (x31) over the UTF-16 units of
/// `link + raw_date`, rendered as non-negative base-36. Same link and date
/// always collapse to one id.
pub fn item_id(link: &str, raw_date: &str) -> String {
    let mut hash: i64 = 0;
    for unit in link.encode_utf16().chain(raw_date.encode_utf16()) {
        // Multiply wraps at 32 bits; the final add does not.
        hash = i64::from((hash as i32).wrapping_mul(31)) + i64::from(unit);
    }
    to_base36(hash.unsigned_abs())
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

/// Top keywords of `text`: lower-cased, punctuation folded to spaces, tokens
/// shorter than four chars and stop words dropped, ranked by frequency with
/// ties in first-seen order.
pub fn extract_keywords(text: &str, stop_words: &HashSet<String>) -> Vec<String> {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut order: Vec<(&str, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for word in folded.split_whitespace() {
        if word.len() < MIN_KEYWORD_LEN || stop_words.contains(word) {
            continue;
        }
        match index.get(word) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(word, order.len());
                order.push((word, 1));
            }
        }
    }

    // Stable sort keeps first-seen order among equal counts.
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(w, _)| w.to_string())
        .collect()
}

/// RFC 2822 first (the common feed format), then RFC 3339 and bare dates.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Some(dt) = OffsetDateTime::parse(raw, &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond()))
    {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(ndt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

// HTML entities are not defined in XML; feeds leak them anyway.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", "&#160;")
        .replace("&ndash;", "&#8211;")
        .replace("&mdash;", "&#8212;")
        .replace("&ldquo;", "&#8220;")
        .replace("&rdquo;", "&#8221;")
        .replace("&lsquo;", "&#8216;")
        .replace("&rsquo;", "&#8217;")
        .replace("&hellip;", "&#8230;")
}
