use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::ScoutError;

/// Engagement counters attached to a card, as far as the list page exposes
/// them. `like_text` keeps the raw figure ("1.2万"), `like_count` the parsed
/// numeric value when parseable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CardStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
}

impl CardStats {
    pub fn is_empty(&self) -> bool {
        self.like_text.is_none() && self.like_count.is_none()
    }
}

/// `stats` is omitted from the artifact when absent *or* present but empty —
/// an all-`None` stats object carries no information.
fn stats_omitted(stats: &Option<CardStats>) -> bool {
    stats.as_ref().map(CardStats::is_empty).unwrap_or(true)
}

/// One extracted search-result card.
///
/// `id` is the note id taken from the canonical `/explore/<id>` link after
/// stripping the query string, and is the dedup key: two cards with equal
/// `id` are the same note regardless of any other field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub id: String,
    /// Canonical note URL, query string stripped.
    pub link: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "stats_omitted")]
    pub stats: Option<CardStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Backfilled from the detail page when enrichment is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,
}

impl Card {
    pub fn new(id: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            link: link.into(),
            title: String::new(),
            author: String::new(),
            stats: None,
            thumbnail: None,
            content: None,
            publish_time: None,
        }
    }
}

/// A keyword whose pipeline failed, with the recorded reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordFailure {
    pub keyword: String,
    pub error: String,
}

/// Run metadata written alongside the keyword→cards mapping.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunMeta {
    pub generated_at: DateTime<Utc>,
    /// Keywords in input order (the order of the `results` keys).
    pub keyword_order: Vec<String>,
    pub total_unique_cards: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_keywords: Vec<KeywordFailure>,
}

/// The single artifact a run produces.
///
/// `results` maps each keyword to its ordered card list; serde_json's
/// `preserve_order` feature keeps the keys in insertion (= input) order.
/// Built fresh each run and written once, atomically.
#[derive(Debug, Serialize, Deserialize)]
pub struct AggregateOutput {
    pub meta: RunMeta,
    pub results: serde_json::Map<String, serde_json::Value>,
}

impl AggregateOutput {
    pub fn new() -> Self {
        Self {
            meta: RunMeta {
                generated_at: Utc::now(),
                keyword_order: Vec::new(),
                total_unique_cards: 0,
                failed_keywords: Vec::new(),
            },
            results: serde_json::Map::new(),
        }
    }

    /// Record one keyword's cards. Every keyword gets an entry, empty or not,
    /// so the artifact is structurally complete for downstream consumers.
    ///
    /// A keyword owns exactly one entry: pushing the same keyword again is a
    /// no-op (first push wins, same rule as card dedup), keeping the metadata
    /// consistent with the `results` map.
    pub fn push_keyword(&mut self, keyword: &str, cards: &[Card]) -> Result<(), ScoutError> {
        if self.results.contains_key(keyword) {
            return Ok(());
        }
        let value = serde_json::to_value(cards)
            .map_err(|e| ScoutError::Write(format!("serialize cards for '{}': {}", keyword, e)))?;
        self.meta.keyword_order.push(keyword.to_string());
        self.meta.total_unique_cards += cards.len();
        self.results.insert(keyword.to_string(), value);
        Ok(())
    }

    pub fn record_failure(&mut self, keyword: &str, error: &ScoutError) {
        self.meta.failed_keywords.push(KeywordFailure {
            keyword: keyword.to_string(),
            error: error.to_string(),
        });
    }
}

impl Default for AggregateOutput {
    fn default() -> Self {
        Self::new()
    }
}
