//! Detail-page enrichment.
//!
//! Optionally opens the first N note detail pages of a keyword and backfills
//! fields the list page does not carry: body `content`, `publish_time`, and
//! a cleaner like count. Visiting detail pages is far more likely to trip
//! rate limiting, so the pass is off by default, capped, and throttled with
//! an inter-page delay. A failing card is logged and skipped; enrichment
//! never fails the keyword.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::browser::manager::BrowserSession;
use crate::core::types::{Card, CardStats};
use crate::dedup::KeywordResult;
use crate::extract::parse_count_literal;

const CONTENT_SNIPPET_MAX_CHARS: usize = 800;

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{4}[-/.]\d{1,2}[-/.]\d{1,2})").expect("valid date regex")
    })
}

fn like_mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d+)?万?)\s*(?:赞|点赞)").expect("valid like mention regex")
    })
}

fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).expect("valid meta selector");
    doc.select(&sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn body_text(doc: &Html) -> String {
    let sel = Selector::parse("body").expect("valid body selector");
    doc.select(&sel)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join("\n"))
        .unwrap_or_default()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Fold one detail page into a card. Existing field values win — enrichment
/// only fills gaps, it never overwrites what the list page already gave us.
pub fn apply_detail_html(card: &mut Card, html: &str) {
    let doc = Html::parse_document(html);

    if card.content.is_none() {
        let content = meta_content(&doc, r#"meta[name="description"]"#).or_else(|| {
            // Fallback: the first substantial body line as a summary snippet.
            body_text(&doc)
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(|l| truncate_chars(l, CONTENT_SNIPPET_MAX_CHARS))
        });
        card.content = content;
    }

    if card.publish_time.is_none() {
        let publish_time = meta_content(&doc, r#"meta[property="og:updated_time"]"#)
            .or_else(|| {
                date_re()
                    .captures(&body_text(&doc))
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            });
        card.publish_time = publish_time;
    }

    // The detail page often shows a cleaner like figure than the list card.
    let already_counted = card
        .stats
        .as_ref()
        .map(|s| s.like_count.is_some())
        .unwrap_or(false);
    if !already_counted {
        if let Some(m) = like_mention_re()
            .captures(&body_text(&doc))
            .and_then(|c| c.get(1))
        {
            if let Some(count) = parse_count_literal(m.as_str()) {
                let stats = card.stats.get_or_insert_with(CardStats::default);
                stats.like_count = Some(count);
            }
        }
    }
}

/// Visit up to `limit` detail pages and backfill their cards in place.
pub async fn enrich_cards(
    session: &BrowserSession,
    result: &mut KeywordResult,
    limit: usize,
    delay: Duration,
) {
    if limit == 0 || result.is_empty() {
        return;
    }

    let total = limit.min(result.card_count());
    info!(
        "🔎 enriching {} cards from detail pages (delay={}ms)",
        total,
        delay.as_millis()
    );

    for idx in 0..total {
        let link = result.cards()[idx].link.clone();

        match session.navigate(&link).await {
            Ok(()) => {
                tokio::time::sleep(Duration::from_millis(800)).await;
                match session.html_snapshot().await {
                    Ok(html) => {
                        apply_detail_html(&mut result.cards_mut()[idx], &html);
                        info!("  [{}/{}] ✓ {}", idx + 1, total, link);
                    }
                    Err(e) => warn!("  [{}/{}] ✗ {} — {}", idx + 1, total, link, e),
                }
            }
            Err(e) => warn!("  [{}/{}] ✗ {} — {}", idx + 1, total, link, e),
        }

        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> Card {
        Card::new(
            "64f1a2b3c4d5e6f7",
            "https://www.xiaohongshu.com/explore/64f1a2b3c4d5e6f7",
        )
    }

    #[test]
    fn fills_content_from_meta_description() {
        let mut c = card();
        apply_detail_html(
            &mut c,
            r#"<html><head><meta name="description" content="武功山云海日出，两天一夜路线"></head><body></body></html>"#,
        );
        assert_eq!(c.content.as_deref(), Some("武功山云海日出，两天一夜路线"));
    }

    #[test]
    fn falls_back_to_first_body_line() {
        let mut c = card();
        apply_detail_html(
            &mut c,
            "<html><body>\n  这是正文的第一段。\n  第二段。\n</body></html>",
        );
        assert_eq!(c.content.as_deref(), Some("这是正文的第一段。"));
    }

    #[test]
    fn publish_time_prefers_og_meta_over_body_regex() {
        let mut c = card();
        apply_detail_html(
            &mut c,
            r#"<html><head><meta property="og:updated_time" content="2025-11-02 10:30"></head>
               <body>编辑于 2024-01-01</body></html>"#,
        );
        assert_eq!(c.publish_time.as_deref(), Some("2025-11-02 10:30"));
    }

    #[test]
    fn publish_time_falls_back_to_date_in_body() {
        let mut c = card();
        apply_detail_html(&mut c, "<html><body>编辑于 2024-06-18 某地</body></html>");
        assert_eq!(c.publish_time.as_deref(), Some("2024-06-18"));
    }

    #[test]
    fn like_count_only_fills_gaps() {
        let mut c = card();
        c.stats = Some(CardStats {
            like_text: Some("1.2万".into()),
            like_count: Some(12_000),
        });
        apply_detail_html(&mut c, "<html><body>356 赞</body></html>");
        assert_eq!(c.stats.unwrap().like_count, Some(12_000));

        let mut c2 = card();
        apply_detail_html(&mut c2, "<html><body>共 1.5万 点赞</body></html>");
        assert_eq!(c2.stats.unwrap().like_count, Some(15_000));
    }

    #[test]
    fn existing_content_is_never_overwritten() {
        let mut c = card();
        c.content = Some("已有内容".into());
        apply_detail_html(
            &mut c,
            r#"<html><head><meta name="description" content="新内容"></head><body></body></html>"#,
        );
        assert_eq!(c.content.as_deref(), Some("已有内容"));
    }
}
