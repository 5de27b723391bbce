//! Card extraction from the rendered search-results document.
//!
//! The DOM on the target site changes often, so extraction is deliberately
//! schema-tolerant: note anchors are the entry point, the surrounding card
//! container supplies title/author/stats/thumbnail when present, and any
//! missing non-identifying field degrades to empty instead of aborting the
//! card. Cards without a derivable note link are dropped silently — they are
//! ads, navigation, or malformed markup, not errors.
//!
//! `parse_cards` is pure (HTML in, cards out); the browser layer feeds it a
//! fresh snapshot after every scroll iteration.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::core::types::{Card, CardStats};

pub const XHS_BASE_URL: &str = "https://www.xiaohongshu.com";

/// List-page blocks that contain note anchors but are not result cards:
/// login wall, QR prompt, footer, nav. One hit disqualifies the container.
const BOILERPLATE_NEEDLES: &[&str] = &[
    "手机号登录",
    "扫码",
    "登录后推荐",
    "用户协议",
    "隐私政策",
    "重新发送",
    "沪ICP备",
    "行吟信息科技",
    "增值电信业务",
    "创作中心",
    "业务合作",
    "个性化推荐算法",
];

fn note_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/explore/([0-9a-fA-F]{10,})").expect("valid note path regex"))
}

fn count_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)(万|千)?").expect("valid count regex"))
}

fn like_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\s*(?:赞|点赞)$").expect("valid like suffix regex"))
}

// ── Link handling ────────────────────────────────────────────────────────────

/// Resolve protocol-relative and site-relative hrefs against the site origin.
pub fn normalize_note_url(href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if let Some(rest) = href.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    if href.starts_with('/') {
        return Some(format!("{}{}", XHS_BASE_URL, href));
    }
    Some(href.to_string())
}

/// Strip the query string. Tracking parameters vary per scroll iteration and
/// would defeat dedup; the path alone is the stable identity.
pub fn strip_tracking_params(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Only keep links that look like a note detail page. The list page mixes in
/// channel and navigation links under the same path prefix.
pub fn looks_like_note_url(url: &str) -> bool {
    if url.starts_with(&format!("{}/explore?", XHS_BASE_URL)) {
        return false;
    }
    note_path_re().is_match(url)
}

/// The note id embedded in a canonical note URL — the dedup key.
pub fn note_id(url: &str) -> Option<String> {
    note_path_re()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

// ── Count literals ───────────────────────────────────────────────────────────

/// Parse engagement count literals: "1.2万" → 12000, "3千" → 3000, "356" → 356,
/// "1万+" → 10000. Returns `None` for text without a leading number.
pub fn parse_count_literal(text: &str) -> Option<u64> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    let caps = count_literal_re().captures(s)?;
    let num: f64 = caps.get(1)?.as_str().parse().ok()?;
    let scale = match caps.get(2).map(|m| m.as_str()) {
        Some("万") => 10_000.0,
        Some("千") => 1_000.0,
        _ => 1.0,
    };
    Some((num * scale) as u64)
}

// ── Container helpers ────────────────────────────────────────────────────────

/// Walk up from a note anchor to the element that most plausibly bounds the
/// card: a `section`/`article`/`li`, or anything whose class mentions a note
/// card. Capped so a page-level wrapper is never mistaken for a card; an
/// anchor with no recognizable container is left for the bare-anchor sweep.
fn card_container<'a>(anchor: ElementRef<'a>) -> Option<ElementRef<'a>> {
    let mut hops = 0usize;
    for node in anchor.ancestors() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        hops += 1;
        if hops > 6 {
            break;
        }
        let name = el.value().name();
        if matches!(name, "section" | "article" | "li") {
            return Some(el);
        }
        if let Some(class) = el.value().attr("class") {
            if class.contains("note-item") || class.contains("note-card") {
                return Some(el);
            }
        }
    }
    None
}

fn visible_lines(el: ElementRef<'_>) -> Vec<String> {
    el.text()
        .flat_map(|t| t.split('\n'))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

fn is_boilerplate(lines: &[String]) -> bool {
    lines
        .iter()
        .any(|l| BOILERPLATE_NEEDLES.iter().any(|n| l.contains(n)))
}

/// Text-line heuristics for title / author / like figure, mirroring how the
/// card renders: a prominent title line, a short author line without digits,
/// a short counter line with digits.
fn fill_from_lines(card: &mut Card, lines: &[String]) {
    for line in lines.iter().take(8) {
        let chars = line.chars().count();
        if (4..=80).contains(&chars) && !like_suffix_re().is_match(line) {
            card.title = line.clone();
            break;
        }
    }

    let mut like_text: Option<String> = None;
    for line in lines.iter().take(12) {
        if like_text.is_none()
            && line.chars().any(|c| c.is_ascii_digit())
            && line.chars().count() <= 20
        {
            like_text = Some(line.clone());
        }
        if card.author.is_empty() {
            let chars = line.chars().count();
            if (1..=20).contains(&chars)
                && !line.chars().any(|c| c.is_ascii_digit())
                && *line != card.title
            {
                card.author = line.clone();
            }
        }
    }

    if let Some(text) = like_text {
        let like_count = parse_count_literal(&text);
        card.stats = Some(CardStats {
            like_text: Some(text),
            like_count,
        });
    }
}

fn thumbnail_from(el: ElementRef<'_>) -> Option<String> {
    let sel_img = Selector::parse("img").expect("valid img selector");
    let img = el.select(&sel_img).next()?;
    let src = img
        .value()
        .attr("src")
        .filter(|s| !s.trim().is_empty())
        .or_else(|| img.value().attr("data-src"))?;
    let src = src.trim();
    // Inline placeholders are not thumbnails.
    if src.is_empty() || src.starts_with("data:image") {
        return None;
    }
    normalize_note_url(src)
}

// ── Extraction entry point ───────────────────────────────────────────────────

/// Below this many cards the container pass is considered to have missed the
/// page's markup, and the bare-anchor sweep kicks in.
const SPARSE_RESULT_THRESHOLD: usize = 8;

/// Note id + canonical link for an anchor, or `None` when the href does not
/// point at a note detail page.
fn note_identity(anchor: ElementRef<'_>) -> Option<(String, String)> {
    let href = anchor.value().attr("href").and_then(normalize_note_url)?;
    if !looks_like_note_url(&href) {
        return None;
    }
    let link = strip_tracking_params(&href).to_string();
    let id = note_id(&link)?;
    Some((id, link))
}

/// Extract the current full set of cards visible in the document.
///
/// Two strategies, in order. The container pass walks note anchors up to
/// their card block and reads title/author/stats/thumbnail from it. When
/// that pass comes back sparse — the site restructured its card markup —
/// a bare-anchor sweep picks up the remaining note links with whatever text
/// the anchor itself carries.
///
/// Idempotent over the growing page: called after every scroll iteration, it
/// re-reads everything; the deduplicator downstream decides what is new.
/// Within one pass, the first occurrence of a note id wins.
pub fn parse_cards(html: &str) -> Vec<Card> {
    let doc = Html::parse_document(html);
    let sel_anchor = Selector::parse("a[href]").expect("valid anchor selector");

    let mut seen: HashSet<String> = HashSet::new();
    let mut boilerplate_ids: HashSet<String> = HashSet::new();
    let mut out: Vec<Card> = Vec::new();

    for anchor in doc.select(&sel_anchor) {
        let Some((id, link)) = note_identity(anchor) else {
            continue;
        };
        if seen.contains(&id) {
            continue;
        }
        let Some(container) = card_container(anchor) else {
            continue;
        };

        let lines = visible_lines(container);
        if is_boilerplate(&lines) {
            // Login wall / footer block, not a result card. The id stays
            // unclaimed in case a real card carries it later, but is barred
            // from the bare-anchor sweep.
            boilerplate_ids.insert(id);
            continue;
        }

        let mut card = Card::new(id.clone(), link);
        fill_from_lines(&mut card, &lines);
        card.thumbnail = thumbnail_from(container);

        seen.insert(id);
        out.push(card);
    }

    if out.len() < SPARSE_RESULT_THRESHOLD {
        for anchor in doc.select(&sel_anchor) {
            let Some((id, link)) = note_identity(anchor) else {
                continue;
            };
            if seen.contains(&id) || boilerplate_ids.contains(&id) {
                continue;
            }
            let text = anchor.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if BOILERPLATE_NEEDLES.iter().any(|n| text.contains(n)) {
                continue;
            }

            let mut card = Card::new(id.clone(), link);
            card.title = text;

            seen.insert(id);
            out.push(card);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTE_A: &str = "64f1a2b3c4d5e6f7a8b9c0d1";
    const NOTE_B: &str = "0123456789abcdef";

    fn card_html(id: &str, title: &str, author: &str, likes: &str) -> String {
        format!(
            r#"<section class="note-item">
                <a href="/explore/{id}?xsec_token=ABC&source=search"><img src="//sns-img.xhscdn.com/{id}.jpg"></a>
                <div class="footer">
                    <a href="/explore/{id}"><span>{title}</span></a>
                    <div class="author-wrapper"><span class="name">{author}</span></div>
                    <span class="count">{likes}</span>
                </div>
            </section>"#
        )
    }

    #[test]
    fn normalizes_relative_and_protocol_relative_links() {
        assert_eq!(
            normalize_note_url("/explore/abc").as_deref(),
            Some("https://www.xiaohongshu.com/explore/abc")
        );
        assert_eq!(
            normalize_note_url("//www.xiaohongshu.com/explore/abc").as_deref(),
            Some("https://www.xiaohongshu.com/explore/abc")
        );
        assert!(normalize_note_url("   ").is_none());
    }

    #[test]
    fn note_url_filter_rejects_channel_links() {
        assert!(looks_like_note_url(
            "https://www.xiaohongshu.com/explore/64f1a2b3c4d5e6f7"
        ));
        assert!(!looks_like_note_url(
            "https://www.xiaohongshu.com/explore?channel_id=homefeed"
        ));
        assert!(!looks_like_note_url("https://www.xiaohongshu.com/explore/short"));
    }

    #[test]
    fn id_is_stable_across_tracking_params() {
        let a = format!("{}/explore/{}?xsec_token=AA", XHS_BASE_URL, NOTE_A);
        let b = format!("{}/explore/{}?xsec_token=BB&source=feed", XHS_BASE_URL, NOTE_A);
        assert_eq!(
            note_id(strip_tracking_params(&a)),
            note_id(strip_tracking_params(&b))
        );
    }

    #[test]
    fn parses_chinese_count_literals() {
        assert_eq!(parse_count_literal("1.2万"), Some(12_000));
        assert_eq!(parse_count_literal("3千"), Some(3_000));
        assert_eq!(parse_count_literal("356"), Some(356));
        assert_eq!(parse_count_literal("1万+"), Some(10_000));
        assert_eq!(parse_count_literal("赞"), None);
        assert_eq!(parse_count_literal(""), None);
    }

    #[test]
    fn extracts_card_fields_from_container() {
        let html = card_html(NOTE_A, "武功山两日徒步全攻略", "山野小徐", "1.2万");
        let cards = parse_cards(&html);
        assert_eq!(cards.len(), 1);
        let c = &cards[0];
        assert_eq!(c.id, NOTE_A);
        assert_eq!(c.link, format!("{}/explore/{}", XHS_BASE_URL, NOTE_A));
        assert_eq!(c.title, "武功山两日徒步全攻略");
        assert_eq!(c.author, "山野小徐");
        let stats = c.stats.as_ref().unwrap();
        assert_eq!(stats.like_count, Some(12_000));
        assert!(c.thumbnail.as_deref().unwrap().starts_with("https://"));
    }

    #[test]
    fn cover_and_title_anchor_collapse_to_one_card() {
        // Both anchors in the fixture point at the same note.
        let html = card_html(NOTE_A, "同一篇笔记的两个链接", "作者", "88");
        assert_eq!(parse_cards(&html).len(), 1);
    }

    #[test]
    fn anchors_without_note_links_are_dropped_silently() {
        let html = r#"
            <div><a href="/search_result?keyword=x">搜索</a></div>
            <div><a href="https://ads.example.com/promo">广告位</a></div>
        "#;
        assert!(parse_cards(html).is_empty());
    }

    #[test]
    fn login_wall_block_is_filtered() {
        let html = format!(
            r#"<section>
                <a href="/explore/{NOTE_B}">推荐内容</a>
                <p>手机号登录</p><p>用户协议</p><p>隐私政策</p>
            </section>"#
        );
        assert!(parse_cards(&html).is_empty());
    }

    #[test]
    fn missing_optional_fields_degrade_to_empty() {
        let html = format!(r#"<section class="note-item"><a href="/explore/{NOTE_B}"></a></section>"#);
        let cards = parse_cards(&html);
        assert_eq!(cards.len(), 1);
        assert!(cards[0].title.is_empty());
        assert!(cards[0].author.is_empty());
        assert!(cards[0].stats.is_none());
        assert!(cards[0].thumbnail.is_none());
    }

    #[test]
    fn bare_anchor_sweep_recovers_cards_from_unrecognized_markup() {
        // No section/article/li and no note-* class anywhere: the container
        // pass finds nothing, so the sweep keeps the anchors' own text.
        let html = format!(
            r#"<div><div><a href="/explore/{NOTE_A}?xsec_token=T">周末武功山看云海</a></div></div>
               <div><div><a href="/explore/{NOTE_B}">秋冬通勤穿搭合集</a></div></div>"#
        );
        let cards = parse_cards(&html);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].id, NOTE_A);
        assert_eq!(cards[0].title, "周末武功山看云海");
        assert_eq!(cards[0].link, format!("{}/explore/{}", XHS_BASE_URL, NOTE_A));
        assert_eq!(cards[1].title, "秋冬通勤穿搭合集");
    }

    #[test]
    fn bare_anchor_sweep_is_skipped_when_container_pass_is_rich() {
        // Eight recognized cards clear the sparse threshold; the stray bare
        // anchor must not be swept in on top of them.
        let mut html = String::new();
        for i in 0..8u32 {
            html.push_str(&card_html(
                &format!("{:024x}", i + 1),
                "容器卡片的标题文字",
                "作者",
                "66",
            ));
        }
        html.push_str(&format!(r#"<div><a href="/explore/{NOTE_A}">游离链接</a></div>"#));

        let cards = parse_cards(&html);
        assert_eq!(cards.len(), 8);
        assert!(cards.iter().all(|c| c.id != NOTE_A));
    }

    #[test]
    fn extraction_is_idempotent_over_unchanged_html() {
        let html = format!(
            "{}{}",
            card_html(NOTE_A, "第一篇笔记的标题", "作者甲", "200"),
            card_html(NOTE_B, "第二篇笔记的标题", "作者乙", "3千")
        );
        let first = parse_cards(&html);
        let second = parse_cards(&html);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
