// src/extract.rs
// Turns a fetched document into candidate items. Feeds parse as RSS; pages go
// through best-effort HTML segmentation. Unparseable feeds degrade to the
// page path instead of erroring, so an odd byte never costs us the source.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use url::Url;

use crate::fetch::RawDocument;
use crate::normalize::normalize_text;
use crate::sources::SourceKind;

/// One article-like entry, prior to filtering.
/// Titles and summaries are already de-markup'd (see `normalize_text`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    pub title: String,
    pub summary: Option<String>,
    pub link: Option<String>,
    /// Unix seconds, when the source published one.
    pub published_at: Option<i64>,
}

pub fn extract(doc: &RawDocument) -> Vec<CandidateItem> {
    let mut items = match doc.source.kind {
        SourceKind::Feed => match extract_feed(&doc.text) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(
                    source = %doc.source.name,
                    error = ?e,
                    "feed unparseable, falling back to page extraction"
                );
                extract_page(&doc.text)
            }
        },
        SourceKind::Page => extract_page(&doc.text),
    };
    resolve_links(&mut items, &doc.source.url);
    items
}

/// Page hrefs are often relative; resolve them against the source URL.
fn resolve_links(items: &mut [CandidateItem], base: &str) {
    let Ok(base) = Url::parse(base) else { return };
    for item in items.iter_mut() {
        if let Some(link) = &item.link {
            if let Ok(resolved) = base.join(link) {
                item.link = Some(resolved.to_string());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Feed path (RSS via quick-xml serde)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    // `content:encoded` carries the full body on feeds that provide it.
    #[serde(rename = "encoded", alias = "content:encoded", default)]
    content: Option<String>,
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<i64> {
    // chrono accepts the obsolete zone names (GMT, EST) real feeds still use.
    chrono::DateTime::parse_from_rfc2822(ts)
        .ok()
        .map(|dt| dt.timestamp())
}

pub fn extract_feed(text: &str) -> Result<Vec<CandidateItem>> {
    let xml_clean = scrub_html_entities_for_xml(text);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

    let mut out = Vec::with_capacity(rss.channel.items.len());
    for it in rss.channel.items {
        let title = normalize_text(it.title.as_deref().unwrap_or_default());
        if title.is_empty() {
            continue;
        }

        // Prefer the full content body over the short description.
        let summary_raw = it
            .content
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(it.description.as_deref())
            .unwrap_or_default();
        let summary = match normalize_text(summary_raw) {
            s if s.is_empty() => None,
            s => Some(s),
        };

        out.push(CandidateItem {
            title,
            summary,
            link: it.link.filter(|l| !l.trim().is_empty()),
            published_at: it.pub_date.as_deref().and_then(parse_rfc2822_to_unix),
        });
    }
    Ok(out)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

// ---------------------------------------------------------------------------
// Page path (scraper)
// ---------------------------------------------------------------------------

/// Subtrees that never carry article content.
const NOISE_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "iframe", "noscript", "form",
];

static SEL_BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static SEL_HEADINGS: Lazy<Selector> = Lazy::new(|| Selector::parse("h1, h2, h3").unwrap());

/// Max heading-like candidates taken from one page.
const MAX_PAGE_CANDIDATES: usize = 20;

pub fn extract_page(text: &str) -> Vec<CandidateItem> {
    let document = Html::parse_document(text);

    // First choice: headings outside noise subtrees become candidate titles.
    let mut out = Vec::new();
    for heading in document.select(&SEL_HEADINGS) {
        if inside_noise(&heading) {
            continue;
        }
        let title = normalize_text(&heading.text().collect::<Vec<_>>().join(" "));
        if title.is_empty() {
            continue;
        }
        out.push(CandidateItem {
            title,
            summary: following_text(&heading),
            link: heading_link(&heading),
            published_at: None,
        });
        if out.len() >= MAX_PAGE_CANDIDATES {
            break;
        }
    }
    if !out.is_empty() {
        return out;
    }

    // No usable headings: segment the visible body text into heading-like
    // lines. Zero candidates is a valid outcome here.
    let root = document
        .select(&SEL_BODY)
        .next()
        .unwrap_or_else(|| document.root_element());
    let mut text_lines = String::new();
    collect_visible_text(root, &mut text_lines);
    text_lines
        .lines()
        .map(normalize_text)
        .filter(|l| (30..=160).contains(&l.chars().count()))
        .take(MAX_PAGE_CANDIDATES)
        .map(|l| CandidateItem {
            title: l,
            summary: None,
            link: None,
            published_at: None,
        })
        .collect()
}

fn is_noise(name: &str) -> bool {
    NOISE_TAGS.contains(&name)
}

fn inside_noise(el: &ElementRef) -> bool {
    el.ancestors()
        .any(|a| a.value().as_element().is_some_and(|e| is_noise(e.name())))
}

/// Visible text of `el`, skipping noise subtrees, one text node per line.
fn collect_visible_text(el: ElementRef, out: &mut String) {
    if is_noise(el.value().name()) {
        return;
    }
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            collect_visible_text(child_el, out);
        } else if let Some(t) = child.value().as_text() {
            let t = t.trim();
            if !t.is_empty() {
                out.push_str(t);
                out.push('\n');
            }
        }
    }
}

/// Short summary from the first non-noise element following a heading.
fn following_text(heading: &ElementRef) -> Option<String> {
    for sib in heading.next_siblings() {
        if let Some(el) = ElementRef::wrap(sib) {
            if is_noise(el.value().name()) {
                continue;
            }
            let text = normalize_text(&el.text().collect::<Vec<_>>().join(" "));
            if !text.is_empty() {
                return Some(truncate_chars(&text, 400));
            }
        }
    }
    None
}

/// Link from the first anchor inside a heading, if any.
fn heading_link(heading: &ElementRef) -> Option<String> {
    static SEL_ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
    heading
        .select(&SEL_ANCHOR)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => s[..i].to_string(),
        None => s.to_string(),
    }
}
