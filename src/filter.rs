// src/filter.rs
// Relevance rules (allow/deny substrings, recency cutoff) plus dedup by
// normalized title. First-seen wins; ordering stays stable.

use std::collections::HashSet;

use crate::extract::CandidateItem;
use crate::normalize::title_key;

/// A candidate that passed the rules. Same shape as the candidate, kept as an
/// alias so signatures say what stage they operate on.
pub type FilteredItem = CandidateItem;

fn matches_any(item: &CandidateItem, terms: &[String]) -> bool {
    let title = item.title.to_lowercase();
    let summary = item
        .summary
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();
    terms.iter().any(|t| {
        let t = t.trim().to_lowercase();
        !t.is_empty() && (title.contains(&t) || summary.contains(&t))
    })
}

/// Apply recency + allow/deny rules, then dedup against `seen`.
///
/// Rules, in order:
/// - undated items always pass the recency gate; dated ones need
///   `published_at >= cutoff` (inclusive);
/// - an empty allow-list passes everything, otherwise at least one
///   case-insensitive substring hit in title or summary is required;
/// - any deny hit excludes the item.
///
/// `seen` holds title keys kept earlier in the run, so the same set threaded
/// across sources gives run-wide dedup.
pub fn filter_items_seen(
    items: Vec<CandidateItem>,
    allow: &[String],
    deny: &[String],
    cutoff: i64,
    seen: &mut HashSet<String>,
) -> Vec<FilteredItem> {
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        if let Some(ts) = item.published_at {
            if ts < cutoff {
                continue;
            }
        }
        if !allow.is_empty() && !matches_any(&item, allow) {
            continue;
        }
        if !deny.is_empty() && matches_any(&item, deny) {
            continue;
        }
        if !seen.insert(title_key(&item.title)) {
            continue;
        }
        kept.push(item);
    }
    kept
}

/// Single-batch variant with a fresh dedup set.
pub fn filter_items(
    items: Vec<CandidateItem>,
    allow: &[String],
    deny: &[String],
    cutoff: i64,
) -> Vec<FilteredItem> {
    let mut seen = HashSet::new();
    filter_items_seen(items, allow, deny, cutoff, &mut seen)
}

/// Drop items whose normalized title was already kept earlier in the run.
pub fn dedup_across(items: Vec<FilteredItem>, seen: &mut HashSet<String>) -> Vec<FilteredItem> {
    items
        .into_iter()
        .filter(|item| seen.insert(title_key(&item.title)))
        .collect()
}
