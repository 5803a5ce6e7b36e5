// src/pipeline.rs
// Per-run orchestration. Sources run as independent workers; one failure
// never aborts siblings. Section order always follows registry order, no
// matter how the workers interleave.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinSet;

use crate::config::AppConfig;
use crate::deliver::{default_transports, DeliveryEngine, DeliveryResult, MailTransport};
use crate::extract;
use crate::fetch::{DocumentFetcher, HttpFetcher};
use crate::filter::{self, FilteredItem};
use crate::report::{self, Report, Section};
use crate::sources::SourceDescriptor;
use crate::summarize::{self, Summarizer};

pub struct RunOutcome {
    pub report: Report,
    pub delivery: DeliveryResult,
}

enum SourceOutcome {
    /// Fetched and extracted; items already passed the local relevance rules.
    Fetched(Vec<FilteredItem>),
    /// Fetch failed; the source contributes nothing this run.
    Failed,
}

/// Wire the production collaborators and run once.
pub async fn run(config: &AppConfig) -> Result<RunOutcome> {
    let fetcher: Arc<dyn DocumentFetcher> = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
    let summarizer = Arc::new(Summarizer::gemini(
        &config.api_key,
        config.summary_timeout,
        config.max_prompt_chars,
    )?);
    let engine = DeliveryEngine::new(&config.sender, &config.recipient)?;
    let transports = default_transports(
        &config.smtp_host,
        &config.sender,
        &config.smtp_pass,
        config.smtp_timeout,
    )?;
    run_with(config, fetcher, summarizer, &engine, &transports).await
}

/// Run one pipeline pass with explicit collaborators (the test seam).
pub async fn run_with(
    config: &AppConfig,
    fetcher: Arc<dyn DocumentFetcher>,
    summarizer: Arc<Summarizer>,
    engine: &DeliveryEngine,
    transports: &[Box<dyn MailTransport>],
) -> Result<RunOutcome> {
    let cutoff = Utc::now().timestamp() - config.recency_window.as_secs() as i64;

    // Stage 1: fetch + extract + local rules, one worker per source.
    let mut workers = JoinSet::new();
    for (idx, source) in config.sources.iter().cloned().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let allow = config.allow.clone();
        let deny = config.deny.clone();
        workers.spawn(async move { (idx, fetch_stage(fetcher, source, allow, deny, cutoff).await) });
    }

    let mut outcomes: Vec<Option<SourceOutcome>> =
        (0..config.sources.len()).map(|_| None).collect();
    // Cooperative run budget, shared by every worker stage: past it,
    // remaining workers are aborted and whatever already finished still ships.
    let budget = config
        .run_deadline
        .unwrap_or(Duration::from_secs(24 * 3600));
    let budget_ends = tokio::time::Instant::now() + budget;
    let deadline = tokio::time::sleep_until(budget_ends);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::warn!("run budget exceeded, cancelling remaining sources");
                workers.abort_all();
                break;
            }
            next = workers.join_next() => match next {
                Some(Ok((idx, outcome))) => outcomes[idx] = Some(outcome),
                Some(Err(e)) => tracing::warn!(error = ?e, "source worker aborted"),
                None => break,
            }
        }
    }

    // Stage 2: cross-source dedup, walked in registry order so dedup stays
    // deterministic regardless of worker interleaving.
    let mut seen = HashSet::new();
    let mut per_source: Vec<Option<Vec<FilteredItem>>> = Vec::with_capacity(outcomes.len());
    for (idx, outcome) in outcomes.into_iter().enumerate() {
        let entry = match outcome {
            Some(SourceOutcome::Fetched(items)) => {
                let mut items = filter::dedup_across(items, &mut seen);
                items.truncate(config.max_items_per_source);
                Some(items)
            }
            Some(SourceOutcome::Failed) => None,
            None => {
                tracing::warn!(
                    source = %config.sources[idx].name,
                    "source cancelled before completion"
                );
                None
            }
        };
        per_source.push(entry);
    }

    // Stage 3: summarize surviving batches, again one worker per source.
    let mut summaries = JoinSet::new();
    for (idx, entry) in per_source.iter().enumerate() {
        let Some(items) = entry else { continue };
        if items.is_empty() {
            continue;
        }
        let summarizer = Arc::clone(&summarizer);
        let name = config.sources[idx].name.clone();
        let text = digest_input(items);
        let titles: Vec<String> = items.iter().map(|i| i.title.clone()).collect();
        summaries.spawn(async move {
            let body = match summarizer.summarize(&text, &name).await {
                Ok(s) if !summarize::is_empty_digest(&s) => s,
                Ok(_) => summarize::NO_UPDATES_SENTINEL.to_string(),
                Err(e) => {
                    tracing::warn!(
                        source = %name,
                        error = %e,
                        "summarization exhausted, degrading to raw titles"
                    );
                    degraded_body(&titles)
                }
            };
            (idx, body)
        });
    }
    // Summary workers run under the same run budget; a cancelled worker
    // leaves no body behind, so its section degrades to raw titles below.
    let mut bodies: HashMap<usize, String> = HashMap::new();
    let deadline = tokio::time::sleep_until(budget_ends);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::warn!("run budget exceeded, cancelling remaining summaries");
                summaries.abort_all();
                break;
            }
            next = summaries.join_next() => match next {
                Some(Ok((idx, body))) => {
                    bodies.insert(idx, body);
                }
                Some(Err(e)) => tracing::warn!(error = ?e, "summary worker aborted"),
                None => break,
            }
        }
    }

    // Stage 4: sections in registry order. Fetch-failed sources are skipped,
    // fetched-but-empty sources keep an explicit placeholder section.
    let mut sections = Vec::new();
    for (idx, entry) in per_source.into_iter().enumerate() {
        let Some(items) = entry else { continue };
        let name = &config.sources[idx].name;
        let body = if items.is_empty() {
            summarize::NO_UPDATES_SENTINEL.to_string()
        } else {
            bodies.remove(&idx).unwrap_or_else(|| {
                let titles: Vec<String> = items.iter().map(|i| i.title.clone()).collect();
                degraded_body(&titles)
            })
        };
        sections.push(Section::new(name, &body));
    }

    let report = report::assemble(sections, Utc::now());
    let html = report::render_html(&report);
    let delivery = engine.deliver(&config.subject, &html, transports).await;

    Ok(RunOutcome { report, delivery })
}

async fn fetch_stage(
    fetcher: Arc<dyn DocumentFetcher>,
    source: SourceDescriptor,
    allow: Vec<String>,
    deny: Vec<String>,
    cutoff: i64,
) -> SourceOutcome {
    match fetcher.fetch(&source).await {
        Ok(doc) => {
            let items = extract::extract(&doc);
            tracing::debug!(source = %source.name, candidates = items.len(), "extracted");
            SourceOutcome::Fetched(filter::filter_items(items, &allow, &deny, cutoff))
        }
        Err(e) => {
            tracing::warn!(source = %source.name, error = %e, "source fetch failed, skipping");
            SourceOutcome::Failed
        }
    }
}

/// The text handed to the summarizer: titles with their summaries, one blank
/// line between items.
fn digest_input(items: &[FilteredItem]) -> String {
    items
        .iter()
        .map(|i| match &i.summary {
            Some(s) => format!("{}\n{}", i.title, s),
            None => i.title.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Backup representation when every summary route failed: the raw titles.
fn degraded_body(titles: &[String]) -> String {
    titles
        .iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::CandidateItem;

    fn item(title: &str, summary: Option<&str>) -> CandidateItem {
        CandidateItem {
            title: title.into(),
            summary: summary.map(Into::into),
            link: None,
            published_at: None,
        }
    }

    #[test]
    fn digest_input_keeps_title_and_summary() {
        let items = vec![item("A", Some("detail")), item("B", None)];
        assert_eq!(digest_input(&items), "A\ndetail\n\nB");
    }

    #[test]
    fn degraded_body_lists_titles() {
        let titles = vec!["One".to_string(), "Two".to_string()];
        assert_eq!(degraded_body(&titles), "- One\n- Two");
    }
}
