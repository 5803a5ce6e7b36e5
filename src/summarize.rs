// src/summarize.rs
// Condenses per-source text through a remote generateContent endpoint.
// Fallback is an ordered list of routes with a uniform `attempt` interface;
// the runner stops at the first usable answer. No two routes share
// model + API version, so a deterministic failure is never retried as-is.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Character budget applied to the input before dispatch, to stay inside the
/// endpoint's request-size limits. Matches the 15k cap the product always ran with.
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 15_000;

/// Fixed reply the prompt demands when the text holds no real industry news.
pub const NO_UPDATES_SENTINEL: &str = "今日暂无重大更新";

/// Replies shorter than this are treated as no contribution.
const MIN_DIGEST_CHARS: usize = 20;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("request to {route} failed: {detail}")]
    Request { route: String, detail: String },
    #[error("{route} answered with status {code}")]
    BadStatus { route: String, code: u16 },
    #[error("{route} returned a malformed or empty body")]
    Malformed { route: String },
    #[error("all summary routes exhausted, last error: {last}")]
    Exhausted {
        #[source]
        last: Box<SummaryError>,
    },
    #[error("no summary routes configured")]
    NoRoutes,
}

/// One step of the fallback chain.
#[async_trait]
pub trait SummaryBackend: Send + Sync {
    async fn attempt(&self, prompt: &str) -> Result<String, SummaryError>;
    fn label(&self) -> String;
}

// ---------------------------------------------------------------------------
// Gemini-style route
// ---------------------------------------------------------------------------

pub struct GeminiRoute {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_version: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<ReqContent<'a>>,
}
#[derive(Serialize)]
struct ReqContent<'a> {
    parts: Vec<ReqPart<'a>>,
}
#[derive(Serialize)]
struct ReqPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<RespCandidate>,
}
#[derive(Deserialize)]
struct RespCandidate {
    content: RespContent,
}
#[derive(Deserialize)]
struct RespContent {
    #[serde(default)]
    parts: Vec<RespPart>,
}
#[derive(Deserialize)]
struct RespPart {
    #[serde(default)]
    text: String,
}

impl GeminiRoute {
    pub fn new(http: reqwest::Client, api_key: &str, model: &str, api_version: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            api_version: api_version.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/{}/models/{}:generateContent?key={}",
            self.api_version, self.model, self.api_key
        )
    }
}

#[async_trait]
impl SummaryBackend for GeminiRoute {
    async fn attempt(&self, prompt: &str) -> Result<String, SummaryError> {
        let req = GenerateRequest {
            contents: vec![ReqContent {
                parts: vec![ReqPart { text: prompt }],
            }],
        };

        let resp = self
            .http
            .post(self.endpoint())
            .json(&req)
            .send()
            .await
            .map_err(|e| SummaryError::Request {
                route: self.label(),
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SummaryError::BadStatus {
                route: self.label(),
                code: status.as_u16(),
            });
        }

        let body: GenerateResponse = resp.json().await.map_err(|_| SummaryError::Malformed {
            route: self.label(),
        })?;
        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(SummaryError::Malformed {
                route: self.label(),
            });
        }
        Ok(text)
    }

    fn label(&self) -> String {
        format!("{}/{}", self.api_version, self.model)
    }
}

// ---------------------------------------------------------------------------
// Fallback runner
// ---------------------------------------------------------------------------

pub struct Summarizer {
    routes: Vec<Box<dyn SummaryBackend>>,
    max_prompt_chars: usize,
}

impl Summarizer {
    /// Production chain: preferred model on the primary API version, the same
    /// model on the alternate version, then a lower-capability model.
    pub fn gemini(api_key: &str, timeout: Duration, max_prompt_chars: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4).min(timeout))
            .timeout(timeout)
            .build()
            .context("build summarizer http client")?;
        let routes: Vec<Box<dyn SummaryBackend>> = vec![
            Box::new(GeminiRoute::new(http.clone(), api_key, "gemini-1.5-flash", "v1beta")),
            Box::new(GeminiRoute::new(http.clone(), api_key, "gemini-1.5-flash", "v1")),
            Box::new(GeminiRoute::new(http, api_key, "gemini-1.5-flash-8b", "v1beta")),
        ];
        Ok(Self::with_routes(routes, max_prompt_chars))
    }

    /// Seam for tests and alternative providers.
    pub fn with_routes(routes: Vec<Box<dyn SummaryBackend>>, max_prompt_chars: usize) -> Self {
        Self {
            routes,
            max_prompt_chars,
        }
    }

    pub async fn summarize(&self, text: &str, source_name: &str) -> Result<String, SummaryError> {
        if self.routes.is_empty() {
            return Err(SummaryError::NoRoutes);
        }

        // Truncation happens here, never inside a route.
        let prompt = build_prompt(&truncate_chars(text, self.max_prompt_chars), source_name);

        let mut last: Option<SummaryError> = None;
        for route in &self.routes {
            match route.attempt(&prompt).await {
                Ok(answer) => {
                    let answer = answer.trim().to_string();
                    if !answer.is_empty() {
                        return Ok(answer);
                    }
                    last = Some(SummaryError::Malformed {
                        route: route.label(),
                    });
                }
                Err(e) => {
                    tracing::warn!(route = %route.label(), error = %e, "summary route failed");
                    last = Some(e);
                }
            }
        }
        Err(SummaryError::Exhausted {
            // routes is non-empty, so at least one outcome was recorded
            last: Box::new(last.unwrap_or(SummaryError::NoRoutes)),
        })
    }
}

/// A digest that is the sentinel (or shorter than the floor) counts as no
/// contribution from the source.
pub fn is_empty_digest(s: &str) -> bool {
    s.contains(NO_UPDATES_SENTINEL) || s.trim().chars().count() < MIN_DIGEST_CHARS
}

fn build_prompt(text: &str, source_name: &str) -> String {
    format!(
        "You are a mobile-games industry analyst. Below is the latest raw text \
         captured from the site \"{source_name}\".\n\
         \n\
         Analysis rules:\n\
         - Ignore all \"Cookie Policy\", \"Privacy\", \"Sign up\" boilerplate.\n\
         - Look for industry headlines carrying game names, company moves, or market data.\n\
         - List the key points in Chinese, even if only one headline qualifies.\n\
         - Never return any HTML tags.\n\
         - If there is truly nothing new, reply exactly \"{NO_UPDATES_SENTINEL}\".\n\
         \n\
         Text to process:\n{text}"
    )
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "游戏新闻每日更新";
        assert_eq!(truncate_chars(s, 4), "游戏新闻");
        assert_eq!(truncate_chars(s, 100), s);
    }

    #[test]
    fn prompt_embeds_source_and_sentinel() {
        let p = build_prompt("some text", "GameLook");
        assert!(p.contains("GameLook"));
        assert!(p.contains(NO_UPDATES_SENTINEL));
        assert!(p.contains("some text"));
    }

    #[test]
    fn sentinel_and_short_replies_are_empty_digests() {
        assert!(is_empty_digest("今日暂无重大更新"));
        assert!(is_empty_digest("ok"));
        assert!(!is_empty_digest(
            "米哈游宣布新项目，腾讯发布季度手游营收数据，行业并购持续活跃。"
        ));
    }
}
