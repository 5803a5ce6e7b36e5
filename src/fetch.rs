// src/fetch.rs
// One bounded-time HTTP GET per source. Failure stays local to the source;
// retry policy (there is none inside the fetcher) belongs to the pipeline.

use std::time::Duration;

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use thiserror::Error;

use crate::sources::SourceDescriptor;

/// Browser-like identity to reduce trivial bot-blocking on page sources.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS/connect/TLS failure or timeout.
    #[error("network error fetching {source_name}: {detail}")]
    Network { source_name: String, detail: String },
    /// The server answered, but outside 200-299.
    #[error("{source_name} answered with status {code}")]
    BadStatus { source_name: String, code: u16 },
}

/// Response body plus final status, consumed by the extractor within the run.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub source: SourceDescriptor,
    pub status: u16,
    pub text: String,
}

/// Seam for the pipeline; tests substitute canned documents or failures.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, source: &SourceDescriptor) -> Result<RawDocument, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// `timeout` bounds the whole request; a zero timeout is a config error.
    pub fn new(timeout: Duration) -> Result<Self> {
        ensure!(!timeout.is_zero(), "fetch timeout must be positive");
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, source: &SourceDescriptor) -> Result<RawDocument, FetchError> {
        let resp = self
            .client
            .get(&source.url)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                source_name: source.name.clone(),
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus {
                source_name: source.name.clone(),
                code: status.as_u16(),
            });
        }

        // reqwest picks the charset from headers/meta, which matters for the
        // GBK-encoded Chinese sources.
        let text = resp.text().await.map_err(|e| FetchError::Network {
            source_name: source.name.clone(),
            detail: e.to_string(),
        })?;

        Ok(RawDocument {
            source: source.clone(),
            status: status.as_u16(),
            text,
        })
    }
}
