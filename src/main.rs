//! news-radar: binary entrypoint.
//!
//! One bounded-lifetime batch run per invocation: fetch, filter, summarize,
//! deliver, exit. The external scheduler (cron/CI) decides when we run.
//! The process exits 0 whether or not anything was delivered; diagnostics go
//! to stdout for the scheduler to collect.

use news_radar::{config::AppConfig, pipeline};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("news_radar=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env in local/dev; no-op when the scheduler injects real env vars.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = ?e, "configuration error, nothing to run");
            return;
        }
    };

    match pipeline::run(&config).await {
        Ok(run) => {
            tracing::info!(
                sections = run.report.sections.len(),
                delivered = run.delivery.success,
                attempts = run.delivery.attempts.len(),
                "run finished"
            );
        }
        Err(e) => {
            tracing::error!(error = ?e, "run failed before delivery");
        }
    }
}
