// src/config.rs
// One immutable configuration value built at process start and passed
// explicitly into the pipeline. Secrets come from the environment, the rest
// from `config/radar.toml` (env-overridable path) with compiled-in defaults.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use serde::Deserialize;

use crate::sources::{default_registry, SourceDescriptor};

pub const ENV_CONFIG_PATH: &str = "RADAR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/radar.toml";

const ENV_API_KEY: &str = "GEMINI_API_KEY";
const ENV_SMTP_USER: &str = "EMAIL_USER";
const ENV_SMTP_PASS: &str = "EMAIL_PASS";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sources: Vec<SourceDescriptor>,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub recency_window: Duration,
    pub fetch_timeout: Duration,
    pub summary_timeout: Duration,
    pub smtp_timeout: Duration,
    /// Optional whole-run budget; in-flight sources are cancelled past it.
    pub run_deadline: Option<Duration>,
    pub max_items_per_source: usize,
    pub max_prompt_chars: usize,
    pub subject: String,
    pub recipient: String,
    pub smtp_host: String,
    pub sender: String,
    pub smtp_pass: String,
    pub api_key: String,
}

/// On-disk shape; every field optional so a partial file only overrides what
/// it names.
#[derive(Debug, Default, Deserialize)]
struct RadarFile {
    sources: Option<Vec<SourceDescriptor>>,
    allow: Option<Vec<String>>,
    deny: Option<Vec<String>>,
    recency_days: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    summary_timeout_secs: Option<u64>,
    smtp_timeout_secs: Option<u64>,
    run_deadline_secs: Option<u64>,
    max_items_per_source: Option<usize>,
    max_prompt_chars: Option<usize>,
    subject: Option<String>,
    recipient: Option<String>,
    smtp_host: Option<String>,
}

impl AppConfig {
    /// Load file config + env secrets. Call once at startup.
    pub fn load() -> Result<Self> {
        let file = load_file_default()?;
        let secrets = EnvSecrets::from_env()?;
        Self::from_parts(file, secrets)
    }

    fn from_parts(file: RadarFile, secrets: EnvSecrets) -> Result<Self> {
        let fetch_timeout_secs = file.fetch_timeout_secs.unwrap_or(20);
        ensure!(fetch_timeout_secs > 0, "fetch_timeout_secs must be positive");
        let summary_timeout_secs = file.summary_timeout_secs.unwrap_or(30);
        ensure!(
            summary_timeout_secs > 0,
            "summary_timeout_secs must be positive"
        );
        let smtp_timeout_secs = file.smtp_timeout_secs.unwrap_or(25);
        ensure!(smtp_timeout_secs > 0, "smtp_timeout_secs must be positive");

        // An empty source list is allowed; the run then ships the
        // placeholder report.
        let sources = file.sources.unwrap_or_else(default_registry);

        Ok(Self {
            sources,
            allow: clean_terms(file.allow.unwrap_or_default()),
            deny: clean_terms(file.deny.unwrap_or_else(default_deny)),
            recency_window: Duration::from_secs(file.recency_days.unwrap_or(7) * 86_400),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            summary_timeout: Duration::from_secs(summary_timeout_secs),
            smtp_timeout: Duration::from_secs(smtp_timeout_secs),
            run_deadline: file.run_deadline_secs.map(Duration::from_secs),
            max_items_per_source: file.max_items_per_source.unwrap_or(3),
            max_prompt_chars: file
                .max_prompt_chars
                .unwrap_or(crate::summarize::DEFAULT_MAX_PROMPT_CHARS),
            subject: file
                .subject
                .unwrap_or_else(|| "🎮 游戏资讯周报".to_string()),
            recipient: file
                .recipient
                .unwrap_or_else(|| "249869251@qq.com".to_string()),
            smtp_host: file.smtp_host.unwrap_or_else(|| "smtp.gmail.com".to_string()),
            sender: secrets.sender,
            smtp_pass: secrets.smtp_pass,
            api_key: secrets.api_key,
        })
    }
}

struct EnvSecrets {
    sender: String,
    smtp_pass: String,
    api_key: String,
}

impl EnvSecrets {
    fn from_env() -> Result<Self> {
        Ok(Self {
            sender: require_env(ENV_SMTP_USER)?,
            // Some secret stores pad the value; the SMTP server will not.
            smtp_pass: require_env(ENV_SMTP_PASS)?.trim().to_string(),
            api_key: require_env(ENV_API_KEY)?,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{name} missing from environment"))
}

/// Noise terms the original product always excluded.
fn default_deny() -> Vec<String> {
    vec![
        "cookie policy".to_string(),
        "privacy".to_string(),
        "sign up".to_string(),
    ]
}

fn clean_terms(terms: Vec<String>) -> Vec<String> {
    let mut set = BTreeSet::new();
    for t in terms {
        let t = t.trim();
        if !t.is_empty() {
            set.insert(t.to_string());
        }
    }
    set.into_iter().collect()
}

/// Resolve the config file: $RADAR_CONFIG_PATH, then `config/radar.toml`,
/// then built-in defaults when neither exists.
fn load_file_default() -> Result<RadarFile> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        ensure!(
            pb.exists(),
            "{ENV_CONFIG_PATH} points to a non-existent path"
        );
        return load_file_from(&pb);
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default.exists() {
        return load_file_from(&default);
    }
    Ok(RadarFile::default())
}

fn load_file_from(path: &Path) -> Result<RadarFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}
