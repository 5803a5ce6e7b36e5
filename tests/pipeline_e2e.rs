// tests/pipeline_e2e.rs
// Full pipeline runs against scripted collaborators: canned feed bodies, a
// capturing summary route, and an in-memory transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Message;
use news_radar::config::AppConfig;
use news_radar::deliver::{DeliveryEngine, DeliveryError, MailTransport};
use news_radar::fetch::{DocumentFetcher, FetchError, RawDocument};
use news_radar::pipeline;
use news_radar::sources::{SourceDescriptor, SourceKind};
use news_radar::summarize::{SummaryBackend, SummaryError, Summarizer};

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

enum Script {
    Body(String),
    NetworkFailure,
}

struct ScriptedFetcher {
    scripts: HashMap<&'static str, Script>,
}

#[async_trait]
impl DocumentFetcher for ScriptedFetcher {
    async fn fetch(&self, source: &SourceDescriptor) -> Result<RawDocument, FetchError> {
        match self.scripts.get(source.name.as_str()) {
            Some(Script::Body(text)) => Ok(RawDocument {
                source: source.clone(),
                status: 200,
                text: text.clone(),
            }),
            Some(Script::NetworkFailure) => Err(FetchError::Network {
                source_name: source.name.clone(),
                detail: "dns failure".to_string(),
            }),
            None => Err(FetchError::BadStatus {
                source_name: source.name.clone(),
                code: 404,
            }),
        }
    }
}

/// Always answers with a fixed digest and keeps every prompt it saw.
struct CaptureRoute {
    prompts: Arc<Mutex<Vec<String>>>,
    reply: &'static str,
}

#[async_trait]
impl SummaryBackend for CaptureRoute {
    async fn attempt(&self, prompt: &str) -> Result<String, SummaryError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.to_string())
    }

    fn label(&self) -> String {
        "capture".to_string()
    }
}

struct RecordingTransport {
    sent: Arc<Mutex<Vec<Message>>>,
}

#[async_trait]
impl MailTransport for RecordingTransport {
    fn label(&self) -> String {
        "recording".to_string()
    }

    async fn send(&self, message: Message) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test wiring
// ---------------------------------------------------------------------------

const DIGEST_REPLY: &str = "本周行业动态：厂商发布新作，市场表现活跃，详情见正文。";

fn feed_source(name: &str) -> SourceDescriptor {
    SourceDescriptor::new(name, "https://example.test/rss", SourceKind::Feed)
}

fn test_config(sources: Vec<SourceDescriptor>, allow: Vec<&str>) -> AppConfig {
    AppConfig {
        sources,
        allow: allow.into_iter().map(str::to_string).collect(),
        deny: vec![],
        recency_window: Duration::from_secs(7 * 86_400),
        fetch_timeout: Duration::from_secs(20),
        summary_timeout: Duration::from_secs(30),
        smtp_timeout: Duration::from_secs(25),
        run_deadline: None,
        max_items_per_source: 3,
        max_prompt_chars: 15_000,
        subject: "🎮 游戏资讯周报".to_string(),
        recipient: "reader@example.com".to_string(),
        smtp_host: "smtp.example.com".to_string(),
        sender: "radar@example.com".to_string(),
        smtp_pass: "unused".to_string(),
        api_key: "unused".to_string(),
    }
}

struct Harness {
    prompts: Arc<Mutex<Vec<String>>>,
    sent: Arc<Mutex<Vec<Message>>>,
    summarizer: Arc<Summarizer>,
    engine: DeliveryEngine,
    transports: Vec<Box<dyn MailTransport>>,
}

fn harness() -> Harness {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let sent = Arc::new(Mutex::new(Vec::new()));
    let summarizer = Arc::new(Summarizer::with_routes(
        vec![Box::new(CaptureRoute {
            prompts: Arc::clone(&prompts),
            reply: DIGEST_REPLY,
        })],
        15_000,
    ));
    let engine = DeliveryEngine::new("radar@example.com", "reader@example.com").unwrap();
    let transports: Vec<Box<dyn MailTransport>> = vec![Box::new(RecordingTransport {
        sent: Arc::clone(&sent),
    })];
    Harness {
        prompts,
        sent,
        summarizer,
        engine,
        transports,
    }
}

fn rss(items: &[(&str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(title, desc)| {
            format!("<item><title>{title}</title><description>{desc}</description></item>")
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>t</title>{body}</channel></rss>"#
    )
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_source_does_not_block_its_siblings() {
    let config = test_config(vec![feed_source("Broken"), feed_source("Healthy")], vec![]);
    let fetcher = Arc::new(ScriptedFetcher {
        scripts: HashMap::from([
            ("Broken", Script::NetworkFailure),
            ("Healthy", Script::Body(rss(&[("腾讯季度财报公布手游增长", "季度数据")]))),
        ]),
    });

    let h = harness();
    let run = pipeline::run_with(&config, fetcher, Arc::clone(&h.summarizer), &h.engine, &h.transports)
        .await
        .unwrap();

    let names: Vec<_> = run
        .report
        .sections
        .iter()
        .map(|s| s.source_name.as_str())
        .collect();
    assert_eq!(names, vec!["Healthy"]);
    assert!(run.delivery.success);
    assert_eq!(h.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_title_surfaces_once_across_sources() {
    // Source 1: three entries; two pass the allow-list and are duplicate
    // titles of each other and of source 2's single matching entry.
    let feed1 = rss(&[
        ("Tencent 发布新手游", "产品动态"),
        ("TENCENT 发布新手游", "重复报道"),
        ("Helsinki weather outlook", "unrelated"),
    ]);
    let feed2 = rss(&[("tencent 发布新手游", "第二来源的报道")]);

    let config = test_config(
        vec![feed_source("GameLook"), feed_source("机核 GCores")],
        vec!["手游"],
    );
    let fetcher = Arc::new(ScriptedFetcher {
        scripts: HashMap::from([
            ("GameLook", Script::Body(feed1)),
            ("机核 GCores", Script::Body(feed2)),
        ]),
    });

    let h = harness();
    let run = pipeline::run_with(&config, fetcher, Arc::clone(&h.summarizer), &h.engine, &h.transports)
        .await
        .unwrap();

    // One section per fetched source, registry order, second is a placeholder.
    assert_eq!(run.report.sections.len(), 2);
    assert_eq!(run.report.sections[0].source_name, "GameLook");
    assert_eq!(run.report.sections[0].body, DIGEST_REPLY);
    assert_eq!(run.report.sections[1].source_name, "机核 GCores");
    assert_eq!(
        run.report.sections[1].body,
        news_radar::summarize::NO_UPDATES_SENTINEL
    );

    // Exactly one unique filtered item reached the summarizer.
    let prompts = h.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].matches("发布新手游").count(), 1);
    assert!(run.delivery.success);
}

#[tokio::test]
async fn zero_sources_still_deliver_a_placeholder_report() {
    let config = test_config(vec![], vec![]);
    let fetcher = Arc::new(ScriptedFetcher {
        scripts: HashMap::new(),
    });

    let h = harness();
    let run = pipeline::run_with(&config, fetcher, Arc::clone(&h.summarizer), &h.engine, &h.transports)
        .await
        .unwrap();

    assert_eq!(run.report.sections.len(), 1);
    assert_eq!(run.report.sections[0].source_name, "系统通知");
    assert!(run.delivery.success);
    assert!(h.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn run_budget_cancels_stalled_summaries() {
    struct Stalled;
    #[async_trait]
    impl SummaryBackend for Stalled {
        async fn attempt(&self, _prompt: &str) -> Result<String, SummaryError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("never reached".to_string())
        }
        fn label(&self) -> String {
            "stalled".to_string()
        }
    }

    let mut config = test_config(vec![feed_source("GameLook")], vec![]);
    config.run_deadline = Some(Duration::from_millis(200));
    let fetcher = Arc::new(ScriptedFetcher {
        scripts: HashMap::from([("GameLook", Script::Body(rss(&[("米哈游公布新项目", "项目信息")])))]),
    });

    let h = harness();
    let summarizer = Arc::new(Summarizer::with_routes(vec![Box::new(Stalled)], 15_000));
    let started = std::time::Instant::now();
    let run = pipeline::run_with(&config, fetcher, summarizer, &h.engine, &h.transports)
        .await
        .unwrap();

    // The budget bounds the whole run, not only the fetch workers, and the
    // cancelled summary still ships its titles.
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(run.report.sections.len(), 1);
    assert_eq!(run.report.sections[0].body, "- 米哈游公布新项目");
    assert!(run.delivery.success);
}

#[tokio::test]
async fn exhausted_summary_chain_degrades_to_titles() {
    struct AlwaysDown;
    #[async_trait]
    impl SummaryBackend for AlwaysDown {
        async fn attempt(&self, _prompt: &str) -> Result<String, SummaryError> {
            Err(SummaryError::BadStatus {
                route: "down".to_string(),
                code: 500,
            })
        }
        fn label(&self) -> String {
            "down".to_string()
        }
    }

    let config = test_config(vec![feed_source("GameLook")], vec![]);
    let fetcher = Arc::new(ScriptedFetcher {
        scripts: HashMap::from([("GameLook", Script::Body(rss(&[("米哈游公布新项目", "项目信息")])))]),
    });

    let h = harness();
    let summarizer = Arc::new(Summarizer::with_routes(vec![Box::new(AlwaysDown)], 15_000));
    let run = pipeline::run_with(&config, fetcher, summarizer, &h.engine, &h.transports)
        .await
        .unwrap();

    // Original titles survive as the backup body, not silent loss.
    assert_eq!(run.report.sections.len(), 1);
    assert_eq!(run.report.sections[0].body, "- 米哈游公布新项目");
    assert!(run.delivery.success);
}
