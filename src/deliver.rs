// src/deliver.rs
// SMTP delivery with transport fallback: implicit TLS on 465, STARTTLS on
// 587, plain on 25, in that order. Every attempt is recorded, not just the
// final outcome. Exhausting all transports ends the run undelivered.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SmtpProtocol {
    /// TLS from the first byte (SMTPS, port 465).
    ImplicitTls,
    /// Plaintext upgraded via STARTTLS (submission port 587).
    StartTls,
    /// Unencrypted legacy transport (port 25). Last resort only.
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransportConfig {
    pub protocol: SmtpProtocol,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("building message: {0}")]
    Message(String),
    #[error("smtp failure on {transport}: {detail}")]
    Smtp { transport: String, detail: String },
}

#[derive(Debug)]
pub struct AttemptOutcome {
    pub transport: String,
    pub outcome: Result<(), DeliveryError>,
}

impl AttemptOutcome {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug)]
pub struct DeliveryResult {
    pub success: bool,
    pub attempts: Vec<AttemptOutcome>,
}

/// One concrete way to hand a message off. Tests substitute stubs.
#[async_trait]
pub trait MailTransport: Send + Sync {
    fn label(&self) -> String;
    async fn send(&self, message: Message) -> Result<(), DeliveryError>;
}

pub struct SmtpMailer {
    label: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn build(
        cfg: &TransportConfig,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self> {
        let builder = match cfg.protocol {
            SmtpProtocol::ImplicitTls => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
                    .with_context(|| format!("smtps relay for {}", cfg.host))?
            }
            SmtpProtocol::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
                    .with_context(|| format!("starttls relay for {}", cfg.host))?
            }
            SmtpProtocol::Plain => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host)
            }
        };
        let mailer = builder
            .port(cfg.port)
            .credentials(credentials)
            .timeout(Some(timeout))
            .build();
        Ok(Self {
            label: format!("{:?} {}:{}", cfg.protocol, cfg.host, cfg.port),
            mailer,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn send(&self, message: Message) -> Result<(), DeliveryError> {
        self.mailer
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| DeliveryError::Smtp {
                transport: self.label.clone(),
                detail: e.to_string(),
            })
    }
}

/// The default fallback ladder for one SMTP account.
pub fn default_transports(
    host: &str,
    user: &str,
    pass: &str,
    timeout: Duration,
) -> Result<Vec<Box<dyn MailTransport>>> {
    let ladder = [
        (SmtpProtocol::ImplicitTls, 465u16),
        (SmtpProtocol::StartTls, 587),
        (SmtpProtocol::Plain, 25),
    ];
    let mut out: Vec<Box<dyn MailTransport>> = Vec::with_capacity(ladder.len());
    for (protocol, port) in ladder {
        let cfg = TransportConfig {
            protocol,
            host: host.to_string(),
            port,
        };
        let credentials = Credentials::new(user.to_string(), pass.to_string());
        out.push(Box::new(SmtpMailer::build(&cfg, credentials, timeout)?));
    }
    Ok(out)
}

pub struct DeliveryEngine {
    from: Mailbox,
    to: Mailbox,
}

impl DeliveryEngine {
    pub fn new(from: &str, to: &str) -> Result<Self> {
        Ok(Self {
            from: from.parse().context("sender address")?,
            to: to.parse().context("recipient address")?,
        })
    }

    fn message(&self, subject: &str, html_body: &str) -> Result<Message, DeliveryError> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| DeliveryError::Message(e.to_string()))
    }

    /// Try transports in priority order, stop at the first success.
    pub async fn deliver(
        &self,
        subject: &str,
        html_body: &str,
        transports: &[Box<dyn MailTransport>],
    ) -> DeliveryResult {
        let mut attempts = Vec::with_capacity(transports.len());
        for transport in transports {
            let label = transport.label();
            let message = match self.message(subject, html_body) {
                Ok(m) => m,
                Err(e) => {
                    attempts.push(AttemptOutcome {
                        transport: label,
                        outcome: Err(e),
                    });
                    continue;
                }
            };
            match transport.send(message).await {
                Ok(()) => {
                    tracing::info!(transport = %label, "report delivered");
                    attempts.push(AttemptOutcome {
                        transport: label,
                        outcome: Ok(()),
                    });
                    return DeliveryResult {
                        success: true,
                        attempts,
                    };
                }
                Err(e) => {
                    tracing::warn!(transport = %label, error = %e, "transport failed, trying next");
                    attempts.push(AttemptOutcome {
                        transport: label,
                        outcome: Err(e),
                    });
                }
            }
        }
        tracing::error!("all transports failed; report stays undelivered this run");
        DeliveryResult {
            success: false,
            attempts,
        }
    }
}
