// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod config;
pub mod deliver;
pub mod extract;
pub mod fetch;
pub mod filter;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod sources;
pub mod summarize;

// ---- Re-exports for stable public API ----
pub use crate::config::AppConfig;
pub use crate::deliver::{DeliveryEngine, DeliveryResult, MailTransport};
pub use crate::fetch::{DocumentFetcher, FetchError, RawDocument};
pub use crate::report::{Report, Section};
pub use crate::sources::{SourceDescriptor, SourceKind};
pub use crate::summarize::{SummaryBackend, SummaryError, Summarizer};
