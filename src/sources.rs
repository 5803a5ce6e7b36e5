// src/sources.rs
// Static registry of external sources. Built once at startup, read-only after.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A structured feed (RSS).
    Feed,
    /// A raw HTML page with no guaranteed structure.
    Page,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
}

impl SourceDescriptor {
    pub fn new(name: &str, url: &str, kind: SourceKind) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            kind,
        }
    }
}

/// Compiled-in source list, used when no `config/radar.toml` overrides it.
pub fn default_registry() -> Vec<SourceDescriptor> {
    vec![
        SourceDescriptor::new("机核 GCores", "https://www.gcores.com/rss", SourceKind::Feed),
        SourceDescriptor::new(
            "GameLook",
            "https://www.gamelook.com.cn/feed",
            SourceKind::Feed,
        ),
        SourceDescriptor::new(
            "PocketGamer.biz",
            "https://www.pocketgamer.biz/news/",
            SourceKind::Page,
        ),
    ]
}
