// src/report.rs
// Pure assembly of per-source sections into the final report, plus the HTML
// rendering step. No I/O, no business logic in the renderer.

use chrono::{DateTime, Utc};

/// Placeholder section used when a whole run produced nothing.
pub const PLACEHOLDER_SOURCE: &str = "系统通知";
pub const PLACEHOLDER_BODY: &str = "今日暂无新资讯抓取。";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub source_name: String,
    /// Already-summarized text (or a degraded title list / placeholder).
    pub body: String,
}

impl Section {
    pub fn new(source_name: &str, body: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub sections: Vec<Section>,
    pub generated_at: DateTime<Utc>,
}

/// Concatenate sections in input order. A report is never empty: zero input
/// sections become one explicit placeholder so delivery always has a body.
pub fn assemble(sections: Vec<Section>, generated_at: DateTime<Utc>) -> Report {
    let sections = if sections.is_empty() {
        vec![Section::new(PLACEHOLDER_SOURCE, PLACEHOLDER_BODY)]
    } else {
        sections
    };
    Report {
        sections,
        generated_at,
    }
}

/// Render the report as a `text/html` mail body. Section bodies come from the
/// summarizer (instructed to emit no tags) or from our own title lists, so
/// everything is escaped and newlines become `<br>`.
pub fn render_html(report: &Report) -> String {
    let mut out = String::new();
    for section in &report.sections {
        let title = html_escape::encode_text(&section.source_name);
        let body = html_escape::encode_text(&section.body)
            .replace('\n', "<br>");
        out.push_str(&format!("<h3>{title}</h3><p>{body}</p><br><hr>"));
    }
    out.push_str(&format!(
        "<p style=\"color:#888;font-size:12px\">生成时间 {} UTC</p>",
        report.generated_at.format("%Y-%m-%d %H:%M")
    ));
    out
}
