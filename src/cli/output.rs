//! Output formatting for CLI commands.
//!
//! Text output is meant for people; JSON output mirrors the serialized
//! library types so it can be piped into `jq`.

use std::fmt::Write;

use serde::Serialize;

use crate::agent::{RouterAction, TurnOutcome};
use crate::recommender::Recommendation;
use crate::tools::{ImageRender, ToolDescriptor};

/// Output format selected with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
    /// One compact JSON document per line.
    Ndjson,
}

impl OutputFormat {
    /// Parses a format name; unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "ndjson" | "jsonl" => Self::Ndjson,
            _ => Self::Text,
        }
    }

    /// Serializes `value` for the JSON formats.
    #[must_use]
    pub fn to_json<T: Serialize>(self, value: &T) -> String {
        let rendered = match self {
            Self::Ndjson => serde_json::to_string(value),
            Self::Text | Self::Json => serde_json::to_string_pretty(value),
        };
        let mut out = rendered.unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
        out.push('\n');
        out
    }
}

/// Formats routed actions.
#[must_use]
pub fn format_actions(actions: &[RouterAction]) -> String {
    if actions.is_empty() {
        return "No action applies.\n".to_string();
    }
    let mut out = String::new();
    for (i, action) in actions.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} ({:.2}) {}",
            i + 1,
            action.tool,
            action.confidence,
            action.rationale
        );
        let _ = writeln!(out, "   args: {}", action.args);
    }
    out
}

/// Formats a fused recommendation.
#[must_use]
pub fn format_recommendation(rec: &Recommendation) -> String {
    let mut out = String::new();
    let _ = write!(out, "Query: {}", rec.query);
    if rec.follow_up {
        out.push_str(" (more results)");
    }
    out.push('\n');
    if !rec.filters.is_empty() {
        let filters: Vec<String> = rec
            .filters
            .entries()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        let _ = writeln!(out, "Filters: {}", filters.join(" "));
    }
    if rec.picks.is_empty() {
        out.push_str("No products found.\n");
        return out;
    }
    for (i, pick) in rec.picks.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}. {:<12} {:<28} {:.4}  {}",
            i + 1,
            pick.id,
            pick.name.as_deref().unwrap_or("-"),
            pick.fusion_score,
            pick.reason
        );
    }
    let sources: Vec<&str> = [&rec.filter_source, &rec.semantic_source]
        .into_iter()
        .flatten()
        .map(|m| m.model.as_str())
        .collect();
    if !sources.is_empty() {
        let _ = writeln!(out, "Sources: {}", sources.join(", "));
    }
    out
}

/// Formats a scene render request.
#[must_use]
pub fn format_image(image: &ImageRender) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Scene: {} {} ({}x{})",
        image.room, image.hex, image.width, image.height
    );
    let _ = writeln!(out, "Prompt: {}", image.render_prompt);
    out
}

/// Formats the outcome of one turn.
#[must_use]
pub fn format_outcome(outcome: &TurnOutcome) -> String {
    if outcome.needs_clarification {
        return "Could you tell me more? For example the room, a colour or a finish.\n"
            .to_string();
    }
    let mut out = String::new();
    if let Some(rec) = &outcome.recommendation {
        out.push_str(&format_recommendation(rec));
    }
    if let Some(image) = &outcome.image {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format_image(image));
    }
    if out.is_empty() {
        out.push_str("Nothing to show for this turn.\n");
    }
    out
}

/// Formats tool descriptors.
#[must_use]
pub fn format_tools(tools: &[ToolDescriptor]) -> String {
    if tools.is_empty() {
        return "No tools available.\n".to_string();
    }
    let mut out = String::new();
    for tool in tools {
        let _ = writeln!(out, "{:<18} {}", tool.name, tool.description);
    }
    out
}
