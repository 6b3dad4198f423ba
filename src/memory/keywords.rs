//! Keyword extraction over chat history.
//!
//! Scans user turns newest first. For each category the most recent
//! [`RECENT_WINDOW`] user turns are tried first and the first match wins;
//! older history is only consulted when that window has nothing for the
//! category. A later stated preference therefore always overrides an
//! earlier one.

use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::agent::swatch::find_color;
use crate::core::text::fold;
use crate::core::{ChatTurn, Filters, builtin_regex};

/// Number of most recent user turns scanned before falling back.
pub const RECENT_WINDOW: usize = 3;

static ROOM: LazyLock<Regex> = LazyLock::new(|| {
    builtin_regex(
        r"\b(sala de jantar|sala de estar|sala|quarto|dormitorio|cozinha|banheiro|lavabo|varanda|sacada|fachada|escritorio|area externa|living room|dining room|bedroom|kitchen|bathroom|balcony|office|facade)\b",
    )
});

static STYLE: LazyLock<Regex> = LazyLock::new(|| {
    builtin_regex(
        r"\b(moderno|moderna|minimalista|rustico|rustica|classico|classica|industrial|escandinavo|boho|contemporaneo|tropical|modern|minimalist|rustic|classic|scandinavian|contemporary)\b",
    )
});

static MOOD: LazyLock<Regex> = LazyLock::new(|| {
    builtin_regex(
        r"\b(calmo|calma|tranquilo|aconchegante|alegre|sereno|serena|elegante|vibrante|relaxante|sofisticado|acolhedor|calm|cozy|cheerful|serene|elegant|vibrant|relaxing|warm)\b",
    )
});

static TAGS: LazyLock<Regex> = LazyLock::new(|| {
    builtin_regex(
        r"\b(lavavel|antimofo|anti mofo|sem cheiro|alta cobertura|rende mais|secagem rapida|resistente|washable|anti mold|odorless|low voc|high coverage|quick dry)\b",
    )
});

/// Best-effort keywords inferred from a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keywords {
    /// Room or environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Colour name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Decoration style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Mood.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    /// Free-form product tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Keywords {
    /// Extracts keywords from `turns` (oldest first). Never fails; empty
    /// input yields empty keywords.
    #[must_use]
    pub fn extract(turns: &[ChatTurn]) -> Self {
        let folded: Vec<String> = turns
            .iter()
            .rev()
            .filter(|t| t.is_user())
            .map(|t| fold(&t.content))
            .collect();
        let (recent, older) = folded.split_at(folded.len().min(RECENT_WINDOW));

        let pick = |find: fn(&str) -> Option<String>| scan(recent, older, find);

        Self {
            room: pick(|t| first_match(&ROOM, t).map(|r| canonical_room(&r).to_string())),
            color: pick(|t| find_color(t).map(str::to_string)),
            style: pick(|t| first_match(&STYLE, t)),
            mood: pick(|t| first_match(&MOOD, t)),
            tags: scan(recent, older, |t| {
                let found = dedupe(TAGS.find_iter(t).map(|m| m.as_str()));
                (!found.is_empty()).then_some(found)
            })
            .unwrap_or_default(),
        }
    }

    /// Returns `true` when nothing was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.room.is_none()
            && self.color.is_none()
            && self.style.is_none()
            && self.mood.is_none()
            && self.tags.is_empty()
    }

    /// Returns a copy of `self` with every field set in `newer` replaced.
    #[must_use]
    pub fn overlay(&self, newer: &Self) -> Self {
        Self {
            room: newer.room.clone().or_else(|| self.room.clone()),
            color: newer.color.clone().or_else(|| self.color.clone()),
            style: newer.style.clone().or_else(|| self.style.clone()),
            mood: newer.mood.clone().or_else(|| self.mood.clone()),
            tags: if newer.tags.is_empty() {
                self.tags.clone()
            } else {
                newer.tags.clone()
            },
        }
    }

    /// Catalog filters implied by the keywords.
    #[must_use]
    pub fn to_filters(&self) -> Filters {
        Filters {
            room_type: self.room.clone(),
            color: self.color.clone(),
            ..Filters::default()
        }
    }

    /// One-line summary for prompts, e.g. `room=sala; color=azul`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (key, value) in [
            ("room", self.room.as_deref()),
            ("color", self.color.as_deref()),
            ("style", self.style.as_deref()),
            ("mood", self.mood.as_deref()),
        ] {
            if let Some(value) = value {
                if !out.is_empty() {
                    out.push_str("; ");
                }
                let _ = write!(out, "{key}={value}");
            }
        }
        if !self.tags.is_empty() {
            if !out.is_empty() {
                out.push_str("; ");
            }
            let _ = write!(out, "tags={}", self.tags.join(","));
        }
        if out.is_empty() {
            out.push_str("none");
        }
        out
    }
}

/// First hit in the recent window, else first hit in older turns.
fn scan<T>(recent: &[String], older: &[String], find: impl Fn(&str) -> Option<T>) -> Option<T> {
    recent
        .iter()
        .find_map(|t| find(t.as_str()))
        .or_else(|| older.iter().find_map(|t| find(t.as_str())))
}

fn first_match(re: &Regex, text: &str) -> Option<String> {
    re.find(text).map(|m| m.as_str().to_string())
}

fn canonical_room(room: &str) -> &str {
    match room {
        "sala de estar" | "living room" => "sala",
        "dining room" => "sala de jantar",
        "dormitorio" | "bedroom" => "quarto",
        "kitchen" => "cozinha",
        "bathroom" | "lavabo" => "banheiro",
        "balcony" | "sacada" => "varanda",
        "office" => "escritorio",
        "facade" => "fachada",
        other => other,
    }
}

fn dedupe<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.iter().any(|o| o == item) {
            out.push(item.to_string());
        }
    }
    out
}
