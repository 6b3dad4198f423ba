//! Structured catalog filters.
//!
//! Every field is optional: `None` means "unknown", never "match nothing".
//! Layers of filters (session-stored, history-inferred, current turn) are
//! combined with [`Filters::overlay`], where later layers win field by field.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Structured product filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    /// Surface the paint is applied to (wall, wood, metal, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_type: Option<String>,
    /// Room or environment (living room, kitchen, facade, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    /// Finish (matte, satin, gloss, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<String>,
    /// Product line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    /// Colour name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Colour as `#rrggbb`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
}

impl Filters {
    /// Returns `true` when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.surface_type.is_none()
            && self.room_type.is_none()
            && self.finish.is_none()
            && self.line.is_none()
            && self.color.is_none()
            && self.hex.is_none()
    }

    /// Returns a copy of `self` with every field set in `newer` replaced.
    #[must_use]
    pub fn overlay(&self, newer: &Self) -> Self {
        Self {
            surface_type: newer.surface_type.clone().or_else(|| self.surface_type.clone()),
            room_type: newer.room_type.clone().or_else(|| self.room_type.clone()),
            finish: newer.finish.clone().or_else(|| self.finish.clone()),
            line: newer.line.clone().or_else(|| self.line.clone()),
            color: newer.color.clone().or_else(|| self.color.clone()),
            hex: newer.hex.clone().or_else(|| self.hex.clone()),
        }
    }

    /// Merges layers in precedence order, lowest first.
    #[must_use]
    pub fn layered<'a>(layers: impl IntoIterator<Item = &'a Self>) -> Self {
        layers
            .into_iter()
            .fold(Self::default(), |acc, layer| acc.overlay(layer))
    }

    /// Iterates over the set fields as `(name, value)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("surfaceType", self.surface_type.as_deref()),
            ("roomType", self.room_type.as_deref()),
            ("finish", self.finish.as_deref()),
            ("line", self.line.as_deref()),
            ("color", self.color.as_deref()),
            ("hex", self.hex.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_color(color: &str) -> Filters {
        Filters {
            color: Some(color.to_string()),
            ..Filters::default()
        }
    }

    #[test]
    fn test_overlay_newer_wins() {
        let stored = Filters {
            finish: Some("fosco".to_string()),
            ..with_color("azul")
        };
        let merged = stored.overlay(&with_color("verde"));
        assert_eq!(merged.color.as_deref(), Some("verde"));
        assert_eq!(merged.finish.as_deref(), Some("fosco"));
    }

    #[test]
    fn test_layered_precedence() {
        let session = with_color("azul");
        let history = Filters {
            room_type: Some("sala".to_string()),
            ..with_color("cinza")
        };
        let current = with_color("verde");
        let merged = Filters::layered([&session, &history, &current]);
        assert_eq!(merged.color.as_deref(), Some("verde"));
        assert_eq!(merged.room_type.as_deref(), Some("sala"));
    }

    #[test]
    fn test_empty_serializes_to_empty_object() {
        let json = serde_json::to_string(&Filters::default()).unwrap_or_default();
        assert_eq!(json, "{}");
        assert!(Filters::default().is_empty());
        assert!(!with_color("azul").is_empty());
    }

    #[test]
    fn test_entries() {
        let f = Filters {
            line: Some("Premium".to_string()),
            ..with_color("azul")
        };
        let entries: Vec<_> = f.entries().collect();
        assert_eq!(entries, vec![("line", "Premium"), ("color", "azul")]);
    }
}
