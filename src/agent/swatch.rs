//! Colour swatch table.
//!
//! Maps Portuguese and English colour names to the hex value used for
//! scene renders. Lookups are case and accent insensitive.

use crate::core::text::fold;

/// Fallback swatch when a colour is unknown.
pub const NEUTRAL_HEX: &str = "#f5f5f0";

/// `(name, hex)` pairs. Names are stored folded.
const SWATCHES: &[(&str, &str)] = &[
    ("azul", "#1e63b5"),
    ("blue", "#1e63b5"),
    ("azul marinho", "#1b2a4a"),
    ("navy", "#1b2a4a"),
    ("azul claro", "#9cc3e6"),
    ("light blue", "#9cc3e6"),
    ("verde", "#3f8f4f"),
    ("green", "#3f8f4f"),
    ("verde oliva", "#6b7d3a"),
    ("olive", "#6b7d3a"),
    ("vermelho", "#b3261e"),
    ("red", "#b3261e"),
    ("amarelo", "#f2c230"),
    ("yellow", "#f2c230"),
    ("laranja", "#e07b2a"),
    ("orange", "#e07b2a"),
    ("terracota", "#c0603a"),
    ("terracotta", "#c0603a"),
    ("rosa", "#e8a0b4"),
    ("pink", "#e8a0b4"),
    ("roxo", "#6a3d9a"),
    ("lilas", "#b8a2d6"),
    ("purple", "#6a3d9a"),
    ("marrom", "#6d4c35"),
    ("brown", "#6d4c35"),
    ("bege", "#d9c7a7"),
    ("beige", "#d9c7a7"),
    ("cinza", "#8a8d91"),
    ("grey", "#8a8d91"),
    ("gray", "#8a8d91"),
    ("grafite", "#41454b"),
    ("preto", "#1a1a1a"),
    ("black", "#1a1a1a"),
    ("branco", "#f8f8f8"),
    ("white", "#f8f8f8"),
    ("off white", "#f3efe6"),
    ("areia", "#d8c8a8"),
    ("sand", "#d8c8a8"),
];

/// Looks up the hex value of a colour name.
#[must_use]
pub fn hex_for(color: &str) -> Option<&'static str> {
    let wanted = fold(color.trim());
    SWATCHES
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, hex)| *hex)
}

/// Finds the longest colour name mentioned in `text`.
///
/// Multi-word names win over their prefixes ("azul marinho" over "azul").
#[must_use]
pub fn find_color(text: &str) -> Option<&'static str> {
    let folded = fold(text);
    let padded = format!(" {} ", folded.split_whitespace().collect::<Vec<_>>().join(" "));
    SWATCHES
        .iter()
        .filter(|(name, _)| padded.contains(&format!(" {name} ")))
        .max_by_key(|(name, _)| name.len())
        .map(|(name, _)| *name)
}

/// Returns `true` if `s` is a `#rrggbb` colour.
#[must_use]
pub fn is_hex(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_for() {
        assert_eq!(hex_for("Azul"), Some("#1e63b5"));
        assert_eq!(hex_for("lilás"), Some("#b8a2d6"));
        assert_eq!(hex_for("chartreuse"), None);
    }

    #[test]
    fn test_find_color_prefers_longest() {
        assert_eq!(find_color("quero azul marinho na sala"), Some("azul marinho"));
        assert_eq!(find_color("parede azul"), Some("azul"));
        assert_eq!(find_color("quero algo calmo"), None);
    }

    #[test]
    fn test_is_hex() {
        assert!(is_hex("#1E63b5"));
        assert!(!is_hex("1e63b5"));
        assert!(!is_hex("#1e63b"));
    }
}
