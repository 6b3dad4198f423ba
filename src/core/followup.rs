//! Follow-up detection.
//!
//! A follow-up turn ("mostre mais opções", "show more") asks for more of
//! the previous answer instead of stating a new search intent. Searching
//! its literal text would return nonsense, so the effective query for the
//! turn is replaced with the last stored query, or with the most recent
//! earlier user turn that was not itself a follow-up.

use std::sync::LazyLock;

use regex::Regex;

use super::builtin_regex;
use super::text::{fold, words};
use super::turn::ChatTurn;

static FOLLOW_UP_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    builtin_regex(
        r"\b(?:mostr\w* mais|ver mais|veja mais|traga mais|quero mais|mais (?:opco\w*|opcao|resultados|produtos|sugest\w*|itens|alternativas)|outr[ao]s (?:opco\w*|sugest\w*|produtos|resultados|alternativas)|continu\w*|proxim[ao]s|seguintes|show (?:me )?more|see more|more (?:options|results|products)|other options|keep going|next (?:page|ones))\b",
    )
});

/// Single-word utterances that mean "more".
const BARE_FOLLOW_UPS: &[&str] = &["mais", "more", "outros", "outras", "next", "continue", "proximos"];

/// Returns `true` if the utterance asks for more of the previous results.
#[must_use]
pub fn is_follow_up(utterance: &str) -> bool {
    let tokens = words(utterance);
    if let [only] = tokens.as_slice()
        && BARE_FOLLOW_UPS.contains(&only.as_str())
    {
        return true;
    }
    FOLLOW_UP_PHRASES.is_match(&fold(utterance))
}

/// The query a turn should actually search for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQuery {
    /// Effective search text.
    pub query: String,
    /// Whether the turn was classified as a follow-up.
    pub follow_up: bool,
}

/// Resolves the effective query for `utterance`.
///
/// Non-follow-up turns search their own text. Follow-ups reuse
/// `last_query` when the session has one, otherwise the most recent user
/// turn in `history` that is not a follow-up, otherwise their own text.
#[must_use]
pub fn resolve_query(utterance: &str, last_query: Option<&str>, history: &[ChatTurn]) -> ResolvedQuery {
    if !is_follow_up(utterance) {
        return ResolvedQuery {
            query: utterance.trim().to_string(),
            follow_up: false,
        };
    }

    let query = last_query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .or_else(|| {
            history
                .iter()
                .rev()
                .filter(|t| t.is_user())
                .map(|t| t.content.trim())
                .find(|c| !c.is_empty() && !is_follow_up(c))
                .map(str::to_string)
        })
        .unwrap_or_else(|| utterance.trim().to_string());

    ResolvedQuery {
        query,
        follow_up: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_follow_ups() {
        for u in [
            "mostre mais opções",
            "Mostra mais",
            "quero ver mais",
            "outras opções?",
            "mais",
            "show me more",
            "other options please",
            "continue",
        ] {
            assert!(is_follow_up(u), "{u} should be a follow-up");
        }
    }

    #[test]
    fn test_rejects_new_intents() {
        for u in [
            "tinta azul para sala",
            "quero uma cor mais clara",
            "blue paint for the bedroom",
            "",
        ] {
            assert!(!is_follow_up(u), "{u} should not be a follow-up");
        }
    }

    #[test]
    fn test_resolve_uses_last_non_follow_up_turn() {
        let history = vec![
            ChatTurn::user("tinta azul para sala"),
            ChatTurn::assistant("Aqui estão 5 opções."),
            ChatTurn::user("mostre mais opções"),
        ];
        let resolved = resolve_query("mostre mais opções", None, &history);
        assert!(resolved.follow_up);
        assert_eq!(resolved.query, "tinta azul para sala");
    }

    #[test]
    fn test_resolve_prefers_stored_query() {
        let history = vec![ChatTurn::user("tinta verde")];
        let resolved = resolve_query("show more", Some("tinta cinza fosca"), &history);
        assert_eq!(resolved.query, "tinta cinza fosca");
    }

    #[test]
    fn test_resolve_non_follow_up_keeps_text() {
        let resolved = resolve_query("  esmalte para madeira ", Some("tinta azul"), &[]);
        assert!(!resolved.follow_up);
        assert_eq!(resolved.query, "esmalte para madeira");
    }

    #[test]
    fn test_resolve_follow_up_without_context() {
        let resolved = resolve_query("mais", None, &[ChatTurn::user("mais")]);
        assert!(resolved.follow_up);
        assert_eq!(resolved.query, "mais");
    }
}
