//! Deterministic rule router.
//!
//! Works on the folded utterance text alone, so it answers even when no
//! model is configured or the classifier fails. Decisions:
//!
//! - explicit `key:value` filters and `#rrggbb` colours make a turn
//!   "explicit" and warrant a `filter_search`;
//! - catalog wording ("tinta", "produtos", "opções", ...) warrants a
//!   `semantic_search`, plus a `filter_search` when context filters exist;
//! - a render verb next to an image noun, or a scene phrase, warrants a
//!   `generate_image`;
//! - when a filter search and an image request coincide only the image
//!   action is emitted; otherwise order is filter, semantic, image.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::router::{IntentRouter, MAX_ACTIONS, RouteRequest, RouterAction};
use super::swatch::{find_color, hex_for};
use crate::core::text::fold;
use crate::core::{Filters, builtin_regex};
use crate::error::AgentError;
use crate::tools::{FILTER_SEARCH, GenerateImageArgs, SEMANTIC_SEARCH, SearchArgs};

static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    builtin_regex(
        r#"\b(line|linha|finish|acabamento|surface|superficie|room|ambiente|color|cor|hex)\s*[:=]\s*(?:"([^"]+)"|(#?[\w-]+))"#,
    )
});

static HEX: LazyLock<Regex> = LazyLock::new(|| builtin_regex(r"#[0-9a-f]{6}\b"));

static PAGE_HINT: LazyLock<Regex> =
    LazyLock::new(|| builtin_regex(r"\b(limit|offset|top[-_ ]?k)\s*[:=]?\s*(\d+)\b"));

static FIRST_N: LazyLock<Regex> = LazyLock::new(|| {
    builtin_regex(r"\b(?:first|primeiros|primeiras|top)\s+(\d+)\b")
});

static PRODUCT_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    builtin_regex(
        r"\b(tinta|tintas|produto|produtos|opcao|opcoes|sugestao|sugestoes|recomend\w*|indic\w*|catalogo|preco|precos|comprar|esmalte|verniz|paint|paints|product|products|options|suggest\w*|recommend\w*|catalog|price|buy)\b",
    )
});

static IMAGE_VERBS: LazyLock<Regex> = LazyLock::new(|| {
    builtin_regex(
        r"\b(gerar|gere|gera|criar|crie|cria|mostrar|mostre|mostra|simular|simule|simula|visualizar|visualize|renderizar|renderize|ver|generate|create|show|simulate|render|visualise|visualize|draw)\b",
    )
});

static IMAGE_NOUNS: LazyLock<Regex> = LazyLock::new(|| {
    builtin_regex(
        r"\b(imagem|imagens|foto|fotos|render|simulacao|previa|ilustracao|image|images|picture|photo|preview|mockup)\b",
    )
});

static SCENE_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    builtin_regex(
        r"\b(como ficaria|como fica|como ficara|ver na parede|ver no ambiente|how would it look|how it would look|see it on the wall)\b",
    )
});

/// Structured hints pulled from one utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleHints {
    /// Filters stated explicitly as `key:value` or `#rrggbb`.
    pub filters: Filters,
    /// Requested page size.
    pub limit: Option<usize>,
    /// Requested page offset.
    pub offset: Option<usize>,
    /// Any structured filter present.
    pub has_explicit: bool,
    /// Catalog wording present.
    pub wants_products: bool,
    /// Explicit image request present.
    pub wants_image: bool,
}

impl RuleHints {
    /// Extracts hints from an utterance.
    #[must_use]
    pub fn extract(utterance: &str) -> Self {
        let text = fold(utterance);
        let filters = explicit_filters(&text);
        let (limit, offset) = page_hints(&text);
        let has_hex = filters.hex.is_some();
        let has_image_noun = IMAGE_NOUNS.is_match(&text);

        Self {
            has_explicit: !filters.is_empty(),
            wants_products: PRODUCT_WORDS.is_match(&text),
            wants_image: (IMAGE_VERBS.is_match(&text) && has_image_noun)
                || SCENE_PHRASES.is_match(&text)
                || (has_hex && has_image_noun),
            filters,
            limit,
            offset,
        }
    }
}

/// Rule-based [`IntentRouter`]. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleRouter;

impl RuleRouter {
    /// Routes synchronously.
    #[must_use]
    pub fn decide(request: &RouteRequest<'_>) -> Vec<RouterAction> {
        let hints = RuleHints::extract(request.utterance);
        let filters = request.context_filters().overlay(&hints.filters);

        let wants_filter =
            hints.has_explicit || (hints.wants_products && !filters.is_empty());
        let wants_semantic = hints.wants_products
            || (!hints.has_explicit && !hints.wants_image && !request.keywords.is_empty());

        if wants_filter && hints.wants_image {
            return vec![image_action(request, &filters, 0.9, "explicit image request")];
        }

        let search = SearchArgs {
            query: request.utterance.to_string(),
            filters,
            offset: hints.offset.unwrap_or(0),
            limit: hints.limit,
            exclude_ids: Vec::new(),
        };

        let mut actions = Vec::with_capacity(MAX_ACTIONS);
        if wants_filter {
            let confidence = if hints.has_explicit { 0.9 } else { 0.6 };
            actions.push(RouterAction::search(
                FILTER_SEARCH,
                &search,
                confidence,
                "structured filters present",
            ));
        }
        if wants_semantic {
            let semantic = SearchArgs {
                filters: Filters::default(),
                ..search.clone()
            };
            actions.push(RouterAction::search(
                SEMANTIC_SEARCH,
                &semantic,
                0.6,
                "catalog wording",
            ));
        }
        if hints.wants_image {
            actions.push(image_action(request, &search.filters, 0.8, "image request"));
        }
        actions.truncate(MAX_ACTIONS);
        actions
    }
}

#[async_trait]
impl IntentRouter for RuleRouter {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn route(&self, request: &RouteRequest<'_>) -> Result<Vec<RouterAction>, AgentError> {
        Ok(Self::decide(request))
    }
}

fn image_action(
    request: &RouteRequest<'_>,
    filters: &Filters,
    confidence: f32,
    rationale: &str,
) -> RouterAction {
    let color = filters
        .color
        .clone()
        .or_else(|| find_color(request.utterance).map(str::to_string));
    let hex = filters
        .hex
        .clone()
        .or_else(|| color.as_deref().and_then(hex_for).map(str::to_string));
    let args = GenerateImageArgs {
        prompt: request.utterance.to_string(),
        color,
        hex,
        room: filters.room_type.clone(),
        style: request.keywords.style.clone(),
    };
    RouterAction::image(&args, confidence, rationale)
}

fn explicit_filters(text: &str) -> Filters {
    let mut filters = Filters::default();
    for caps in KEY_VALUE.captures_iter(text) {
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().trim().to_string());
        let (Some(key), Some(value)) = (caps.get(1), value) else {
            continue;
        };
        let slot = match key.as_str() {
            "hex" => {
                if let Some(hex) = normalize_hex(&value) {
                    filters.hex.get_or_insert(hex);
                }
                continue;
            }
            "line" | "linha" => &mut filters.line,
            "finish" | "acabamento" => &mut filters.finish,
            "surface" | "superficie" => &mut filters.surface_type,
            "room" | "ambiente" => &mut filters.room_type,
            _ => &mut filters.color,
        };
        slot.get_or_insert(value);
    }
    if filters.hex.is_none() {
        filters.hex = HEX.find(text).map(|m| m.as_str().to_string());
    }
    filters
}

/// `1E63B5` or `#1e63b5` as `#1e63b5`; anything else is rejected.
fn normalize_hex(value: &str) -> Option<String> {
    let digits = value.trim_start_matches('#');
    (digits.len() == 6 && digits.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| format!("#{}", digits.to_ascii_lowercase()))
}

fn page_hints(text: &str) -> (Option<usize>, Option<usize>) {
    let mut limit = None;
    let mut offset = None;
    for caps in PAGE_HINT.captures_iter(text) {
        let n = caps.get(2).and_then(|m| m.as_str().parse().ok());
        match caps.get(1).map(|m| m.as_str()) {
            Some("offset") => offset = offset.or(n),
            Some(_) => limit = limit.or(n),
            None => {}
        }
    }
    if limit.is_none() {
        limit = FIRST_N
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok());
    }
    (limit.filter(|&n| n > 0), offset)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::memory::Keywords;
    use crate::tools::GENERATE_IMAGE;

    fn tools_for(utterance: &str, keywords: &Keywords) -> Vec<String> {
        RuleRouter::decide(&RouteRequest::new(utterance, keywords))
            .into_iter()
            .map(|a| a.tool)
            .collect()
    }

    #[test_case("linha:premium acabamento:fosco", &[FILTER_SEARCH] ; "explicit filters only")]
    #[test_case("quero ver tintas, cor:azul", &[FILTER_SEARCH, SEMANTIC_SEARCH] ; "filters and catalog wording")]
    #[test_case("me indique uma tinta lavavel", &[SEMANTIC_SEARCH] ; "catalog wording only")]
    #[test_case("gere uma imagem da sala", &[GENERATE_IMAGE] ; "image only")]
    #[test_case("cor:azul ambiente:sala, gere uma imagem", &[GENERATE_IMAGE] ; "image drops product search")]
    #[test_case("como ficaria #1e63b5 na parede? cor:azul", &[GENERATE_IMAGE] ; "scene phrase with filters")]
    #[test_case("tinta para parede e como ficaria", &[SEMANTIC_SEARCH, GENERATE_IMAGE] ; "semantic then image")]
    #[test_case("bom dia", &[] ; "nothing to do")]
    fn test_rule_table(utterance: &str, expected: &[&str]) {
        assert_eq!(tools_for(utterance, &Keywords::default()), expected);
    }

    #[test]
    fn test_context_filters_enable_filter_search() {
        let keywords = Keywords {
            room: Some("sala".to_string()),
            color: Some("azul".to_string()),
            ..Keywords::default()
        };
        let actions = RuleRouter::decide(&RouteRequest::new("quais tintas voces tem?", &keywords));
        let tools: Vec<_> = actions.iter().map(|a| a.tool.as_str()).collect();
        assert_eq!(tools, vec![FILTER_SEARCH, SEMANTIC_SEARCH]);

        let args = actions[0].search_args();
        assert_eq!(args.filters.room_type.as_deref(), Some("sala"));
        assert_eq!(args.filters.color.as_deref(), Some("azul"));
        assert!(actions[1].search_args().filters.is_empty());
    }

    #[test_case("hex: 1e63b5", Some("#1e63b5") ; "bare digits")]
    #[test_case("hex=#2E8B57 para a sala", Some("#2e8b57") ; "with hash")]
    #[test_case("hex: azul", None ; "not a colour code")]
    fn test_hex_key_value(utterance: &str, expected: Option<&str>) {
        let hints = RuleHints::extract(utterance);
        assert_eq!(hints.filters.hex.as_deref(), expected);
        assert!(hints.filters.color.is_none());
    }

    #[test]
    fn test_extracts_filters_and_hex() {
        let hints = RuleHints::extract(
            "Linha: \"Premium Plus\", Acabamento=acetinado superfície:madeira ambiente:cozinha #1E63B5",
        );
        assert!(hints.has_explicit);
        assert_eq!(hints.filters.line.as_deref(), Some("premium plus"));
        assert_eq!(hints.filters.finish.as_deref(), Some("acetinado"));
        assert_eq!(hints.filters.surface_type.as_deref(), Some("madeira"));
        assert_eq!(hints.filters.room_type.as_deref(), Some("cozinha"));
        assert_eq!(hints.filters.hex.as_deref(), Some("#1e63b5"));
    }

    #[test_case("limit: 3", Some(3), None ; "limit")]
    #[test_case("offset=10 top-k 4", Some(4), Some(10) ; "offset and top k")]
    #[test_case("mostre os primeiros 5", Some(5), None ; "first n portuguese")]
    #[test_case("show me the first 2 paints", Some(2), None ; "first n english")]
    #[test_case("limit 0", None, None ; "zero limit ignored")]
    fn test_page_hints(utterance: &str, limit: Option<usize>, offset: Option<usize>) {
        let hints = RuleHints::extract(utterance);
        assert_eq!((hints.limit, hints.offset), (limit, offset));
    }

    #[test]
    fn test_image_args_carry_colour_and_room() {
        let keywords = Keywords::default();
        let actions = RuleRouter::decide(&RouteRequest::new(
            "cor:verde ambiente:quarto, crie uma imagem",
            &keywords,
        ));
        assert_eq!(actions.len(), 1);
        let args = actions[0].image_args();
        assert_eq!(args.color.as_deref(), Some("verde"));
        assert_eq!(args.hex.as_deref(), hex_for("verde"));
        assert_eq!(args.room.as_deref(), Some("quarto"));
    }

    #[test]
    fn test_follow_up_wording_is_not_an_image_request() {
        let hints = RuleHints::extract("mostre mais opções");
        assert!(!hints.wants_image);
        assert!(hints.wants_products);
    }
}
