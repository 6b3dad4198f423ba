//! Structured filter search over the catalog.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::embedding::content_words;
use super::{
    Catalog, FILTER_SEARCH, SearchArgs, SearchPayload, ToolDescriptor, ToolHandler, parse_args,
    schema_of, to_payload,
};
use crate::core::{Filters, Pick};
use crate::error::ToolError;

/// Exact filter match, ranked by query word overlap.
///
/// With no filters set only products sharing at least one query word are
/// returned; nothing matching is an empty result, never an error.
#[derive(Debug, Clone)]
pub struct FilterSearchTool {
    catalog: Arc<Catalog>,
}

impl FilterSearchTool {
    /// Creates the tool over `catalog`.
    #[must_use]
    pub const fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Runs the search.
    #[must_use]
    pub fn search(&self, args: &SearchArgs) -> SearchPayload {
        let query_words: HashSet<String> = content_words(&args.query).into_iter().collect();
        let mut ranked: Vec<(usize, Pick)> = self
            .catalog
            .products()
            .iter()
            .filter(|p| p.matches(&args.filters))
            .filter_map(|p| {
                let product_words: HashSet<String> =
                    content_words(&p.search_text()).into_iter().collect();
                let overlap = query_words.intersection(&product_words).count();
                if args.filters.is_empty() && overlap == 0 {
                    return None;
                }
                let pick = Pick {
                    id: p.id.clone(),
                    name: Some(p.name.clone()),
                    reason: describe(&args.filters, overlap),
                };
                Some((overlap, pick))
            })
            .collect();

        // Stable: equal overlap keeps catalog order.
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        let total = ranked.len();
        let picks = args.paginate(ranked.into_iter().map(|(_, p)| p).collect());
        debug!(total, returned = picks.len(), "filter search");

        SearchPayload {
            picks,
            total,
            model: "catalog-filter".to_string(),
            tokens: u32::try_from(query_words.len()).unwrap_or(u32::MAX),
        }
    }
}

fn describe(filters: &Filters, overlap: usize) -> String {
    let matched: Vec<String> = filters.entries().map(|(k, v)| format!("{k}={v}")).collect();
    match (matched.is_empty(), overlap) {
        (true, n) => format!("{n} query term(s) matched"),
        (false, 0) => format!("matches {}", matched.join(", ")),
        (false, n) => format!("matches {}; {n} query term(s) matched", matched.join(", ")),
    }
}

#[async_trait]
impl ToolHandler for FilterSearchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: FILTER_SEARCH.to_string(),
            description: "Search paint products by structured filters (surfaceType, roomType, \
                          finish, line, color, hex), ranked by query relevance."
                .to_string(),
            input_schema: schema_of::<SearchArgs>(),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: SearchArgs = parse_args(FILTER_SEARCH, arguments)?;
        to_payload(FILTER_SEARCH, &self.search(&args))
    }
}
