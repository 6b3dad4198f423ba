//! Vector-similarity search over the catalog.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::embedding::{HashedEmbedder, content_words, cosine};
use super::{
    Catalog, SEMANTIC_SEARCH, SearchArgs, SearchPayload, ToolDescriptor, ToolHandler, parse_args,
    schema_of, to_payload,
};
use crate::core::Pick;
use crate::error::ToolError;

/// Minimum cosine similarity for a product to be returned.
const MIN_SIMILARITY: f32 = 0.05;

/// Cosine similarity over hashed bag-of-words embeddings.
///
/// Filters are not applied as hard constraints: their values are folded
/// into the query text so they bias similarity instead.
#[derive(Debug, Clone)]
pub struct SemanticSearchTool {
    catalog: Arc<Catalog>,
    embedder: HashedEmbedder,
    index: Arc<Vec<Vec<f32>>>,
}

impl SemanticSearchTool {
    /// Creates the tool and embeds every product up front.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let embedder = HashedEmbedder::default();
        let index = catalog
            .products()
            .iter()
            .map(|p| embedder.embed(&p.search_text()))
            .collect();
        Self {
            catalog,
            embedder,
            index: Arc::new(index),
        }
    }

    /// Runs the search.
    #[must_use]
    pub fn search(&self, args: &SearchArgs) -> SearchPayload {
        let mut text = args.query.clone();
        for (_, value) in args.filters.entries() {
            text.push(' ');
            text.push_str(value);
        }
        let query = self.embedder.embed(&text);

        let mut scored: Vec<(f32, Pick)> = self
            .catalog
            .products()
            .iter()
            .zip(self.index.iter())
            .filter_map(|(product, vector)| {
                let similarity = cosine(&query, vector);
                (similarity >= MIN_SIMILARITY).then(|| {
                    let pick = Pick {
                        id: product.id.clone(),
                        name: Some(product.name.clone()),
                        reason: format!("semantic similarity {similarity:.3}"),
                    };
                    (similarity, pick)
                })
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        let total = scored.len();
        let picks = args.paginate(scored.into_iter().map(|(_, p)| p).collect());
        debug!(total, returned = picks.len(), "semantic search");

        SearchPayload {
            picks,
            total,
            model: format!("hashed-bow-{}", self.embedder.dimensions()),
            tokens: u32::try_from(content_words(&text).len()).unwrap_or(u32::MAX),
        }
    }
}

#[async_trait]
impl ToolHandler for SemanticSearchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: SEMANTIC_SEARCH.to_string(),
            description: "Search paint products by meaning: free-text style, mood and \
                          colour descriptions ranked by vector similarity."
                .to_string(),
            input_schema: schema_of::<SearchArgs>(),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: SearchArgs = parse_args(SEMANTIC_SEARCH, arguments)?;
        to_payload(SEMANTIC_SEARCH, &self.search(&args))
    }
}
