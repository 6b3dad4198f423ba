//! Worker-side tools.
//!
//! A tool is a named, schema-described operation served through
//! `tools/call`. Handlers implement [`ToolHandler`]; the [`ToolRegistry`]
//! owns them in registration order, which is also the `tools/list` order.

pub mod catalog;
pub mod embedding;
pub mod filter_search;
pub mod image;
pub mod semantic_search;

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub use catalog::{Catalog, Product};
pub use filter_search::FilterSearchTool;
pub use image::{GenerateImageArgs, ImageRender, ImageTool};
pub use semantic_search::SemanticSearchTool;

use crate::core::{Filters, Pick};
use crate::error::ToolError;

/// Tool name of the structured filter search.
pub const FILTER_SEARCH: &str = "filter_search";
/// Tool name of the vector-similarity search.
pub const SEMANTIC_SEARCH: &str = "semantic_search";
/// Tool name of the scene render tool.
pub const GENERATE_IMAGE: &str = "generate_image";

/// Default page size for the search tools.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Static catalog entry describing a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name used in `tools/call`.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema of the arguments object.
    pub input_schema: Value,
}

/// A tool executed by the worker.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Descriptor advertised by `tools/list`.
    fn descriptor(&self) -> ToolDescriptor;

    /// Executes the tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] for arguments that do not
    /// match the schema and [`ToolError::Execution`] for runtime failures.
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Ordered set of tool handlers.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three catalog-backed tools.
    #[must_use]
    pub fn builtin(catalog: Arc<Catalog>) -> Self {
        Self::new()
            .with(FilterSearchTool::new(Arc::clone(&catalog)))
            .with(SemanticSearchTool::new(catalog))
            .with(ImageTool)
    }

    /// Adds a handler. A handler with the same name replaces the old one.
    #[must_use]
    pub fn with(mut self, handler: impl ToolHandler + 'static) -> Self {
        let name = handler.descriptor().name;
        self.handlers.retain(|h| h.descriptor().name != name);
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Descriptors of every registered tool.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.handlers.iter().map(|h| h.descriptor()).collect()
    }

    /// Looks up a handler by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers
            .iter()
            .find(|h| h.descriptor().name == name)
            .cloned()
    }

    /// Runs the named tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] if no handler has that name, or
    /// the handler's own error.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let handler = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;
        handler.call(arguments).await
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when no tool is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.handlers.iter().map(|h| h.descriptor().name).collect();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

/// Arguments shared by both search tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchArgs {
    /// Free-text query.
    #[serde(default)]
    pub query: String,
    /// Structured filters.
    #[serde(default)]
    pub filters: Filters,
    /// Number of matches to skip.
    #[serde(default)]
    pub offset: usize,
    /// Maximum number of picks to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Product ids that must not be returned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_ids: Vec<String>,
}

impl SearchArgs {
    /// Applies exclusion, offset and limit to ranked picks.
    pub(crate) fn paginate(&self, ranked: Vec<Pick>) -> Vec<Pick> {
        ranked
            .into_iter()
            .filter(|p| !self.exclude_ids.contains(&p.id))
            .skip(self.offset)
            .take(self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
            .collect()
    }
}

/// JSON payload returned by both search tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPayload {
    /// Ranked picks, best first.
    pub picks: Vec<Pick>,
    /// Matches before pagination.
    #[serde(default)]
    pub total: usize,
    /// Ranking model that produced the picks.
    #[serde(default)]
    pub model: String,
    /// Query tokens consumed by the ranking.
    #[serde(default)]
    pub tokens: u32,
}

/// JSON Schema of `T` as a plain value.
pub(crate) fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| json!({"type": "object"}))
}

/// Deserializes tool arguments, treating `null` as an empty object.
pub(crate) fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
        name: tool.to_string(),
        message: e.to_string(),
    })
}

/// Serializes a tool result.
pub(crate) fn to_payload<T: Serialize>(tool: &str, value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Execution {
        name: tool.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::catalog::fixtures;

    #[test]
    fn test_builtin_registry_order() {
        let registry = ToolRegistry::builtin(Arc::new(fixtures::sample()));
        let names: Vec<_> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec![FILTER_SEARCH, SEMANTIC_SEARCH, GENERATE_IMAGE]);
    }

    #[test]
    fn test_descriptor_serializes_input_schema() {
        let registry = ToolRegistry::builtin(Arc::new(Catalog::default()));
        let wire = serde_json::to_value(registry.descriptors()).unwrap_or_default();
        assert_eq!(wire[0]["inputSchema"]["type"], "object");
        assert!(wire[0]["inputSchema"]["properties"]["excludeIds"].is_object());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry.call("nope", Value::Null).await;
        assert!(matches!(result, Err(ToolError::UnknownTool { ref name }) if name == "nope"));
    }

    #[test]
    fn test_parse_args_null_is_empty_object() {
        let args: SearchArgs = parse_args(FILTER_SEARCH, Value::Null).unwrap_or_default();
        assert_eq!(args, SearchArgs::default());

        let bad = parse_args::<SearchArgs>(FILTER_SEARCH, json!({"offset": "two"}));
        assert!(matches!(bad, Err(ToolError::InvalidArguments { .. })));
    }

    #[test]
    fn test_paginate_excludes_before_offset() {
        let args = SearchArgs {
            offset: 1,
            limit: Some(2),
            exclude_ids: vec!["b".to_string()],
            ..SearchArgs::default()
        };
        let ranked = ["a", "b", "c", "d", "e"].iter().map(|id| Pick::new(*id, "")).collect();
        let ids: Vec<_> = args.paginate(ranked).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }
}
