//! Product catalog served by the worker tools.
//!
//! The catalog is a JSON file holding either a bare array of products or
//! an object with a `products` array.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::Filters;
use crate::core::text::fold;
use crate::error::ToolError;

/// One paint product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Stable product id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Marketing description.
    #[serde(default)]
    pub description: String,
    /// Product line.
    #[serde(default)]
    pub line: Option<String>,
    /// Finish.
    #[serde(default)]
    pub finish: Option<String>,
    /// Colour name.
    #[serde(default)]
    pub color: Option<String>,
    /// Colour as `#rrggbb`.
    #[serde(default)]
    pub hex: Option<String>,
    /// Surfaces the product is suitable for.
    #[serde(default)]
    pub surface_types: Vec<String>,
    /// Rooms the product is suitable for.
    #[serde(default)]
    pub room_types: Vec<String>,
    /// Free-form tags (style, mood, features).
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Product {
    /// Returns `true` if every set filter field matches this product.
    ///
    /// Comparison is case and accent insensitive. List-valued attributes
    /// match when any entry matches.
    #[must_use]
    pub fn matches(&self, filters: &Filters) -> bool {
        let single = |wanted: Option<&String>, have: Option<&String>| {
            wanted.is_none_or(|w| have.is_some_and(|h| fold(h) == fold(w)))
        };
        let any = |wanted: Option<&String>, have: &[String]| {
            wanted.is_none_or(|w| {
                let w = fold(w);
                have.iter().any(|h| fold(h) == w)
            })
        };

        single(filters.line.as_ref(), self.line.as_ref())
            && single(filters.finish.as_ref(), self.finish.as_ref())
            && single(filters.color.as_ref(), self.color.as_ref())
            && single(filters.hex.as_ref(), self.hex.as_ref())
            && any(filters.surface_type.as_ref(), &self.surface_types)
            && any(filters.room_type.as_ref(), &self.room_types)
    }

    /// All searchable text of the product, space separated.
    #[must_use]
    pub fn search_text(&self) -> String {
        let mut parts = vec![self.name.as_str(), self.description.as_str()];
        parts.extend(self.line.as_deref());
        parts.extend(self.finish.as_deref());
        parts.extend(self.color.as_deref());
        parts.extend(self.surface_types.iter().map(String::as_str));
        parts.extend(self.room_types.iter().map(String::as_str));
        parts.extend(self.tags.iter().map(String::as_str));
        parts.join(" ")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Bare(Vec<Product>),
    Wrapped { products: Vec<Product> },
}

/// In-memory product catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    /// Wraps a list of products.
    #[must_use]
    pub const fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    /// Loads a catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Catalog`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ToolError> {
        let catalog_err = |message: String| ToolError::Catalog {
            path: path.display().to_string(),
            message,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| catalog_err(e.to_string()))?;
        Self::from_json(&raw).map_err(|e| catalog_err(e.to_string()))
    }

    /// Parses a catalog from JSON text.
    ///
    /// # Errors
    ///
    /// Returns a JSON error when the text is neither a product array nor an
    /// object with a `products` array.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let products = match serde_json::from_str::<CatalogFile>(raw)? {
            CatalogFile::Bare(products) | CatalogFile::Wrapped { products } => products,
        };
        Ok(Self { products })
    }

    /// All products in file order.
    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Number of products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Returns `true` for an empty catalog.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    fn product(id: &str, name: &str, color: &str, hex: &str, rooms: &[&str], finish: &str, tags: &[&str]) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            description: format!("{name} acrilica premium"),
            line: Some("Premium".to_string()),
            finish: Some(finish.to_string()),
            color: Some(color.to_string()),
            hex: Some(hex.to_string()),
            surface_types: vec!["parede".to_string()],
            room_types: rooms.iter().map(ToString::to_string).collect(),
            tags: tags.iter().map(ToString::to_string).collect(),
        }
    }

    /// Small catalog shared by the tool tests.
    pub(crate) fn sample() -> Catalog {
        Catalog::new(vec![
            product("p1", "Azul Sereno", "azul", "#4a7ab5", &["sala", "quarto"], "fosco", &["calmo", "moderno"]),
            product("p2", "Azul Profundo", "azul", "#1e3a8a", &["sala"], "acetinado", &["elegante"]),
            product("p3", "Verde Folha", "verde", "#3f8f4f", &["cozinha", "varanda"], "fosco", &["natural"]),
            product("p4", "Branco Neve", "branco", "#f8f8f8", &["sala", "quarto", "cozinha"], "fosco", &["minimalista"]),
            product("p5", "Terracota", "laranja", "#c0603a", &["varanda"], "acetinado", &["rustico", "aconchegante"]),
        ])
    }
}
