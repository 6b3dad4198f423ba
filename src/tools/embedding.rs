//! Hashed bag-of-words embeddings.
//!
//! Each folded word is hashed (FNV-1a) into one of `dims` buckets; the
//! vector is L2-normalized so a dot product is a cosine similarity. Good
//! enough to rank a product catalog without a model runtime.

use crate::core::text::words;

/// Default embedding dimensionality.
pub const DEFAULT_DIMENSIONS: usize = 256;

/// Words carrying no product meaning.
const STOPWORDS: &[&str] = &[
    "a", "o", "as", "os", "de", "da", "do", "das", "dos", "e", "em", "no", "na", "nos", "nas",
    "para", "pra", "por", "com", "um", "uma", "que", "me", "meu", "minha", "quero", "tinta",
    "the", "an", "and", "for", "of", "in", "on", "to", "with", "my", "i", "want", "paint",
];

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

const fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// Content words of `text`: folded, stopwords removed.
#[must_use]
pub fn content_words(text: &str) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Deterministic hashing embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashedEmbedder {
    dims: usize,
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashedEmbedder {
    /// Creates an embedder with `dims` buckets (at least one).
    #[must_use]
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Embedding dimensionality.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.dims
    }

    /// Embeds `text`. Text without content words yields the zero vector.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dims];
        for word in content_words(text) {
            let bucket = (fnv1a(word.as_bytes()) % self.dims as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// Cosine similarity of two normalized vectors.
#[must_use]
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
