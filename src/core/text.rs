//! Text normalization helpers.
//!
//! Utterances arrive in Portuguese and English with inconsistent accents,
//! so every matcher works on a folded form: lowercase with Latin diacritics
//! stripped.

use unicode_segmentation::UnicodeSegmentation;

/// Lowercases `s` and strips common Latin diacritics.
#[must_use]
pub fn fold(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).map(strip_diacritic).collect()
}

/// Splits folded text into words.
#[must_use]
pub fn words(s: &str) -> Vec<String> {
    fold(s).unicode_words().map(str::to_string).collect()
}

const fn strip_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}
