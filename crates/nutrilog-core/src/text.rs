//! Text normalization shared by alias detection and measure matching.

use once_cell::sync::Lazy;
use regex::Regex;

static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.,;:!?¡¿()\[\]\x22']").expect("punctuation regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Normalizes free text for matching: lowercase, punctuation stripped,
/// whitespace collapsed and trimmed.
///
/// Accented characters are kept as-is; alias terms are stored already
/// normalized with the same function, so both sides agree.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, " ");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// True when the byte range `[start, end)` of `text` sits on word
/// boundaries (neighbouring characters are not alphanumeric).
pub fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before_ok = start == 0
        || text[..start]
            .chars()
            .next_back()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
    let after_ok = end == text.len()
        || text[end..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
    before_ok && after_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_punctuation() {
        assert_eq!(normalize("Dos Huevos, grandes!"), "dos huevos grandes");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize("  100g   de\tarroz  "), "100g de arroz");
    }

    #[test]
    fn keeps_accents() {
        assert_eq!(normalize("Café con LECHE"), "café con leche");
    }

    #[test]
    fn word_boundaries() {
        let s = "pan con pavo";
        assert!(is_word_boundary(s, 0, 3));
        assert!(is_word_boundary(s, 8, 12));
        // "an c" is not bounded on either side
        assert!(!is_word_boundary(s, 1, 6));
    }
}
