//! Name normalization shared by the index builder and the query path.
//!
//! - Lowercase
//! - Unicode canonical decomposition (NFD) with combining marks stripped,
//!   so "Björn" and "Bjorn" meet
//! - Letters without a decomposition (`æ`, `ø`, `ß`, ...) are kept as-is
//! - Anything other than letters, digits, whitespace and `-` is dropped
//! - Whitespace runs collapse to one space; the result is trimmed

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Canonical form of a name.  Total and idempotent.
///
/// ```
/// use kindred_subjects::normalize::normalize;
///
/// assert_eq!(normalize("  Björn   ÅSTRÖM "), "bjorn astrom");
/// assert_eq!(normalize("O'Brien-Smith"), "obrien-smith");
/// ```
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.to_lowercase().nfd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !(ch.is_alphanumeric() || ch == '-') {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }

    out
}

/// Space-delimited tokens of an already-normalized string.
pub fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split(' ').filter(|token| !token.is_empty())
}

/// Overlapping 2-character windows of a single token.  Tokens shorter than two
/// characters yield nothing.
pub fn bigrams(token: &str) -> Vec<[char; 2]> {
    let chars: Vec<char> = token.chars().collect();
    chars.windows(2).map(|pair| [pair[0], pair[1]]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_diacritics_and_case() {
        assert_eq!(normalize("Åsa Öberg"), "asa oberg");
        assert_eq!(normalize("JOSÉ"), "jose");
    }

    #[test]
    fn keeps_undecomposable_nordic_letters() {
        assert_eq!(normalize("Søren Ærø"), "søren ærø");
        assert_eq!(normalize("Straße"), "straße");
    }

    #[test]
    fn drops_punctuation_and_collapses_whitespace() {
        assert_eq!(normalize("\t Anna,\n  Svensson!! "), "anna svensson");
        assert_eq!(normalize("Anna-Karin"), "anna-karin");
        assert_eq!(normalize("R2 D2"), "r2 d2");
    }

    #[test]
    fn punctuation_between_spaces_does_not_double_space() {
        assert_eq!(normalize("Anna ! Svensson"), "anna svensson");
    }

    #[test]
    fn empty_and_blank_inputs_yield_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \t\n"), "");
        assert_eq!(normalize("?!."), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["Björn Åström", "  Ænne-Marie  O'Neil ", "İlkay", "ǅemal", "Ｆｕｌｌ"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn tokens_and_bigrams() {
        let norm = normalize("Anna  Svensson");
        assert_eq!(tokens(&norm).collect::<Vec<_>>(), vec!["anna", "svensson"]);
        assert_eq!(bigrams("ann"), vec![['a', 'n'], ['n', 'n']]);
        assert!(bigrams("a").is_empty());
    }
}
