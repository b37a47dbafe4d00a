use std::collections::HashSet;

use crate::normalize::{normalize, tokens};

/// Swedish, Norwegian and Danish relational words, stored normalized
/// (diacritics stripped) with common definite forms.
const NORDIC_TERMS: &[&str] = &[
    "chef", "chefen", "mamma", "mamman", "mor", "morsan", "mamsen", "pappa", "pappan", "far",
    "farsan", "partner", "partnern", "sambo", "sambon", "fru", "frun", "kone", "make", "maken",
    "mannen", "flickvan", "flickvannen", "pojkvan", "pojkvannen", "kaereste", "bror", "brorsan",
    "broren", "syster", "systern", "sostern", "son", "sonen", "dotter", "dottern", "datter",
    "mormor", "morfar", "farmor", "farfar", "kollega", "kollegan", "kollegaen", "kompis",
    "kompisen", "vannen", "granne", "grannen", "svarmor", "svarfar",
];

const ENGLISH_TERMS: &[&str] = &[
    "boss", "manager", "mom", "mum", "mother", "dad", "father", "partner", "wife", "husband",
    "girlfriend", "boyfriend", "brother", "sister", "son", "daughter", "grandma", "grandpa",
    "colleague", "coworker", "friend", "neighbour", "neighbor", "roommate",
];

/// Lookup table of words that refer to a person by relation rather than name
/// ("min chef", "my mom").
#[derive(Debug, Clone)]
pub struct RelationTerms {
    nordic: HashSet<String>,
    english: HashSet<String>,
    extra: HashSet<String>,
}

impl Default for RelationTerms {
    fn default() -> Self {
        Self {
            nordic: NORDIC_TERMS.iter().map(|term| term.to_string()).collect(),
            english: ENGLISH_TERMS.iter().map(|term| term.to_string()).collect(),
            extra: HashSet::new(),
        }
    }
}

impl RelationTerms {
    /// Built-in table plus `extra` terms.  Extra terms are normalized and
    /// apply regardless of language.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut terms = Self::default();
        terms.extra = extra
            .into_iter()
            .map(|term| normalize(term.as_ref()))
            .filter(|term| !term.is_empty())
            .collect();
        terms
    }

    /// Whether any token of the normalized query is a relational word.
    ///
    /// With a known language (`sv`, `no`, `nb`, `nn`, `da`, `en`) only that
    /// language's table is consulted; otherwise every table is.
    pub fn mentions(&self, normalized_query: &str, lang: Option<&str>) -> bool {
        tokens(normalized_query).any(|token| self.is_term(token, lang))
    }

    fn is_term(&self, token: &str, lang: Option<&str>) -> bool {
        if self.extra.contains(token) {
            return true;
        }
        let lang = lang.map(|l| l.trim().to_ascii_lowercase());
        match lang.as_deref().map(primary_subtag) {
            Some("sv" | "no" | "nb" | "nn" | "da") => self.nordic.contains(token),
            Some("en") => self.english.contains(token),
            _ => self.nordic.contains(token) || self.english.contains(token),
        }
    }
}

/// `"sv-SE"` → `"sv"`.
fn primary_subtag(lang: &str) -> &str {
    lang.split(['-', '_']).next().unwrap_or(lang)
}
