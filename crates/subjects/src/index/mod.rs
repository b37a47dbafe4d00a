//! Immutable lookup structures over one snapshot of the identity store.
//!
//! A [`SubjectIndex`] is a pure function of the subject list it was built
//! from.  There is no incremental update path: when the store changes, the
//! resolver builds a new index off to the side and swaps it in whole.
//!
//! # Structures
//!
//! | Name            | Key                         | Value                                   |
//! |-----------------|-----------------------------|-----------------------------------------|
//! | `entries`       | [`EntryHandle`]             | [`CandidateEntry`]                      |
//! | `by_id`         | subject id                  | handle                                  |
//! | `exact_primary` | normalized primary name     | handle                                  |
//! | `exact_alias`   | normalized alias            | handle                                  |
//! | `tokens`        | token (arena trie)          | handles sharing the token               |
//! | `phonetic`      | [`crate::phonex`] code      | `{handle, form}` sorted by form         |
//! | `bigrams`       | 2-char sequence             | handles whose names contain it          |
//!
//! Every structure stores handles, never subject data; the entry table is the
//! only place normalized names live.
use std::collections::{BTreeSet, HashMap};
use std::collections::hash_map::Entry;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::normalize::{bigrams, normalize, tokens};
use crate::phonex::encode_normalized;
use crate::schema::{Subject, SubjectId};

mod trie;

pub use trie::TokenTrie;

/// Position of a [`CandidateEntry`] in the index's entry table.
pub type EntryHandle = u32;

/// Normalized view of one subject, derived at build time.
#[derive(Debug, Clone)]
pub struct CandidateEntry {
    pub id: SubjectId,
    /// Normalized primary name.
    pub name: String,
    /// Tokens of `name`, in order (first token is the given name).
    pub name_tokens: Vec<String>,
    /// Normalized, non-empty aliases in insertion order.
    pub aliases: Vec<String>,
    /// Deduplicated tokens of the name and every alias.
    pub tokens: BTreeSet<String>,
    pub trust: f32,
}

/// Which exact map produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExactKind {
    Primary,
    Alias,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneticEntry {
    pub handle: EntryHandle,
    /// Normalized name, alias, or token that produced the code.
    pub form: String,
}

/// Size counters for logs and [`crate::ResolverStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub subjects: usize,
    pub skipped: usize,
    pub tokens: usize,
    pub trie_nodes: usize,
    pub phonetic_buckets: usize,
    pub bigrams: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SubjectIndex {
    entries: Vec<CandidateEntry>,
    by_id: HashMap<SubjectId, EntryHandle>,
    exact_primary: HashMap<String, EntryHandle>,
    exact_alias: HashMap<String, EntryHandle>,
    tokens: TokenTrie,
    phonetic: HashMap<String, Vec<PhoneticEntry>>,
    bigrams: HashMap<[char; 2], Vec<EntryHandle>>,
    skipped: usize,
}

impl SubjectIndex {
    /// Build every lookup structure from a full snapshot of subjects.
    ///
    /// Subjects whose name normalizes to nothing are skipped, as are repeated
    /// ids (first occurrence wins).  Neither aborts the build.
    pub fn build(subjects: &[Subject]) -> Self {
        let started = Instant::now();
        let mut index = Self::default();

        for subject in subjects {
            let name = normalize(&subject.name);
            if name.is_empty() {
                debug!(id = %subject.id, "skipping subject with empty name");
                index.skipped += 1;
                continue;
            }
            if index.by_id.contains_key(&subject.id) {
                warn!(id = %subject.id, "duplicate subject id in snapshot, keeping first");
                index.skipped += 1;
                continue;
            }

            let handle = index.entries.len() as EntryHandle;
            let entry = CandidateEntry::derive(subject, name);
            index.register(handle, &entry);
            index.by_id.insert(entry.id.clone(), handle);
            index.entries.push(entry);
        }

        for bucket in index.phonetic.values_mut() {
            bucket.sort_by(|a, b| a.form.cmp(&b.form).then(a.handle.cmp(&b.handle)));
            bucket.dedup();
        }

        let stats = index.stats();
        info!(
            subjects = stats.subjects,
            skipped = stats.skipped,
            tokens = stats.tokens,
            phonetic_buckets = stats.phonetic_buckets,
            bigrams = stats.bigrams,
            elapsed_us = started.elapsed().as_micros() as u64,
            "subject index built"
        );
        index
    }

    fn register(&mut self, handle: EntryHandle, entry: &CandidateEntry) {
        match self.exact_primary.entry(entry.name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(handle);
            }
            Entry::Occupied(slot) => {
                debug!(name = %entry.name, first = *slot.get(), handle, "primary name collision, first subject keeps the exact entry");
            }
        }
        for alias in &entry.aliases {
            self.exact_alias.entry(alias.clone()).or_insert(handle);
        }

        for token in &entry.tokens {
            self.tokens.insert(token, handle);
            for pair in bigrams(token) {
                let postings = self.bigrams.entry(pair).or_default();
                if postings.last() != Some(&handle) {
                    postings.push(handle);
                }
            }
        }

        let forms = std::iter::once(&entry.name)
            .chain(entry.aliases.iter())
            .map(String::as_str)
            .chain(entry.tokens.iter().map(String::as_str));
        for form in forms {
            let code = encode_normalized(form);
            if code.is_empty() {
                continue;
            }
            self.phonetic.entry(code).or_default().push(PhoneticEntry {
                handle,
                form: form.to_string(),
            });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, handle: EntryHandle) -> Option<&CandidateEntry> {
        self.entries.get(handle as usize)
    }

    pub fn handle_of(&self, id: &str) -> Option<EntryHandle> {
        self.by_id.get(id).copied()
    }

    /// Exact hit on a normalized primary name, falling back to aliases.
    pub fn exact(&self, normalized: &str) -> Option<(EntryHandle, ExactKind)> {
        if let Some(&handle) = self.exact_primary.get(normalized) {
            return Some((handle, ExactKind::Primary));
        }
        self.exact_alias
            .get(normalized)
            .map(|&handle| (handle, ExactKind::Alias))
    }

    pub fn token(&self, token: &str) -> &[EntryHandle] {
        self.tokens.exact(token)
    }

    pub fn token_prefix(&self, prefix: &str, limit: usize) -> Vec<EntryHandle> {
        self.tokens.prefix(prefix, limit)
    }

    pub fn phonetic_bucket(&self, code: &str) -> &[PhoneticEntry] {
        self.phonetic.get(code).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn bigram(&self, pair: [char; 2]) -> &[EntryHandle] {
        self.bigrams.get(&pair).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every handle in table order.
    pub fn handles(&self) -> impl Iterator<Item = EntryHandle> + '_ {
        (0..self.entries.len()).map(|h| h as EntryHandle)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            subjects: self.entries.len(),
            skipped: self.skipped,
            tokens: self.tokens.token_count(),
            trie_nodes: self.tokens.node_count(),
            phonetic_buckets: self.phonetic.len(),
            bigrams: self.bigrams.len(),
        }
    }
}

impl CandidateEntry {
    fn derive(subject: &Subject, name: String) -> Self {
        let name_tokens: Vec<String> = tokens(&name).map(String::from).collect();

        let mut aliases: Vec<String> = Vec::with_capacity(subject.aliases.len());
        for alias in subject.alias_values().map(normalize) {
            if !alias.is_empty() && !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }

        let tokens: BTreeSet<String> = name_tokens
            .iter()
            .cloned()
            .chain(aliases.iter().flat_map(|a| tokens(a).map(String::from)))
            .collect();

        Self {
            id: subject.id.clone(),
            name,
            name_tokens,
            aliases,
            tokens,
            trust: subject.trust.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_subjects() -> Vec<Subject> {
        vec![
            Subject::new("anna", "Anna Svensson").with_alias("Annie"),
            Subject::new("bjorn", "Björn Åström").with_alias("Bjö"),
            Subject::new("empty", "  ?! "),
            Subject::new("anna", "Anna Duplicate"),
            Subject::new("hanna", "Hanna Svensson").with_alias("Annie"),
        ]
    }

    #[test]
    fn build_skips_empty_names_and_duplicate_ids() {
        let index = SubjectIndex::build(&sample_subjects());
        let stats = index.stats();
        assert_eq!(stats.subjects, 3);
        assert_eq!(stats.skipped, 2);
        assert_eq!(index.handle_of("anna"), Some(0));
        assert_eq!(index.handle_of("hanna"), Some(2));
        assert_eq!(index.handle_of("empty"), None);
        assert_eq!(index.entry(1).unwrap().name, "bjorn astrom");
    }

    #[test]
    fn exact_maps_prefer_primary_then_first_alias_owner() {
        let index = SubjectIndex::build(&sample_subjects());
        assert_eq!(index.exact("anna svensson"), Some((0, ExactKind::Primary)));
        assert_eq!(index.exact("bjo"), Some((1, ExactKind::Alias)));
        // "annie" is shared; the first subject registering it keeps it.
        assert_eq!(index.exact("annie"), Some((0, ExactKind::Alias)));
        assert_eq!(index.exact("anna"), None);
    }

    #[test]
    fn token_index_unions_names_and_aliases() {
        let index = SubjectIndex::build(&sample_subjects());
        assert_eq!(index.token("svensson"), &[0, 2]);
        assert_eq!(index.token("annie"), &[0, 2]);
        assert_eq!(index.token("astrom"), &[1]);
        assert_eq!(index.token_prefix("ast", 10), vec![1]);
    }

    #[test]
    fn phonetic_buckets_are_sorted_by_form() {
        let index = SubjectIndex::build(&sample_subjects());
        let bucket = index.phonetic_bucket("a500");
        let forms: Vec<&str> = bucket.iter().map(|e| e.form.as_str()).collect();
        let mut sorted = forms.clone();
        sorted.sort();
        assert_eq!(forms, sorted);
        assert!(bucket.iter().any(|e| e.handle == 0 && e.form == "anna"));
        assert!(bucket.iter().any(|e| e.form == "annie"));
    }

    #[test]
    fn bigram_postings_are_deduplicated() {
        let index = SubjectIndex::build(&sample_subjects());
        // "nn" occurs in anna, annie, hanna; each handle once.
        assert_eq!(index.bigram(['n', 'n']), &[0, 2]);
        assert!(index.bigram(['q', 'q']).is_empty());
        // Registered per token: "anna svensson" yields no "a " or " s".
        assert!(index.bigram(['a', ' ']).is_empty());
        assert!(index.bigram([' ', 's']).is_empty());
    }

    #[test]
    fn empty_snapshot_builds_empty_index() {
        let index = SubjectIndex::build(&[]);
        assert!(index.is_empty());
        assert_eq!(index.handles().count(), 0);
        assert_eq!(index.exact("anna"), None);
    }

    #[test]
    fn candidate_entry_dedupes_aliases_and_tokens() {
        let subject = Subject::new("x", "Anna Svensson")
            .with_alias("Annie")
            .with_alias("ANNIE")
            .with_alias("  ")
            .with_alias("Anna S");
        let entry = CandidateEntry::derive(&subject, normalize(&subject.name));
        assert_eq!(entry.aliases, vec!["annie", "anna s"]);
        assert_eq!(entry.name_tokens, vec!["anna", "svensson"]);
        let tokens: Vec<&str> = entry.tokens.iter().map(String::as_str).collect();
        assert_eq!(tokens, vec!["anna", "annie", "s", "svensson"]);
    }
}
