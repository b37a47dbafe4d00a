//! Candidate generation: cheap exact lookups first, progressively falling back
//! to approximate strategies while the pool is still small.
//!
//! ```text
//! exact name/alias ─┬─ hit ──────────────────────────────► Exact
//!                   └─ miss → tokens (+prefix) → forced hints
//!                             → phonetic (pool < 8) → bigrams (pool < 8)
//!                             → arbitrary sample (pool empty) ──► Pool
//! ```
use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::index::{EntryHandle, ExactKind, SubjectIndex};
use crate::normalize::{bigrams, tokens};
use crate::phonex::encode_normalized;
use crate::schema::SubjectId;

/// Default ceiling on pool size, excluding forced candidates.
pub const MAX_CANDIDATES: usize = 40;
/// Below this pool size the phonetic and bigram stages run.
pub const SPARSE_POOL: usize = 8;
/// How many top bigram scorers join the pool.
pub const BIGRAM_TOP: usize = 20;
/// Size of the last-resort sample when every other stage came up empty.
pub const FALLBACK_SAMPLE: usize = 10;
/// Shortest query token expanded by prefix when it has no exact token hit.
const MIN_PREFIX_LEN: usize = 3;

/// Caller- and conversation-supplied ids that always join the pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hints<'a> {
    pub hint_id: Option<&'a str>,
    pub context_id: Option<&'a str>,
    /// Recently resolved ids for this conversation, most recent first.
    pub heat_ids: &'a [SubjectId],
}

impl<'a> Hints<'a> {
    fn forced(self) -> impl Iterator<Item = &'a str> {
        let heat: &'a [SubjectId] = self.heat_ids;
        self.hint_id
            .into_iter()
            .chain(self.context_id)
            .chain(heat.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidates {
    /// The query is exactly a primary name or alias; nothing else needs
    /// scoring.
    Exact { handle: EntryHandle, kind: ExactKind },
    /// Handles to score, in the order they were discovered.
    Pool(Vec<EntryHandle>),
}

impl Candidates {
    pub fn len(&self) -> usize {
        match self {
            Self::Exact { .. } => 1,
            Self::Pool(pool) => pool.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Insertion-ordered handle set with a soft size limit.
struct Pool {
    order: Vec<EntryHandle>,
    seen: HashSet<EntryHandle>,
    limit: usize,
}

impl Pool {
    fn new(limit: usize) -> Self {
        Self {
            order: Vec::new(),
            seen: HashSet::new(),
            limit,
        }
    }

    fn push(&mut self, handle: EntryHandle) {
        if self.order.len() < self.limit && self.seen.insert(handle) {
            self.order.push(handle);
        }
    }

    /// Forced candidates ignore the limit.
    fn force(&mut self, handle: EntryHandle) {
        if self.seen.insert(handle) {
            self.order.push(handle);
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn is_full(&self) -> bool {
        self.order.len() >= self.limit
    }
}

/// Produce the candidate set for an already-normalized query.
pub fn generate(
    query: &str,
    index: &SubjectIndex,
    hints: &Hints<'_>,
    limit: usize,
) -> Candidates {
    if let Some((handle, kind)) = index.exact(query) {
        trace!(handle, ?kind, "exact candidate");
        return Candidates::Exact { handle, kind };
    }

    let mut pool = Pool::new(limit);

    for token in tokens(query) {
        if pool.is_full() {
            break;
        }
        let hits = index.token(token);
        if !hits.is_empty() {
            hits.iter().for_each(|&h| pool.push(h));
        } else if token.chars().count() >= MIN_PREFIX_LEN {
            for handle in index.token_prefix(token, limit) {
                pool.push(handle);
            }
        }
    }
    trace!(size = pool.len(), "token candidates");

    for id in hints.forced() {
        if let Some(handle) = index.handle_of(id) {
            pool.force(handle);
        }
    }

    if pool.len() < SPARSE_POOL {
        add_phonetic(query, index, &mut pool);
        trace!(size = pool.len(), "after phonetic stage");
    }

    if pool.len() < SPARSE_POOL {
        add_bigrams(query, index, &mut pool);
        trace!(size = pool.len(), "after bigram stage");
    }

    if pool.order.is_empty() {
        index
            .handles()
            .take(FALLBACK_SAMPLE)
            .for_each(|h| pool.push(h));
        trace!(size = pool.len(), "fallback sample");
    }

    Candidates::Pool(pool.order)
}

fn add_phonetic(query: &str, index: &SubjectIndex, pool: &mut Pool) {
    let mut codes: Vec<String> = Vec::new();
    for form in std::iter::once(query).chain(tokens(query)) {
        let code = encode_normalized(form);
        if !code.is_empty() && !codes.contains(&code) {
            codes.push(code);
        }
    }
    for code in &codes {
        for entry in index.phonetic_bucket(code) {
            pool.push(entry.handle);
        }
    }
}

fn add_bigrams(query: &str, index: &SubjectIndex, pool: &mut Pool) {
    let query_pairs: HashSet<[char; 2]> = tokens(query).flat_map(bigrams).collect();
    if query_pairs.is_empty() {
        return;
    }

    let mut shared: HashMap<EntryHandle, usize> = HashMap::new();
    for pair in &query_pairs {
        for &handle in index.bigram(*pair) {
            *shared.entry(handle).or_default() += 1;
        }
    }

    let mut ranked: Vec<(EntryHandle, usize)> = shared.into_iter().collect();
    ranked.sort_by(|(lh, ls), (rh, rs)| rs.cmp(ls).then(lh.cmp(rh)));
    for (handle, _) in ranked.into_iter().take(BIGRAM_TOP) {
        pool.push(handle);
    }
}
