//! The resolver: index lifecycle plus the result, context and heat caches.
//!
//! ```text
//! resolve(input)
//!   ├─ normalize → empty? ─────────────────────────────► None
//!   ├─ current generation (rebuild when older than index_ttl)
//!   ├─ result cache hit? ──────────────────────────────► cached
//!   ├─ exact name/alias ───────────────────────────────► 1.00 / 0.95
//!   ├─ heat pass: this conversation's recent subjects
//!   │     best ≥ heat_accept_confidence ───────────────► heat match
//!   └─ candidates → pick_best (floors for hint/context/relation)
//! ```
//!
//! Index generations are immutable and published through an [`ArcSwapOption`],
//! so readers never block on a rebuild.  Every cached value carries the
//! generation number it was computed against and is ignored under any other.
mod cache;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use kindred_config::ResolverConfig;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::candidates::{self, Candidates, Hints};
use crate::index::{IndexStats, SubjectIndex};
use crate::normalize::normalize;
use crate::relation::RelationTerms;
use crate::schema::SubjectId;
use crate::scorer::{self, Resolution, ScoreOptions};
use crate::store::SubjectSource;

use cache::{ResultKey, TtlCache};

/// Largest accepted `max_distance`; names are short and larger bounds only
/// admit noise.
pub const MAX_DISTANCE_CEILING: usize = 8;

/// Runtime form of [`ResolverConfig`].
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub index_ttl: Duration,
    pub result_cache_capacity: usize,
    pub result_cache_ttl: Duration,
    pub context_cache_capacity: usize,
    pub context_ttl: Duration,
    pub heat_capacity: usize,
    pub heat_ttl: Duration,
    pub heat_size: usize,
    pub max_distance: usize,
    pub max_candidates: usize,
    pub heat_accept_confidence: f32,
    pub relation_terms: RelationTerms,
}

impl From<&ResolverConfig> for ResolverOptions {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            index_ttl: config.index_ttl(),
            result_cache_capacity: config.result_cache_capacity,
            result_cache_ttl: config.result_cache_ttl(),
            context_cache_capacity: config.context_cache_capacity,
            context_ttl: config.context_ttl(),
            heat_capacity: config.heat_capacity,
            heat_ttl: config.heat_ttl(),
            heat_size: config.heat_size.max(1),
            max_distance: config.max_distance.min(MAX_DISTANCE_CEILING),
            max_candidates: config.max_candidates.max(1),
            heat_accept_confidence: config.heat_accept_confidence,
            relation_terms: RelationTerms::with_extra(&config.extra_relation_terms),
        }
    }
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::from(&ResolverConfig::default())
    }
}

/// One resolution request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveInput {
    /// Raw mention as written by the user.
    pub text: String,
    /// Subject the caller believes is meant.
    pub hint_subject_id: Option<SubjectId>,
    /// BCP-47-ish language tag of the conversation (`"sv"`, `"en-GB"`).
    pub context_lang: Option<String>,
    /// Conversation identifier; enables the context and heat caches.
    pub context_key: Option<String>,
}

impl ResolveInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_hint(mut self, subject_id: impl Into<SubjectId>) -> Self {
        self.hint_subject_id = Some(subject_id.into());
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.context_lang = Some(lang.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>) -> Self {
        self.context_key = Some(key.into());
        self
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Default)]
pub struct ResolverStats {
    /// Number of the published index generation, if any.
    pub generation: Option<u64>,
    pub index_age: Option<Duration>,
    pub index: IndexStats,
    pub result_cache_len: usize,
    pub context_cache_len: usize,
    pub heat_cache_len: usize,
    pub result_hits: u64,
    pub result_misses: u64,
    /// Result-cache hit rate as a percentage 0.0 – 100.0.
    pub hit_rate_pct: f32,
    /// Resolutions answered by the heat pass.
    pub heat_hits: u64,
    pub rebuilds: u64,
    pub store_failures: u64,
}

struct Generation {
    number: u64,
    built_at: Instant,
    index: SubjectIndex,
}

impl Generation {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.built_at.elapsed() < ttl
    }
}

#[derive(Default)]
struct Counters {
    result_hits: AtomicU64,
    result_misses: AtomicU64,
    heat_hits: AtomicU64,
    rebuilds: AtomicU64,
    store_failures: AtomicU64,
}

/// Resolves free-text mentions to subject ids.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Resolver {
    source: Arc<dyn SubjectSource>,
    options: ResolverOptions,
    current: ArcSwapOption<Generation>,
    /// Serializes rebuilds; readers never take it.
    rebuild: Mutex<()>,
    next_generation: AtomicU64,
    /// Bumped by [`Resolver::invalidate`]; a rebuild that straddles an
    /// invalidation does not publish its (possibly stale) snapshot.
    invalidations: AtomicU64,
    results: TtlCache<ResultKey, Option<Resolution>>,
    /// Context key → last resolved subject.
    contexts: TtlCache<String, SubjectId>,
    /// Context key → recently resolved subjects, most recent first.
    heat: TtlCache<String, Vec<SubjectId>>,
    counters: Counters,
}

impl Resolver {
    pub fn new(source: Arc<dyn SubjectSource>, options: ResolverOptions) -> Self {
        Self {
            results: TtlCache::new(options.result_cache_capacity, options.result_cache_ttl),
            contexts: TtlCache::new(options.context_cache_capacity, options.context_ttl),
            heat: TtlCache::new(options.heat_capacity, options.heat_ttl),
            source,
            options,
            current: ArcSwapOption::empty(),
            rebuild: Mutex::new(()),
            next_generation: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    pub fn from_config(source: Arc<dyn SubjectSource>, config: &ResolverConfig) -> Self {
        Self::new(source, ResolverOptions::from(config))
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve one mention.  `None` means no subject is close enough; a store
    /// failure with no previously built index also yields `None`.
    pub async fn resolve(&self, input: &ResolveInput) -> Option<Resolution> {
        let query = normalize(&input.text);
        if query.is_empty() {
            trace!(text = %input.text, "query normalizes to nothing");
            return None;
        }

        let generation = self.current_generation().await?;
        let key = ResultKey::new(input);
        if let Some(cached) = self.results.get(&key, generation.number) {
            self.counters.result_hits.fetch_add(1, Ordering::Relaxed);
            debug!(query = %query, "result cache hit");
            if let (Some(context), Some(resolution)) = (input.context_key.as_deref(), cached.as_ref()) {
                self.record_context(context, &resolution.subject_id, generation.number);
            }
            return cached;
        }
        self.counters.result_misses.fetch_add(1, Ordering::Relaxed);

        let outcome = self.resolve_uncached(&query, input, &generation);
        debug!(
            query = %query,
            generation = generation.number,
            subject = outcome.as_ref().map(|r| r.subject_id.as_str()),
            confidence = outcome.as_ref().map(|r| r.confidence),
            "resolved"
        );

        if let (Some(context), Some(resolution)) = (input.context_key.as_deref(), outcome.as_ref()) {
            self.record_context(context, &resolution.subject_id, generation.number);
        }
        self.results.put(key, generation.number, outcome.clone());
        outcome
    }

    fn resolve_uncached(&self, query: &str, input: &ResolveInput, generation: &Generation) -> Option<Resolution> {
        let index = &generation.index;

        if let Some((handle, kind)) = index.exact(query) {
            let opts = ScoreOptions {
                max_distance: self.options.max_distance,
                hint_id: input.hint_subject_id.as_deref(),
                ..ScoreOptions::default()
            };
            return scorer::evaluate_exact(handle, kind, index, &opts)?.into_resolution(index);
        }

        let context_key = input.context_key.as_deref();
        let context_id = context_key.and_then(|key| self.contexts.get(&key.to_string(), generation.number));
        let heat_ids: Vec<SubjectId> = context_key
            .and_then(|key| self.heat.get(&key.to_string(), generation.number))
            .unwrap_or_default();

        if let Some(hit) = self.heat_pass(query, index, &heat_ids) {
            return hit.into_resolution(index);
        }

        let relational = self
            .options
            .relation_terms
            .mentions(query, input.context_lang.as_deref());
        let hints = Hints {
            hint_id: input.hint_subject_id.as_deref(),
            context_id: context_id.as_deref(),
            heat_ids: &heat_ids,
        };
        let opts = ScoreOptions {
            max_distance: self.options.max_distance,
            hint_id: hints.hint_id,
            context_id: hints.context_id,
            heat_ids: &heat_ids,
            relational,
        };

        let best = match candidates::generate(query, index, &hints, self.options.max_candidates) {
            Candidates::Exact { handle, kind } => scorer::evaluate_exact(handle, kind, index, &opts),
            Candidates::Pool(handles) => {
                trace!(candidates = handles.len(), relational, "scoring candidate pool");
                scorer::pick_best(query, &handles, index, &opts)
            }
        };
        best?.into_resolution(index)
    }

    /// Score only the conversation's recent subjects, without floors.  A
    /// strong genuine match here skips the full pipeline.
    fn heat_pass(&self, query: &str, index: &SubjectIndex, heat_ids: &[SubjectId]) -> Option<scorer::Scored> {
        if heat_ids.is_empty() {
            return None;
        }
        let handles: Vec<_> = heat_ids.iter().filter_map(|id| index.handle_of(id)).collect();
        let opts = ScoreOptions {
            max_distance: self.options.max_distance,
            ..ScoreOptions::default()
        };
        let best = scorer::pick_best(query, &handles, index, &opts)?;
        if best.confidence < self.options.heat_accept_confidence {
            return None;
        }
        self.counters.heat_hits.fetch_add(1, Ordering::Relaxed);
        trace!(handle = best.handle, confidence = best.confidence, "heat pass accepted");
        Some(best)
    }

    /// Remember `subject_id` as the conversation's latest subject.
    ///
    /// Cached results for the conversation depend on its context and heat, so
    /// they are dropped whenever either changes.
    fn record_context(&self, context: &str, subject_id: &str, generation: u64) {
        let key = context.to_string();
        let previous = self.contexts.get(&key, generation);
        self.contexts.put(key.clone(), generation, subject_id.to_string());

        let heat_size = self.options.heat_size;
        let mut joined = false;
        self.heat.upsert(key, generation, |current| {
            let mut recent = current.unwrap_or_default();
            match recent.iter().position(|id| id == subject_id) {
                Some(pos) => {
                    recent.remove(pos);
                }
                None => joined = true,
            }
            recent.insert(0, subject_id.to_string());
            recent.truncate(heat_size);
            recent
        });

        if joined || previous.as_deref() != Some(subject_id) {
            let dropped = self.results.remove_where(|k| k.context.as_deref() == Some(context));
            if dropped > 0 {
                trace!(context, dropped, "conversation changed, dropped cached results");
            }
        }
    }

    /// Recently resolved subjects for a conversation, most recent first.
    pub fn recent_subjects(&self, context_key: &str) -> Vec<SubjectId> {
        let Some(generation) = self.current.load_full() else {
            return Vec::new();
        };
        self.heat
            .get(&context_key.to_string(), generation.number)
            .unwrap_or_default()
    }

    /// Drop the index and every cache.  The next `resolve` rebuilds from a
    /// fresh store snapshot.
    pub fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.current.store(None);
        self.clear_caches();
        info!("subject resolver invalidated");
    }

    /// Forget one conversation's context, heat and cached results.
    pub fn invalidate_context(&self, context_key: &str) {
        let key = context_key.to_string();
        self.contexts.remove(&key);
        self.heat.remove(&key);
        let dropped = self
            .results
            .remove_where(|k| k.context.as_deref() == Some(context_key));
        debug!(context = context_key, dropped, "conversation context invalidated");
    }

    pub fn stats(&self) -> ResolverStats {
        let generation = self.current.load_full();
        let hits = self.counters.result_hits.load(Ordering::Relaxed);
        let misses = self.counters.result_misses.load(Ordering::Relaxed);
        ResolverStats {
            generation: generation.as_ref().map(|g| g.number),
            index_age: generation.as_ref().map(|g| g.built_at.elapsed()),
            index: generation.as_ref().map(|g| g.index.stats()).unwrap_or_default(),
            result_cache_len: self.results.len(),
            context_cache_len: self.contexts.len(),
            heat_cache_len: self.heat.len(),
            result_hits: hits,
            result_misses: misses,
            hit_rate_pct: if hits + misses == 0 {
                0.0
            } else {
                (hits as f32 / (hits + misses) as f32) * 100.0
            },
            heat_hits: self.counters.heat_hits.load(Ordering::Relaxed),
            rebuilds: self.counters.rebuilds.load(Ordering::Relaxed),
            store_failures: self.counters.store_failures.load(Ordering::Relaxed),
        }
    }

    fn clear_caches(&self) {
        self.results.clear();
        self.contexts.clear();
        self.heat.clear();
    }

    /// The generation to resolve against, rebuilding first when it is missing
    /// or older than `index_ttl`.
    async fn current_generation(&self) -> Option<Arc<Generation>> {
        let ttl = self.options.index_ttl;
        if let Some(generation) = self.current.load_full() {
            if generation.is_fresh(ttl) {
                return Some(generation);
            }
        }

        let _guard = self.rebuild.lock().await;
        // Someone else may have rebuilt while we waited for the lock.
        let existing = self.current.load_full();
        if let Some(generation) = existing.as_ref() {
            if generation.is_fresh(ttl) {
                return Some(Arc::clone(generation));
            }
        }

        let epoch = self.invalidations.load(Ordering::SeqCst);
        let subjects = match self.source.list().await {
            Ok(subjects) => subjects,
            Err(err) => {
                self.counters.store_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %err,
                    serving = existing.as_ref().map(|g| g.number),
                    "subject store snapshot failed, keeping previous index"
                );
                return existing;
            }
        };

        let number = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let generation = Arc::new(Generation {
            number,
            built_at: Instant::now(),
            index: SubjectIndex::build(&subjects),
        });

        if self.invalidations.load(Ordering::SeqCst) != epoch {
            debug!(generation = number, "invalidated during rebuild, not publishing");
            return Some(generation);
        }

        self.current.store(Some(Arc::clone(&generation)));
        self.clear_caches();
        self.counters.rebuilds.fetch_add(1, Ordering::Relaxed);
        info!(
            generation = number,
            subjects = generation.index.len(),
            "subject index published"
        );
        Some(generation)
    }
}
