//! Match evaluation and the confidence model.
//!
//! Base confidence by edit distance and what the query matched:
//!
//! | distance | primary | alias | other |
//! |----------|---------|-------|-------|
//! | 0        | 1.00    | 0.95  | 0.90  |
//! | 1        | 0.92    | 0.90  | 0.85  |
//! | 2        | 0.85    | 0.80  | 0.80  |
//!
//! "Other" is a later token of the primary name, typically a surname.
//! Floors lift the result when the conversation vouches for a candidate:
//! hint id 0.78, context id 0.76, relational wording 0.60.  The relation floor
//! applies to every candidate; among relation rescues, subjects from the
//! conversation's heat list win ties.
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::distance::bounded_levenshtein_chars;
use crate::index::{CandidateEntry, EntryHandle, ExactKind, SubjectIndex};
use crate::schema::SubjectId;

pub const HINT_FLOOR: f32 = 0.78;
pub const CONTEXT_FLOOR: f32 = 0.76;
pub const RELATION_FLOOR: f32 = 0.60;
/// A match at least this good ends the search early when its distance is 0.
pub const EARLY_EXIT_CONFIDENCE: f32 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Full primary name or its first token.
    Primary,
    Alias,
    /// A later primary-name token, e.g. the surname.
    Other,
    /// Accepted because the caller or conversation pointed at this subject.
    Context,
    /// Rescued by relational wording ("chefen", "my mom").
    Relation,
}

impl MatchType {
    /// Tie-break rank when two forms are at the same distance.
    fn rank(self) -> u8 {
        match self {
            Self::Primary => 0,
            Self::Alias => 1,
            Self::Other => 2,
            Self::Context => 3,
            Self::Relation => 4,
        }
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub subject_id: SubjectId,
    pub confidence: f32,
    pub distance: usize,
    pub match_type: MatchType,
}

/// Per-query scoring inputs shared by every candidate.
#[derive(Debug, Clone, Copy)]
pub struct ScoreOptions<'a> {
    pub max_distance: usize,
    pub hint_id: Option<&'a str>,
    pub context_id: Option<&'a str>,
    pub heat_ids: &'a [SubjectId],
    /// The query contains a relational word.
    pub relational: bool,
}

impl Default for ScoreOptions<'_> {
    fn default() -> Self {
        Self {
            max_distance: 2,
            hint_id: None,
            context_id: None,
            heat_ids: &[],
            relational: false,
        }
    }
}

/// A scored candidate, before it is turned into a [`Resolution`].
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub handle: EntryHandle,
    pub distance: usize,
    pub confidence: f32,
    pub match_type: MatchType,
    trust: f32,
    /// Member of the conversation's heat list.
    hot: bool,
}

impl Scored {
    pub fn into_resolution(self, index: &SubjectIndex) -> Option<Resolution> {
        let entry = index.entry(self.handle)?;
        Some(Resolution {
            subject_id: entry.id.clone(),
            confidence: self.confidence,
            distance: self.distance,
            match_type: self.match_type,
        })
    }

    fn is_conclusive(&self) -> bool {
        self.distance == 0 && self.confidence >= EARLY_EXIT_CONFIDENCE
    }

    /// `true` when `self` should replace `other` as the current best.
    fn beats(&self, other: &Scored) -> bool {
        if self.distance != other.distance {
            return self.distance < other.distance;
        }
        if self.confidence != other.confidence {
            return self.confidence > other.confidence;
        }
        if self.match_type == MatchType::Relation
            && other.match_type == MatchType::Relation
            && self.hot != other.hot
        {
            return self.hot;
        }
        self.trust > other.trust
    }
}

/// Base confidence for a distance and match kind.
///
/// Distances beyond the table (only reachable with `max_distance > 2`) lose a
/// further 0.05 per step, never dropping below 0.5.
pub fn base_confidence(distance: usize, kind: MatchType) -> f32 {
    let column = match kind {
        MatchType::Primary => [1.00, 0.92, 0.85],
        MatchType::Alias => [0.95, 0.90, 0.80],
        MatchType::Other | MatchType::Context | MatchType::Relation => [0.90, 0.85, 0.80],
    };
    match column.get(distance) {
        Some(&value) => value,
        None => (column[2] - 0.05 * (distance - 2) as f32).max(0.5),
    }
}

/// Smallest bounded distance between the query and any form of the entry,
/// with the kind of form that produced it.
fn closest_form(query: &[char], single_token: bool, entry: &CandidateEntry, max: usize) -> (usize, MatchType) {
    let mut best = (max.saturating_add(1), MatchType::Primary);
    let mut consider = |form: &str, kind: MatchType| {
        let form: Vec<char> = form.chars().collect();
        let distance = bounded_levenshtein_chars(query, &form, max);
        if distance < best.0 || (distance == best.0 && kind.rank() < best.1.rank()) {
            best = (distance, kind);
        }
    };

    consider(&entry.name, MatchType::Primary);
    for alias in &entry.aliases {
        consider(alias, MatchType::Alias);
    }
    if single_token {
        if entry.name_tokens.len() > 1 {
            for (i, token) in entry.name_tokens.iter().enumerate() {
                consider(token, if i == 0 { MatchType::Primary } else { MatchType::Other });
            }
        }
        for alias in entry.aliases.iter().filter(|a| a.contains(' ')) {
            for token in alias.split(' ') {
                consider(token, MatchType::Alias);
            }
        }
    }
    best
}

/// Score one candidate against an already-normalized query.
///
/// Returns `None` when the best distance exceeds `max_distance` and no floor
/// rescues the candidate.
pub fn evaluate(query: &str, handle: EntryHandle, index: &SubjectIndex, opts: &ScoreOptions<'_>) -> Option<Scored> {
    let entry = index.entry(handle)?;
    let chars: Vec<char> = query.chars().collect();
    let single_token = !query.contains(' ');
    let (distance, kind) = closest_form(&chars, single_token, entry, opts.max_distance);
    let scored = apply_floors(handle, entry, distance, kind, opts);
    trace!(
        id = %entry.id,
        distance,
        kind = ?kind,
        confidence = scored.as_ref().map(|s| s.confidence),
        "scored candidate"
    );
    scored
}

/// Score an exact primary-name or alias hit.
pub fn evaluate_exact(handle: EntryHandle, kind: ExactKind, index: &SubjectIndex, opts: &ScoreOptions<'_>) -> Option<Scored> {
    let entry = index.entry(handle)?;
    let kind = match kind {
        ExactKind::Primary => MatchType::Primary,
        ExactKind::Alias => MatchType::Alias,
    };
    apply_floors(handle, entry, 0, kind, opts)
}

fn apply_floors(
    handle: EntryHandle,
    entry: &CandidateEntry,
    distance: usize,
    kind: MatchType,
    opts: &ScoreOptions<'_>,
) -> Option<Scored> {
    let is_hint = opts.hint_id == Some(entry.id.as_str());
    let is_context = opts.context_id == Some(entry.id.as_str());
    let is_heat = opts.heat_ids.iter().any(|id| *id == entry.id);

    let (confidence, match_type) = if distance > opts.max_distance {
        if is_hint {
            (HINT_FLOOR, MatchType::Context)
        } else if is_context {
            (CONTEXT_FLOOR, MatchType::Context)
        } else if opts.relational {
            (RELATION_FLOOR, MatchType::Relation)
        } else {
            return None;
        }
    } else {
        let mut confidence = base_confidence(distance, kind);
        let mut match_type = kind;
        if is_hint {
            confidence = confidence.max(HINT_FLOOR);
            match_type = MatchType::Context;
        }
        if is_context && CONTEXT_FLOOR > confidence {
            confidence = CONTEXT_FLOOR;
            match_type = MatchType::Context;
        }
        if opts.relational && RELATION_FLOOR > confidence {
            confidence = RELATION_FLOOR;
            match_type = MatchType::Relation;
        }
        (confidence, match_type)
    };

    Some(Scored {
        handle,
        distance: distance.min(opts.max_distance.saturating_add(1)),
        confidence: confidence.min(1.0),
        match_type,
        trust: entry.trust,
        hot: is_heat,
    })
}

/// Score `handles` in order and keep the best: smallest distance, then
/// highest confidence, then highest trust, then earliest candidate.  Stops as
/// soon as a distance-0 match with confidence ≥ 0.95 turns up.
pub fn pick_best(
    query: &str,
    handles: &[EntryHandle],
    index: &SubjectIndex,
    opts: &ScoreOptions<'_>,
) -> Option<Scored> {
    let mut best: Option<Scored> = None;
    for &handle in handles {
        let Some(scored) = evaluate(query, handle, index, opts) else {
            continue;
        };
        let conclusive = scored.is_conclusive();
        if best.as_ref().is_none_or(|current| scored.beats(current)) {
            best = Some(scored);
        }
        if conclusive {
            break;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Subject;

    fn index() -> SubjectIndex {
        SubjectIndex::build(&[
            Subject::new("anna", "Anna Svensson").with_alias("Annie"),
            Subject::new("bjorn", "Björn").with_trust(0.9),
            Subject::new("bjarn", "Bjarn").with_trust(0.2),
            Subject::new("mamma", "Karin Lind").with_alias("Mamma"),
        ])
    }

    #[test]
    fn table_is_monotonic_in_distance() {
        for kind in [MatchType::Primary, MatchType::Alias, MatchType::Other] {
            assert!(base_confidence(1, kind) < base_confidence(0, kind));
            assert!(base_confidence(2, kind) < base_confidence(1, kind));
        }
        assert_eq!(base_confidence(0, MatchType::Primary), 1.0);
        assert_eq!(base_confidence(0, MatchType::Alias), 0.95);
        assert_eq!(base_confidence(2, MatchType::Other), 0.80);
        assert!((base_confidence(3, MatchType::Primary) - 0.80).abs() < 1e-6);
        assert_eq!(base_confidence(40, MatchType::Primary), 0.5);
    }

    #[test]
    fn misspelled_given_name_matches_primary_token() {
        let index = index();
        let scored = evaluate("ana", 0, &index, &ScoreOptions::default()).unwrap();
        assert_eq!(scored.distance, 1);
        assert_eq!(scored.match_type, MatchType::Primary);
        assert!(scored.confidence >= 0.85);
    }

    #[test]
    fn surname_only_match_is_other() {
        let index = index();
        let scored = evaluate("svenson", 0, &index, &ScoreOptions::default()).unwrap();
        assert_eq!(scored.distance, 1);
        assert_eq!(scored.match_type, MatchType::Other);
        assert!((scored.confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn alias_typo_scores_as_alias() {
        let index = index();
        let scored = evaluate("anni", 0, &index, &ScoreOptions::default()).unwrap();
        // "anni" is one edit from both "anna" (primary token) and "annie";
        // primary wins the tie.
        assert_eq!(scored.match_type, MatchType::Primary);
        let scored = evaluate("anniee", 0, &index, &ScoreOptions::default()).unwrap();
        assert_eq!(scored.match_type, MatchType::Alias);
        assert!((scored.confidence - 0.90).abs() < 1e-6);
    }

    #[test]
    fn out_of_bound_candidates_are_rejected_without_floors() {
        let index = index();
        assert!(evaluate("zlatan", 1, &index, &ScoreOptions::default()).is_none());
    }

    #[test]
    fn hint_rescues_with_context_label() {
        let index = index();
        let opts = ScoreOptions {
            hint_id: Some("bjorn"),
            relational: true,
            ..ScoreOptions::default()
        };
        let scored = evaluate("chefen", 1, &index, &opts).unwrap();
        assert_eq!(scored.match_type, MatchType::Context);
        assert!((scored.confidence - HINT_FLOOR).abs() < 1e-6);
        assert_eq!(scored.distance, 3);
    }

    #[test]
    fn hint_relabels_in_bound_match_but_keeps_table_confidence() {
        let index = index();
        let opts = ScoreOptions {
            hint_id: Some("bjorn"),
            ..ScoreOptions::default()
        };
        let scored = evaluate("bjorn", 1, &index, &opts).unwrap();
        assert_eq!(scored.match_type, MatchType::Context);
        assert_eq!(scored.confidence, 1.0);
    }

    #[test]
    fn context_rescue_uses_context_floor() {
        let index = index();
        let opts = ScoreOptions {
            context_id: Some("bjorn"),
            ..ScoreOptions::default()
        };
        let scored = evaluate("honom", 1, &index, &opts).unwrap();
        assert!((scored.confidence - CONTEXT_FLOOR).abs() < 1e-6);
    }

    #[test]
    fn relational_wording_rescues_any_candidate() {
        let index = index();
        let opts = ScoreOptions {
            relational: true,
            ..ScoreOptions::default()
        };
        let scored = evaluate("chefen", 1, &index, &opts).unwrap();
        assert_eq!(scored.match_type, MatchType::Relation);
        assert_eq!(scored.confidence, RELATION_FLOOR);
        assert_eq!(scored.distance, 3);
        // Without relational wording the same candidate is out of bound.
        assert!(evaluate("chefen", 1, &index, &ScoreOptions::default()).is_none());
    }

    #[test]
    fn heat_member_wins_among_relation_rescues() {
        let index = index();
        // "bjorn" outranks "bjarn" on trust alone.
        let opts = ScoreOptions {
            relational: true,
            ..ScoreOptions::default()
        };
        let best = pick_best("chefen", &[2, 1], &index, &opts).unwrap();
        assert_eq!(best.handle, 1);

        let heat = vec!["bjarn".to_string()];
        let warm = ScoreOptions {
            heat_ids: &heat,
            ..opts
        };
        let best = pick_best("chefen", &[1, 2], &index, &warm).unwrap();
        assert_eq!(best.handle, 2);
        assert_eq!(best.match_type, MatchType::Relation);
    }

    #[test]
    fn exact_alias_scores_point_nine_five() {
        let index = index();
        let scored = evaluate_exact(3, ExactKind::Alias, &index, &ScoreOptions::default()).unwrap();
        assert_eq!(scored.confidence, 0.95);
        assert_eq!(scored.match_type, MatchType::Alias);
    }

    #[test]
    fn pick_best_prefers_distance_then_confidence_then_trust() {
        let index = index();
        // "bjorn" is exact for handle 1 and one edit from "bjarn".
        let best = pick_best("bjorn", &[2, 1], &index, &ScoreOptions::default()).unwrap();
        assert_eq!(best.handle, 1);

        // "bjurn" is one edit from both; trust breaks the tie.
        let best = pick_best("bjurn", &[2, 1], &index, &ScoreOptions::default()).unwrap();
        assert_eq!(best.handle, 1);
        let best = pick_best("bjurn", &[1, 2], &index, &ScoreOptions::default()).unwrap();
        assert_eq!(best.handle, 1);
    }

    #[test]
    fn in_bound_match_beats_rescued_hint() {
        let index = index();
        let opts = ScoreOptions {
            hint_id: Some("bjorn"),
            ..ScoreOptions::default()
        };
        let best = pick_best("ana", &[1, 0], &index, &opts).unwrap();
        assert_eq!(best.handle, 0);
        let resolution = best.into_resolution(&index).unwrap();
        assert_eq!(resolution.subject_id, "anna");
    }

    #[test]
    fn match_type_serializes_lowercase() {
        let json = serde_json::to_string(&MatchType::Relation).unwrap();
        assert_eq!(json, "\"relation\"");
    }
}
