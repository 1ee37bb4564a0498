//! Similarity filter: exact and near-duplicate screening
//!
//! Comparison happens on normalized text (trimmed, case-folded). An exact
//! match anywhere wins over a near match.

use serde::{Deserialize, Serialize};

use crate::types::{normalize, ReasonCode};
use crate::NEAR_DUPLICATE_MAX_DISTANCE;

/// Why a candidate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectKind {
    ExactDuplicate,
    NearDuplicate,
}

impl RejectKind {
    pub fn reason(&self) -> ReasonCode {
        match self {
            RejectKind::ExactDuplicate => ReasonCode::S002_EXACT_DUPLICATE,
            RejectKind::NearDuplicate => ReasonCode::S002_NEAR_DUPLICATE,
        }
    }
}

/// Duplicate screen over previously accepted responses
#[derive(Debug, Clone)]
pub struct SimilarityFilter {
    max_distance: usize,
}

impl Default for SimilarityFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityFilter {
    pub fn new() -> Self {
        Self {
            max_distance: NEAR_DUPLICATE_MAX_DISTANCE,
        }
    }

    /// None when `candidate` may be accepted
    pub fn check<S: AsRef<str>>(&self, candidate: &str, accepted: &[S]) -> Option<RejectKind> {
        let candidate = normalize(candidate);
        let existing: Vec<String> = accepted.iter().map(|s| normalize(s.as_ref())).collect();

        if existing.iter().any(|e| *e == candidate) {
            return Some(RejectKind::ExactDuplicate);
        }
        if existing
            .iter()
            .any(|e| levenshtein(&candidate, e) <= self.max_distance)
        {
            return Some(RejectKind::NearDuplicate);
        }
        None
    }
}

/// Screen with the default distance threshold
pub fn is_rejected<S: AsRef<str>>(candidate: &str, accepted: &[S]) -> Option<RejectKind> {
    SimilarityFilter::new().check(candidate, accepted)
}

/// Levenshtein distance over chars; unit cost insert/delete/substitute
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (long, short) = if a.len() >= b.len() { (&a, &b) } else { (&b, &a) };

    if short.is_empty() {
        return long.len();
    }

    let mut previous: Vec<usize> = (0..=short.len()).collect();
    let mut current = vec![0usize; short.len() + 1];

    for (i, lc) in long.iter().enumerate() {
        current[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let insertion = previous[j + 1] + 1;
            let deletion = current[j] + 1;
            let substitution = previous[j] + usize::from(lc != sc);
            current[j + 1] = insertion.min(deletion).min(substitution);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[short.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "ab"), 2);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("build a wall", "build a wal"), 1);
    }

    #[test]
    fn test_levenshtein_is_symmetric() {
        assert_eq!(levenshtein("doorstop", "door stop"), levenshtein("door stop", "doorstop"));
    }

    #[test]
    fn test_transposition_costs_two() {
        assert_eq!(levenshtein("ab", "ba"), 2);
    }

    #[test]
    fn test_levenshtein_counts_chars_not_bytes() {
        assert_eq!(levenshtein("café", "cafe"), 1);
    }

    #[test]
    fn test_exact_duplicate_ignores_case_and_whitespace() {
        let accepted = vec!["Brick House"];
        assert_eq!(
            is_rejected(" brick house ", &accepted),
            Some(RejectKind::ExactDuplicate)
        );
    }

    #[test]
    fn test_near_duplicate_threshold() {
        let accepted = vec!["build a wall"];
        assert_eq!(is_rejected("build a wal", &accepted), Some(RejectKind::NearDuplicate));
        // distance exactly 2
        assert_eq!(is_rejected("build a ball!", &accepted), Some(RejectKind::NearDuplicate));
        assert_eq!(is_rejected("build the wall", &accepted), None);
    }

    #[test]
    fn test_exact_reported_before_near() {
        let accepted = vec!["use as doorstop", "build a wall"];
        assert_eq!(
            is_rejected("BUILD A WALL", &accepted),
            Some(RejectKind::ExactDuplicate)
        );
    }

    #[test]
    fn test_empty_history_accepts() {
        let accepted: Vec<String> = Vec::new();
        assert_eq!(is_rejected("anything", &accepted), None);
    }

    #[test]
    fn test_reject_kind_reasons() {
        assert_eq!(RejectKind::ExactDuplicate.reason(), ReasonCode::S002_EXACT_DUPLICATE);
        assert_eq!(RejectKind::NearDuplicate.reason(), ReasonCode::S002_NEAR_DUPLICATE);
    }
}
