//! Session state machine
//!
//! NotStarted → PhaseActive(0) → PhaseActive(1) → PhaseActive(2) → Completed
//!
//! - `start_phase` stamps the phase clock and clears trial bookkeeping
//! - `next_phase` only advances the index; the driver must call
//!   `start_phase` for the new phase before querying its clock
//! - duplicate screening happens before `record_use`, in the driver

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

use crate::core::gateway::CategorizationGateway;
use crate::core::timer::{self, Marker};
use crate::error::SessionError;
use crate::types::{normalize, ObjectId, ObjectOrder, PhaseDef, ResponseRecord};
use crate::{EXTENSION_PHASE_INDEX, MAX_HINTS};

/// Per-participant phase state machine
#[derive(Debug)]
pub struct SessionState {
    /// Fixed at construction, never mutated
    phases: Vec<PhaseDef>,
    objects: ObjectOrder,
    hints_enabled: bool,
    phase_index: usize,
    /// None until `start_phase`, cleared again by `next_phase`
    phase_start: Option<Marker>,
    trial_count: u32,
    /// Normalized labels seen in the current phase
    used_categories: HashSet<String>,
}

impl SessionState {
    pub fn new(phases: Vec<PhaseDef>, objects: ObjectOrder, hints_enabled: bool) -> Self {
        Self {
            phases,
            objects,
            hints_enabled,
            phase_index: 0,
            phase_start: None,
            trial_count: 0,
            used_categories: HashSet::new(),
        }
    }

    /// (Re)start the current phase: clock, trial counter, used categories
    pub fn start_phase(&mut self) {
        self.phase_start = Some(timer::start());
        self.trial_count = 0;
        self.used_categories.clear();
        tracing::debug!(phase = self.phase_index, "phase started");
    }

    /// Advance to the next phase without starting it
    pub fn next_phase(&mut self) {
        self.phase_index += 1;
        self.phase_start = None;
    }

    /// Classify and record one already-screened response
    pub async fn record_use(
        &mut self,
        raw_text: &str,
        gateway: &CategorizationGateway,
    ) -> Result<ResponseRecord, SessionError> {
        let object = self.current_object()?;
        let marker = self
            .phase_start
            .ok_or(SessionError::PhaseNotStarted(self.phase_index))?;

        self.trial_count += 1;
        let trial = self.trial_count;
        let response_time_secs = timer::elapsed(&marker);

        let category = gateway.classify(raw_text, object).await;
        if !category.is_disqualified() {
            self.used_categories.insert(category.normalized());
        }

        Ok(ResponseRecord {
            trial,
            use_text: raw_text.to_string(),
            category,
            response_time_secs,
            phase_index: self.phase_index,
            object,
        })
    }

    /// Up to three unused suggestion labels, randomly chosen
    pub fn get_hint(&self) -> Vec<String> {
        self.get_hint_with_rng(&mut rand::thread_rng())
    }

    pub fn get_hint_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        if !self.hints_enabled || self.phase_index != EXTENSION_PHASE_INDEX {
            return Vec::new();
        }
        let Ok(object) = self.current_object() else {
            return Vec::new();
        };

        let remaining: Vec<&str> = object
            .suggestions()
            .iter()
            .copied()
            .filter(|s| !self.used_categories.contains(&normalize(s)))
            .collect();

        remaining
            .choose_multiple(rng, MAX_HINTS)
            .map(|s| s.to_string())
            .collect()
    }

    /// Phase definition at the current index
    pub fn current_phase(&self) -> Result<&PhaseDef, SessionError> {
        self.phases.get(self.phase_index).ok_or(SessionError::Completed)
    }

    /// First object for phases 0-1, second afterwards
    pub fn current_object(&self) -> Result<ObjectId, SessionError> {
        if self.is_complete() {
            return Err(SessionError::Completed);
        }
        Ok(self.objects.for_phase(self.phase_index))
    }

    pub fn is_complete(&self) -> bool {
        self.phase_index >= self.phases.len()
    }

    /// Seconds since phase start; None before `start_phase`
    pub fn elapsed(&self) -> Option<f64> {
        self.phase_start.as_ref().map(timer::elapsed)
    }

    /// Seconds left in the current phase; None if not running
    pub fn remaining_secs(&self) -> Option<f64> {
        let marker = self.phase_start.as_ref()?;
        let phase = self.current_phase().ok()?;
        Some(timer::remaining(marker, phase.duration_secs))
    }

    /// Fresh check of the phase budget
    pub fn phase_expired(&self) -> bool {
        match (self.elapsed(), self.current_phase()) {
            (Some(elapsed), Ok(phase)) => elapsed >= phase.duration_secs as f64,
            _ => false,
        }
    }

    pub fn phase_started(&self) -> bool {
        self.phase_start.is_some()
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    pub fn hints_enabled(&self) -> bool {
        self.hints_enabled
    }

    pub fn trial_count(&self) -> u32 {
        self.trial_count
    }

    pub fn used_categories(&self) -> &HashSet<String> {
        &self.used_categories
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gateway::Categorizer;
    use crate::error::GatewayError;
    use crate::types::{default_phases, CategoryLabel, Reconciliation};
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    /// Labels by keyword so tests control the category
    struct KeywordCategorizer;

    #[async_trait]
    impl Categorizer for KeywordCategorizer {
        async fn classify(
            &self,
            text: &str,
            _: ObjectId,
            _: &[&str],
        ) -> Result<String, GatewayError> {
            Ok(if text.contains("wall") {
                "Building/Construction".to_string()
            } else if text.contains("asdf") {
                "Disqualified".to_string()
            } else if text.contains("doorstop") {
                "furniture support/leveling".to_string()
            } else {
                "Uncategorized".to_string()
            })
        }

        async fn reconcile(
            &self,
            _: ObjectId,
            _: &[String],
        ) -> Result<Reconciliation, GatewayError> {
            Ok(Reconciliation::default())
        }
    }

    fn gateway() -> CategorizationGateway {
        CategorizationGateway::new(Arc::new(KeywordCategorizer))
    }

    fn brick_first(hints: bool) -> SessionState {
        SessionState::new(
            default_phases(),
            ObjectOrder::new(ObjectId::Brick, ObjectId::Newspaper),
            hints,
        )
    }

    #[test]
    fn test_elapsed_small_after_start() {
        let mut s = brick_first(true);
        assert!(s.elapsed().is_none());
        s.start_phase();
        let e = s.elapsed().unwrap();
        assert!((0.0..0.1).contains(&e));
        assert!(!s.phase_expired());
    }

    #[tokio::test]
    async fn test_record_use_counts_trials() {
        let mut s = brick_first(false);
        s.start_phase();
        let gw = gateway();

        let first = s.record_use("build a wall", &gw).await.unwrap();
        assert_eq!(first.trial, 1);
        assert_eq!(s.trial_count(), 1);
        assert_eq!(first.object, ObjectId::Brick);

        let second = s.record_use("use as doorstop", &gw).await.unwrap();
        assert_eq!(second.trial, 2);
        assert_eq!(
            second.category,
            CategoryLabel::Category("Furniture Support/Leveling".into())
        );

        s.start_phase();
        assert_eq!(s.trial_count(), 0);
        assert!(s.used_categories().is_empty());
    }

    #[tokio::test]
    async fn test_disqualified_not_added_to_used() {
        let mut s = brick_first(true);
        s.start_phase();
        let gw = gateway();
        s.record_use("asdf", &gw).await.unwrap();
        s.record_use("build a wall", &gw).await.unwrap();

        assert!(!s.used_categories().contains("disqualified"));
        assert!(s.used_categories().contains("building/construction"));
    }

    #[tokio::test]
    async fn test_record_use_requires_started_phase() {
        let mut s = brick_first(true);
        let err = s.record_use("build a wall", &gateway()).await.unwrap_err();
        assert_eq!(err, SessionError::PhaseNotStarted(0));
    }

    #[test]
    fn test_next_phase_does_not_start_clock() {
        let mut s = brick_first(true);
        s.start_phase();
        s.next_phase();
        assert_eq!(s.phase_index(), 1);
        assert!(!s.phase_started());
        assert!(s.remaining_secs().is_none());
    }

    #[test]
    fn test_current_object_switches_for_transfer() {
        let mut s = brick_first(true);
        assert_eq!(s.current_object().unwrap(), ObjectId::Brick);
        s.next_phase();
        assert_eq!(s.current_object().unwrap(), ObjectId::Brick);
        s.next_phase();
        assert_eq!(s.current_object().unwrap(), ObjectId::Newspaper);
    }

    #[test]
    fn test_completion_after_last_phase() {
        let mut s = brick_first(true);
        for _ in 0..3 {
            assert!(!s.is_complete());
            s.next_phase();
        }
        assert!(s.is_complete());
        assert_eq!(s.current_phase().unwrap_err(), SessionError::Completed);
        assert_eq!(s.current_object().unwrap_err(), SessionError::Completed);
        assert!(s.get_hint().is_empty());
    }

    #[test]
    fn test_hints_only_in_extension_phase() {
        let mut s = brick_first(true);
        s.start_phase();
        assert!(s.get_hint().is_empty());

        s.next_phase();
        s.start_phase();
        assert_eq!(s.get_hint().len(), MAX_HINTS);

        s.next_phase();
        s.start_phase();
        assert!(s.get_hint().is_empty());
    }

    #[test]
    fn test_hints_disabled_group_gets_none() {
        let mut s = brick_first(false);
        s.next_phase();
        s.start_phase();
        assert!(s.get_hint().is_empty());
    }

    #[tokio::test]
    async fn test_hints_exclude_used_categories() {
        let mut s = brick_first(true);
        s.next_phase();
        s.start_phase();
        s.record_use("build a wall", &gateway()).await.unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let hints = s.get_hint_with_rng(&mut rng);
            assert_eq!(hints.len(), MAX_HINTS);
            assert!(hints.iter().all(|h| !s.used_categories().contains(&normalize(h))));
        }
    }

    #[test]
    fn test_hints_return_all_when_fewer_remain() {
        let mut s = brick_first(true);
        s.next_phase();
        s.start_phase();
        let all = ObjectId::Brick.suggestions();
        for label in &all[..all.len() - 2] {
            s.used_categories.insert(normalize(label));
        }
        let mut hints = s.get_hint();
        hints.sort();
        let mut expected: Vec<String> =
            all[all.len() - 2..].iter().map(|l| l.to_string()).collect();
        expected.sort();
        assert_eq!(hints, expected);

        for label in all {
            s.used_categories.insert(normalize(label));
        }
        assert!(s.get_hint().is_empty());
    }

    #[test]
    fn test_zero_duration_phase_expires_immediately() {
        let phases = vec![
            PhaseDef::new("a", 0),
            PhaseDef::new("b", 0),
            PhaseDef::new("c", 0),
        ];
        let order = ObjectOrder::new(ObjectId::Brick, ObjectId::Newspaper);
        let mut s = SessionState::new(phases, order, true);
        s.start_phase();
        assert!(s.phase_expired());
        assert_eq!(s.remaining_secs(), Some(0.0));
    }
}
