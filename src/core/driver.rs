//! Survey driver: one participant's session context
//!
//! Wraps the phase state machine with everything around it: duplicate
//! screening, hint display, end-of-phase reconciliation, recess timing,
//! trial persistence and the completion link.
//!
//! NotStarted → Active(0) → Recess(1) → Active(1) → Recess(2) → Active(2) → Completed
//!
//! The phase clock of a phase preceded by a recess starts when the recess
//! ends, not when the previous phase ends.

use chrono::Utc;
use std::time::Duration;

use crate::config::SurveyConfig;
use crate::core::gateway::CategorizationGateway;
use crate::core::session::SessionState;
use crate::core::similarity::SimilarityFilter;
use crate::core::timer::{self, Marker};
use crate::core::writer::TrialWriter;
use crate::error::SessionError;
use crate::types::{
    CategoryLabel, CompletionOutput, GroupAssignment, PhaseState, PhaseTransition, PollOutput,
    ReasonCode, ResponseRecord, SessionStatus, SubmitOutput, TrialRecord,
};
use crate::{RECESS_BEFORE_PHASES, TRANSFER_PHASE_INDEX};

/// Optional values a participant arrives with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParams {
    pub participant_id: Option<String>,
    pub study_id: Option<String>,
    pub return_url: Option<String>,
}

impl SessionParams {
    /// Participant id as logged; empty when absent
    pub fn participant(&self) -> &str {
        self.participant_id.as_deref().map(str::trim).unwrap_or("")
    }

    pub fn study(&self) -> &str {
        self.study_id.as_deref().map(str::trim).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy)]
struct Recess {
    since: Marker,
    secs: u64,
}

impl Recess {
    fn remaining(&self) -> f64 {
        timer::remaining(&self.since, self.secs)
    }
}

/// One participant's survey run
#[derive(Debug)]
pub struct SurveySession {
    id: String,
    params: SessionParams,
    group: GroupAssignment,
    state: SessionState,
    filter: SimilarityFilter,
    /// Accepted responses used for duplicate screening and reconciliation
    responses: Vec<ResponseRecord>,
    disqualified: Vec<String>,
    current_hints: Vec<String>,
    started: bool,
    recess: Option<Recess>,
    recess_secs: u64,
    completion_code: String,
    default_return_url: String,
    flush_timeout: Duration,
    gateway: CategorizationGateway,
    writer: TrialWriter,
}

impl SurveySession {
    /// Group derived from the participant id (random when absent)
    pub fn new(
        id: impl Into<String>,
        params: SessionParams,
        config: &SurveyConfig,
        gateway: CategorizationGateway,
        writer: TrialWriter,
    ) -> Self {
        let group = GroupAssignment::derive(params.participant_id.as_deref());
        Self::with_group(id, params, group, config, gateway, writer)
    }

    pub fn with_group(
        id: impl Into<String>,
        params: SessionParams,
        group: GroupAssignment,
        config: &SurveyConfig,
        gateway: CategorizationGateway,
        writer: TrialWriter,
    ) -> Self {
        let state = SessionState::new(
            config.phases.clone(),
            group.object_order(),
            group.hints_enabled(),
        );
        Self {
            id: id.into(),
            params,
            group,
            state,
            filter: SimilarityFilter::new(),
            responses: Vec::new(),
            disqualified: Vec::new(),
            current_hints: Vec::new(),
            started: false,
            recess: None,
            recess_secs: config.recess_secs,
            completion_code: config.completion_code.clone(),
            default_return_url: config.default_return_url.clone(),
            flush_timeout: Duration::from_secs(config.flush_timeout_secs),
            gateway,
            writer,
        }
    }

    /// Leave the consent screen and start phase 0; no-op once started
    pub fn begin(&mut self) -> PhaseState {
        if !self.started {
            self.started = true;
            tracing::info!(
                session = %self.id,
                group = self.group.id(),
                hints = self.group.hints_enabled(),
                "session started"
            );
            self.enter_phase();
        }
        self.phase_state()
    }

    /// Screen, classify and record one response
    pub async fn submit(&mut self, raw: &str) -> SubmitOutput {
        let text = raw.trim();
        if text.is_empty() {
            return self.reject(ReasonCode::S003_EMPTY_RESPONSE);
        }
        match self.phase_state() {
            PhaseState::NotStarted => return self.reject(ReasonCode::S004_NOT_STARTED),
            PhaseState::Completed => return self.reject(ReasonCode::C001_STUDY_COMPLETE),
            PhaseState::Recess(_) => return self.reject(ReasonCode::P003_RECESS),
            PhaseState::Active(_) => {}
        }
        // the transition itself belongs to the next poll
        if self.state.phase_expired() {
            return self.reject(ReasonCode::P002_PHASE_ENDED);
        }

        let accepted: Vec<&str> = self.responses.iter().map(|r| r.use_text.as_str()).collect();
        if let Some(kind) = self.filter.check(text, &accepted) {
            tracing::debug!(session = %self.id, kind = ?kind, "response rejected");
            return self.reject(kind.reason());
        }

        // screening works on the trimmed text, the record keeps what was typed
        let record = match self.state.record_use(raw, &self.gateway).await {
            Ok(record) => record,
            Err(SessionError::Completed) => return self.reject(ReasonCode::C001_STUDY_COMPLETE),
            Err(SessionError::PhaseNotStarted(_)) => {
                return self.reject(ReasonCode::S004_NOT_STARTED)
            }
        };

        // row keeps the hints that were on screen for this submission
        let shown_hints = std::mem::take(&mut self.current_hints);
        self.persist(&record, shown_hints);
        self.responses.push(record.clone());
        self.current_hints = self.state.get_hint();

        tracing::info!(
            session = %self.id,
            phase = record.phase_index,
            trial = record.trial,
            category = %record.category,
            "response accepted"
        );
        SubmitOutput::accepted(record, self.current_hints.clone())
    }

    /// Recheck the clocks; runs the phase transition when time is up
    pub async fn poll(&mut self) -> PollOutput {
        match self.phase_state() {
            PhaseState::NotStarted => self.poll_output(ReasonCode::S004_NOT_STARTED, None),
            PhaseState::Completed => self.poll_output(ReasonCode::C001_STUDY_COMPLETE, None),
            PhaseState::Recess(_) => {
                if self.recess.map_or(true, |r| r.remaining() <= 0.0) {
                    self.resume();
                    self.poll_output(ReasonCode::P001_PHASE_RUNNING, None)
                } else {
                    self.poll_output(ReasonCode::P003_RECESS, None)
                }
            }
            PhaseState::Active(_) => {
                if self.state.phase_expired() {
                    let transition = self.end_phase().await;
                    self.poll_output(ReasonCode::P002_PHASE_ENDED, Some(transition))
                } else {
                    self.poll_output(ReasonCode::P001_PHASE_RUNNING, None)
                }
            }
        }
    }

    /// Close the current phase and move to the next one
    ///
    /// Only a running phase can end. Before `begin`, during a recess and
    /// after completion this returns a transition with `from_index ==
    /// to_index` and leaves the session untouched.
    pub async fn end_phase(&mut self) -> PhaseTransition {
        let from_index = self.state.phase_index();
        let state = self.phase_state();
        let object = match (state, self.state.current_object()) {
            (PhaseState::Active(_), Ok(object)) => object,
            _ => {
                tracing::debug!(session = %self.id, %state, "no running phase to end");
                return PhaseTransition {
                    from_index,
                    to_index: from_index,
                    reconciliation: None,
                    disqualified: self.disqualified.clone(),
                    recess_secs: None,
                    completed: self.state.is_complete(),
                };
            }
        };

        let reconciliation = if self.responses.is_empty() {
            None
        } else {
            let verdict = self.gateway.reconcile(object, &self.responses).await;
            for response in &mut self.responses {
                let text = response.use_text.trim();
                if verdict.disqualified.iter().any(|d| d.trim() == text) {
                    response.category = CategoryLabel::Disqualified;
                }
            }
            Some(verdict)
        };
        self.disqualified = self
            .responses
            .iter()
            .filter(|r| r.category.is_disqualified())
            .map(|r| r.use_text.clone())
            .collect();
        let disqualified = self.disqualified.clone();

        let to_index = from_index + 1;
        if to_index == TRANSFER_PHASE_INDEX {
            self.responses.clear();
            self.disqualified.clear();
        }

        self.state.next_phase();
        self.current_hints.clear();
        let completed = self.state.is_complete();

        let rests = RECESS_BEFORE_PHASES.contains(&to_index);
        let recess_secs = if !completed && self.recess_secs > 0 && rests {
            self.recess = Some(Recess {
                since: timer::start(),
                secs: self.recess_secs,
            });
            Some(self.recess_secs)
        } else {
            None
        };
        if !completed && recess_secs.is_none() {
            self.enter_phase();
        }

        tracing::info!(
            session = %self.id,
            from = from_index,
            to = to_index,
            disqualified = disqualified.len(),
            completed,
            "phase ended"
        );
        PhaseTransition {
            from_index,
            to_index,
            reconciliation,
            disqualified,
            recess_secs,
            completed,
        }
    }

    /// End a recess early; false when not resting
    pub fn resume(&mut self) -> bool {
        if self.recess.take().is_none() {
            return false;
        }
        self.enter_phase();
        true
    }

    /// Wait for pending writes and build the completion link
    pub async fn finish(&mut self) -> CompletionOutput {
        if !self.state.is_complete() {
            tracing::warn!(
                session = %self.id,
                phase = self.state.phase_index(),
                "finishing before the last phase ended"
            );
        }
        let writes_flushed = self.writer.flush(self.flush_timeout).await;
        if !writes_flushed {
            tracing::warn!(session = %self.id, "pending writes did not finish in time");
        }
        CompletionOutput {
            completion_code: self.completion_code.clone(),
            completion_url: self.completion_url(),
            writes_flushed,
        }
    }

    /// `{return_url}?cc={code}`, default URL when none was supplied
    pub fn completion_url(&self) -> String {
        let base = self
            .params
            .return_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(&self.default_return_url);
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{}{}cc={}", base, sep, self.completion_code)
    }

    pub fn phase_state(&self) -> PhaseState {
        if !self.started {
            PhaseState::NotStarted
        } else if self.state.is_complete() {
            PhaseState::Completed
        } else if self.recess.is_some() {
            PhaseState::Recess(self.state.phase_index())
        } else {
            PhaseState::Active(self.state.phase_index())
        }
    }

    /// Seconds left in the running phase or recess
    pub fn remaining_secs(&self) -> Option<f64> {
        match self.recess {
            Some(recess) => Some(recess.remaining()),
            None => self.state.remaining_secs(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id.clone(),
            participant: self.params.participant().to_string(),
            study_id: self.params.study().to_string(),
            group_id: self.group.id(),
            hints_enabled: self.group.hints_enabled(),
            state: self.phase_state(),
            phase_index: self.state.phase_index(),
            phase_count: self.state.phase_count(),
            phase_name: self.state.current_phase().ok().map(|p| p.name.clone()),
            object: self.state.current_object().ok(),
            remaining_secs: self.remaining_secs(),
            trial_count: self.state.trial_count(),
            hints: self.current_hints.clone(),
            responses: self.responses.clone(),
            disqualified: self.disqualified.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn group(&self) -> GroupAssignment {
        self.group
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn responses(&self) -> &[ResponseRecord] {
        &self.responses
    }

    pub fn disqualified(&self) -> &[String] {
        &self.disqualified
    }

    pub fn hints(&self) -> &[String] {
        &self.current_hints
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    fn enter_phase(&mut self) {
        self.state.start_phase();
        self.current_hints = self.state.get_hint();
    }

    fn reject(&self, reason: ReasonCode) -> SubmitOutput {
        SubmitOutput::rejected(reason, self.current_hints.clone())
    }

    fn poll_output(&self, reason: ReasonCode, transition: Option<PhaseTransition>) -> PollOutput {
        PollOutput {
            reason,
            state: self.phase_state(),
            remaining_secs: self.remaining_secs().unwrap_or(0.0),
            transition,
        }
    }

    fn persist(&self, record: &ResponseRecord, shown_hints: Vec<String>) {
        let phase_name = self
            .state
            .current_phase()
            .map(|p| p.name.clone())
            .unwrap_or_default();
        self.writer.submit(TrialRecord {
            timestamp: Utc::now(),
            participant: self.params.participant().to_string(),
            study_id: self.params.study().to_string(),
            group_id: self.group.id(),
            phase_name,
            phase_index: record.phase_index,
            object: record.object,
            trial: record.trial,
            use_text: record.use_text.clone(),
            category: record.category.clone(),
            response_time_sec_phase: record.response_time_secs,
            hints_enabled_group: self.group.hints_enabled(),
            shown_hints,
        });
    }
}

// =============================================================================
// TESTS
// =============================================================================
