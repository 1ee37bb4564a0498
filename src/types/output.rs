//! Output structures returned to drivers (terminal, HTTP)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ObjectId, PhaseState, Reconciliation, ReasonCode, ResponseRecord};

/// Result of one submission attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutput {
    pub timestamp: DateTime<Utc>,
    pub reason: ReasonCode,
    /// Present only when accepted
    pub record: Option<ResponseRecord>,
    /// Hints to display after this submission
    pub hints: Vec<String>,
}

impl SubmitOutput {
    pub fn accepted(record: ResponseRecord, hints: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            reason: ReasonCode::S001_RESPONSE_ACCEPTED,
            record: Some(record),
            hints,
        }
    }

    pub fn rejected(reason: ReasonCode, hints: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            reason,
            record: None,
            hints,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.record.is_some()
    }
}

/// What happened when a phase's time ran out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from_index: usize,
    pub to_index: usize,
    /// Batch verdict; None when the phase had no responses
    pub reconciliation: Option<Reconciliation>,
    /// Responses now labelled Disqualified in the current block
    pub disqualified: Vec<String>,
    /// Rest period before the next phase starts
    pub recess_secs: Option<u64>,
    pub completed: bool,
}

/// Result of one clock poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOutput {
    pub reason: ReasonCode,
    pub state: PhaseState,
    /// Seconds left in the phase, or in the recess while resting
    pub remaining_secs: f64,
    pub transition: Option<PhaseTransition>,
}

/// Snapshot of a session for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub participant: String,
    pub study_id: String,
    pub group_id: u8,
    pub hints_enabled: bool,
    pub state: PhaseState,
    pub phase_index: usize,
    pub phase_count: usize,
    pub phase_name: Option<String>,
    pub object: Option<ObjectId>,
    pub remaining_secs: Option<f64>,
    pub trial_count: u32,
    pub hints: Vec<String>,
    pub responses: Vec<ResponseRecord>,
    pub disqualified: Vec<String>,
}

/// Completion screen data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOutput {
    pub completion_code: String,
    pub completion_url: String,
    /// False when pending writes outlived the flush timeout
    pub writes_flushed: bool,
}
