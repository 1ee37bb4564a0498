//! Phase definitions and the session lifecycle states

use serde::{Deserialize, Serialize};

/// One timed segment of the survey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDef {
    /// Title shown to the participant
    pub name: String,
    /// Time budget in seconds
    pub duration_secs: u64,
}

impl PhaseDef {
    pub fn new(name: impl Into<String>, duration_secs: u64) -> Self {
        Self {
            name: name.into(),
            duration_secs,
        }
    }
}

/// The deployed three-phase schedule: baseline, extension, transfer
pub fn default_phases() -> Vec<PhaseDef> {
    vec![
        PhaseDef::new("First Round: Uses for Object", 120),
        PhaseDef::new("Keep Going: More Ideas for the Same Object", 90),
        PhaseDef::new("Final Round: Uses for a Different Object", 210),
    ]
}

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "phase", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseState {
    /// Consent screen, no phase running
    NotStarted,
    /// Phase at this index is accepting responses
    Active(usize),
    /// Between phases, next phase index pending
    Recess(usize),
    /// All phases finished
    Completed,
}

impl PhaseState {
    /// Terminal marker for banners
    pub fn emoji(&self) -> &'static str {
        match self {
            PhaseState::NotStarted => "⏳",
            PhaseState::Active(_) => "✏️",
            PhaseState::Recess(_) => "🧘",
            PhaseState::Completed => "🎉",
        }
    }
}

impl std::fmt::Display for PhaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseState::NotStarted => write!(f, "NOT_STARTED"),
            PhaseState::Active(i) => write!(f, "PHASE {}", i + 1),
            PhaseState::Recess(i) => write!(f, "RECESS before phase {}", i + 1),
            PhaseState::Completed => write!(f, "COMPLETED"),
        }
    }
}
