//! Reason codes for admission decisions and phase transitions

use serde::{Deserialize, Serialize};

/// Reason codes for every submission and poll outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ReasonCode {
    // =========================================================================
    // S: Submissions
    // =========================================================================
    /// Response accepted and recorded
    S001_RESPONSE_ACCEPTED,
    /// Same text as an earlier response after normalization
    S002_EXACT_DUPLICATE,
    /// Within edit distance 2 of an earlier response
    S002_NEAR_DUPLICATE,
    /// Blank input
    S003_EMPTY_RESPONSE,
    /// Session has not been started
    S004_NOT_STARTED,

    // =========================================================================
    // P: Phase clock
    // =========================================================================
    /// Phase still has time left
    P001_PHASE_RUNNING,
    /// Phase time exhausted, next phase started
    P002_PHASE_ENDED,
    /// Between phases, resting
    P003_RECESS,

    // =========================================================================
    // C: Completion
    // =========================================================================
    /// All phases done
    C001_STUDY_COMPLETE,
}

impl ReasonCode {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::S001_RESPONSE_ACCEPTED => "S001_RESPONSE_ACCEPTED",
            Self::S002_EXACT_DUPLICATE => "S002_EXACT_DUPLICATE",
            Self::S002_NEAR_DUPLICATE => "S002_NEAR_DUPLICATE",
            Self::S003_EMPTY_RESPONSE => "S003_EMPTY_RESPONSE",
            Self::S004_NOT_STARTED => "S004_NOT_STARTED",
            Self::P001_PHASE_RUNNING => "P001_PHASE_RUNNING",
            Self::P002_PHASE_ENDED => "P002_PHASE_ENDED",
            Self::P003_RECESS => "P003_RECESS",
            Self::C001_STUDY_COMPLETE => "C001_STUDY_COMPLETE",
        }
    }

    /// Get participant-facing description
    pub fn description(&self) -> &'static str {
        match self {
            Self::S001_RESPONSE_ACCEPTED => "Response recorded.",
            Self::S002_EXACT_DUPLICATE => {
                "You already submitted that exact use! Try a different idea."
            }
            Self::S002_NEAR_DUPLICATE => {
                "Your idea is very similar to a previous one! Try a more different idea."
            }
            Self::S003_EMPTY_RESPONSE => "Please enter a use before submitting.",
            Self::S004_NOT_STARTED => "The study has not started yet.",
            Self::P001_PHASE_RUNNING => "Phase in progress",
            Self::P002_PHASE_ENDED => "Time's up for this phase!",
            Self::P003_RECESS => "Take a short break",
            Self::C001_STUDY_COMPLETE => "You have completed the study!",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_codes_share_prefix() {
        assert!(ReasonCode::S002_EXACT_DUPLICATE.code().starts_with("S002"));
        assert!(ReasonCode::S002_NEAR_DUPLICATE.code().starts_with("S002"));
    }

    #[test]
    fn test_serializes_as_code() {
        let json = serde_json::to_string(&ReasonCode::P003_RECESS).unwrap();
        assert_eq!(json, "\"P003_RECESS\"");
    }
}
