//! aut-flex: timed Alternative Uses Test runner
//!
//! Participants list uses for everyday objects across three timed phases.
//! Each response is screened for duplicates, categorized through an external
//! gateway and handed to a background writer for persistence.

pub mod config;
pub mod core;
pub mod error;
pub mod types;

// =============================================================================
// PHASES
// =============================================================================

/// Number of phases in a session
pub const PHASE_COUNT: usize = 3;

/// Index of the extension phase (same object, hints allowed)
pub const EXTENSION_PHASE_INDEX: usize = 1;

/// Index of the transfer phase (second object)
pub const TRANSFER_PHASE_INDEX: usize = 2;

/// Phase indices that are preceded by a recess
pub const RECESS_BEFORE_PHASES: [usize; 2] = [1, 2];

/// Default recess length between phases (seconds)
pub const DEFAULT_RECESS_SECS: u64 = 20;

// =============================================================================
// ADMISSION
// =============================================================================

/// Responses within this edit distance of an accepted one are near-duplicates
pub const NEAR_DUPLICATE_MAX_DISTANCE: usize = 2;

/// Maximum number of category hints shown at once
pub const MAX_HINTS: usize = 3;

/// Number of participant groups
pub const GROUP_COUNT: u64 = 4;

// =============================================================================
// CATEGORY SENTINELS
// =============================================================================

/// Label for invalid responses
pub const DISQUALIFIED_LABEL: &str = "Disqualified";

/// Label for legitimate responses outside the taxonomy
pub const UNCATEGORIZED_LABEL: &str = "Uncategorized";

// =============================================================================
// DRIVER TIMING
// =============================================================================

/// Countdown display refresh interval (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// How long session completion waits for pending writes (seconds)
pub const DEFAULT_FLUSH_TIMEOUT_SECS: u64 = 5;

/// Capacity of the background writer queue
pub const DEFAULT_WRITER_QUEUE_CAPACITY: usize = 256;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
