//! Core types for aut-flex

mod category;
mod group;
mod object;
mod output;
mod phase;
mod reason;
mod record;

pub use category::{normalize, CategoryLabel};
pub use group::GroupAssignment;
pub use object::{ObjectId, ObjectOrder};
pub use output::{CompletionOutput, PhaseTransition, PollOutput, SessionStatus, SubmitOutput};
pub use phase::{default_phases, PhaseDef, PhaseState};
pub use reason::ReasonCode;
pub use record::{Reconciliation, ResponseRecord, TrialRecord};
