//! Monotonic phase timer

use std::time::Instant;

/// Opaque start marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker(Instant);

/// Marker for "now"
pub fn start() -> Marker {
    Marker(Instant::now())
}

/// Seconds since `marker`, never negative
pub fn elapsed(marker: &Marker) -> f64 {
    marker.0.elapsed().as_secs_f64()
}

/// Seconds left of a `budget_secs` budget started at `marker`, floored at 0
pub fn remaining(marker: &Marker, budget_secs: u64) -> f64 {
    (budget_secs as f64 - elapsed(marker)).max(0.0)
}
