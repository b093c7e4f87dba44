// Step delay arithmetic

use chrono::{DateTime, Duration, Utc};

use crate::models::SequenceStep;

/// Absolute send time for a step relative to `now`. `None` (past the end of
/// the sequence) returns `now` unchanged; the caller never schedules it.
pub fn next_send_time(step: Option<&SequenceStep>, now: DateTime<Utc>) -> DateTime<Utc> {
    match step {
        Some(step) => now + Duration::seconds(step.delay * step.unit.seconds()),
        None => now,
    }
}
