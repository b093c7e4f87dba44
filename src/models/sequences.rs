// Communication sequences and lead enrollments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::messages::MessageFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl DelayUnit {
    /// Seconds per unit. Total over the closed set, so there is no
    /// unknown-unit fallback path.
    pub fn seconds(&self) -> i64 {
        match self {
            Self::Minutes => 60,
            Self::Hours => 3_600,
            Self::Days => 86_400,
            Self::Weeks => 604_800,
        }
    }
}

/// One step of a sequence. Position in `Sequence::steps` is the send order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    pub subject: String,
    pub body: String,
    pub delay: i64,
    pub unit: DelayUnit,
    #[serde(default)]
    pub format: MessageFormat,
}

/// A named, ordered series of time-delayed messages. Treated as immutable
/// while any enrollment referencing it is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<SequenceStep>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "enrollment_status", rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Paused,
    Completed,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

/// A lead's progress through one sequence. Logical identity is the
/// (lead_id, sequence_id) pair; at most one active enrollment may exist per
/// pair. Rows are never deleted, only transitioned.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Enrollment {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub sequence_id: Uuid,
    pub status: EnrollmentStatus,
    /// 0-based index of the next step to schedule.
    pub current_step_index: i32,
    pub enrolled_at: DateTime<Utc>,
    pub next_send_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
