// Persistent record store collaborator
//
// The engine consumes this interface only; `PgAutomationStore` is the
// shipped implementation. Tests substitute an in-process store.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Enrollment, InteractionLogEntry, Lead, ScheduledMessage, Sequence, StatusChangeRecord,
};

pub use postgres::PgAutomationStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A uniqueness constraint rejected the write (e.g. a second active
    /// enrollment for the same lead/sequence pair).
    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait AutomationStore: Send + Sync {
    async fn lead(&self, id: Uuid) -> StoreResult<Option<Lead>>;
    async fn leads(&self) -> StoreResult<Vec<Lead>>;

    async fn sequence(&self, id: Uuid) -> StoreResult<Option<Sequence>>;

    /// The active enrollment for a (lead, sequence) pair, if any.
    async fn active_enrollment(
        &self,
        lead_id: Uuid,
        sequence_id: Uuid,
    ) -> StoreResult<Option<Enrollment>>;

    /// The most recent enrollment for the pair regardless of status.
    async fn latest_enrollment(
        &self,
        lead_id: Uuid,
        sequence_id: Uuid,
    ) -> StoreResult<Option<Enrollment>>;

    /// Insert a new enrollment. The store enforces the one-active-per-pair
    /// invariant and reports a violation as `StoreError::Constraint`.
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()>;

    async fn update_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()>;

    async fn insert_message(&self, message: &ScheduledMessage) -> StoreResult<()>;

    async fn update_message(&self, message: &ScheduledMessage) -> StoreResult<()>;

    /// Scheduled messages whose send time has arrived.
    async fn due_messages(&self, now: DateTime<Utc>) -> StoreResult<Vec<ScheduledMessage>>;

    /// Re-date the pair's still-scheduled messages (used by resume so the
    /// next sweep sends immediately).
    async fn reschedule_pending(
        &self,
        lead_id: Uuid,
        sequence_id: Uuid,
        when: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Atomically append the audit record, update the lead's status field
    /// and append the interaction entry. Returns the updated lead.
    async fn apply_status_change(
        &self,
        record: &StatusChangeRecord,
        interaction: &InteractionLogEntry,
    ) -> StoreResult<Lead>;

    /// Status history for a lead, most recent first.
    async fn status_history(&self, lead_id: Uuid) -> StoreResult<Vec<StatusChangeRecord>>;

    async fn insert_interaction(&self, entry: &InteractionLogEntry) -> StoreResult<()>;
}

/// True when the error marks the write as rejected by a uniqueness
/// constraint rather than a storage fault.
pub fn is_constraint_violation(err: &StoreError) -> bool {
    matches!(err, StoreError::Constraint(_))
}
