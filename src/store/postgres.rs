// Postgres-backed store
//
// Runtime-checked queries throughout; JSONB columns hold the sequence steps
// and per-recipient delivery state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use super::{AutomationStore, StoreError, StoreResult};
use crate::models::{
    Enrollment, InteractionLogEntry, Lead, MessageFormat, MessageStatus, ScheduledMessage,
    Sequence, SequenceStep, StatusChangeRecord,
};

#[derive(Debug, Clone)]
pub struct PgAutomationStore {
    pool: PgPool,
}

type MessageRow = (
    Uuid,                  // id
    Uuid,                  // lead_id
    String,                // subject
    String,                // body
    JsonValue,             // recipients
    MessageFormat,         // format
    MessageStatus,         // status
    DateTime<Utc>,         // scheduled_for
    Option<DateTime<Utc>>, // sent_at
    i32,                   // attempts
    Option<Uuid>,          // created_by
    Option<Uuid>,          // sequence_id
    Option<i32>,           // step_index
    DateTime<Utc>,         // created_at
);

const MESSAGE_COLUMNS: &str = "id, lead_id, subject, body, recipients, format, status, \
     scheduled_for, sent_at, attempts, created_by, sequence_id, step_index, created_at";

impl PgAutomationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn message_from_row(row: MessageRow) -> StoreResult<ScheduledMessage> {
        Ok(ScheduledMessage {
            id: row.0,
            lead_id: row.1,
            subject: row.2,
            body: row.3,
            recipients: serde_json::from_value(row.4)?,
            format: row.5,
            status: row.6,
            scheduled_for: row.7,
            sent_at: row.8,
            attempts: row.9,
            created_by: row.10,
            sequence_id: row.11,
            step_index: row.12,
            created_at: row.13,
        })
    }

    fn map_write_err(err: sqlx::Error) -> StoreError {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                StoreError::Constraint(db.message().to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

#[async_trait]
impl AutomationStore for PgAutomationStore {
    async fn lead(&self, id: Uuid) -> StoreResult<Option<Lead>> {
        let lead = sqlx::query_as::<_, Lead>(
            r#"
            SELECT id, name, email, company, phone, status, source, assigned_to,
                   created_at, updated_at
            FROM leads
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(lead)
    }

    async fn leads(&self) -> StoreResult<Vec<Lead>> {
        let leads = sqlx::query_as::<_, Lead>(
            r#"
            SELECT id, name, email, company, phone, status, source, assigned_to,
                   created_at, updated_at
            FROM leads
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(leads)
    }

    async fn sequence(&self, id: Uuid) -> StoreResult<Option<Sequence>> {
        let row = sqlx::query_as::<_, (Uuid, String, Option<String>, JsonValue, bool, DateTime<Utc>)>(
            r#"
            SELECT id, name, description, steps, is_active, created_at
            FROM sequences
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let steps: Vec<SequenceStep> = serde_json::from_value(row.3)?;
                Ok(Some(Sequence {
                    id: row.0,
                    name: row.1,
                    description: row.2,
                    steps,
                    is_active: row.4,
                    created_at: row.5,
                }))
            }
            None => Ok(None),
        }
    }

    async fn active_enrollment(
        &self,
        lead_id: Uuid,
        sequence_id: Uuid,
    ) -> StoreResult<Option<Enrollment>> {
        let enrollment = sqlx::query_as::<_, Enrollment>(
            r#"
            SELECT id, lead_id, sequence_id, status, current_step_index,
                   enrolled_at, next_send_at, completed_at
            FROM enrollments
            WHERE lead_id = $1 AND sequence_id = $2 AND status = 'active'
            "#,
        )
        .bind(lead_id)
        .bind(sequence_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(enrollment)
    }

    async fn latest_enrollment(
        &self,
        lead_id: Uuid,
        sequence_id: Uuid,
    ) -> StoreResult<Option<Enrollment>> {
        let enrollment = sqlx::query_as::<_, Enrollment>(
            r#"
            SELECT id, lead_id, sequence_id, status, current_step_index,
                   enrolled_at, next_send_at, completed_at
            FROM enrollments
            WHERE lead_id = $1 AND sequence_id = $2
            ORDER BY enrolled_at DESC
            LIMIT 1
            "#,
        )
        .bind(lead_id)
        .bind(sequence_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(enrollment)
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO enrollments
            (id, lead_id, sequence_id, status, current_step_index, enrolled_at, next_send_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(enrollment.id)
        .bind(enrollment.lead_id)
        .bind(enrollment.sequence_id)
        .bind(enrollment.status)
        .bind(enrollment.current_step_index)
        .bind(enrollment.enrolled_at)
        .bind(enrollment.next_send_at)
        .bind(enrollment.completed_at)
        .execute(&self.pool)
        .await
        .map_err(Self::map_write_err)?;

        Ok(())
    }

    async fn update_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE enrollments
            SET status = $2, current_step_index = $3, next_send_at = $4, completed_at = $5
            WHERE id = $1
            "#,
        )
        .bind(enrollment.id)
        .bind(enrollment.status)
        .bind(enrollment.current_step_index)
        .bind(enrollment.next_send_at)
        .bind(enrollment.completed_at)
        .execute(&self.pool)
        .await
        .map_err(Self::map_write_err)?;

        Ok(())
    }

    async fn insert_message(&self, message: &ScheduledMessage) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_messages
            (id, lead_id, subject, body, recipients, format, status, scheduled_for,
             sent_at, attempts, created_by, sequence_id, step_index, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(message.id)
        .bind(message.lead_id)
        .bind(&message.subject)
        .bind(&message.body)
        .bind(serde_json::to_value(&message.recipients)?)
        .bind(message.format)
        .bind(message.status)
        .bind(message.scheduled_for)
        .bind(message.sent_at)
        .bind(message.attempts)
        .bind(message.created_by)
        .bind(message.sequence_id)
        .bind(message.step_index)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_message(&self, message: &ScheduledMessage) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_messages
            SET status = $2, sent_at = $3, attempts = $4, recipients = $5
            WHERE id = $1
            "#,
        )
        .bind(message.id)
        .bind(message.status)
        .bind(message.sent_at)
        .bind(message.attempts)
        .bind(serde_json::to_value(&message.recipients)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn due_messages(&self, now: DateTime<Utc>) -> StoreResult<Vec<ScheduledMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM scheduled_messages
            WHERE status = 'scheduled' AND scheduled_for <= $1
            ORDER BY scheduled_for ASC
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::message_from_row).collect()
    }

    async fn reschedule_pending(
        &self,
        lead_id: Uuid,
        sequence_id: Uuid,
        when: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_messages
            SET scheduled_for = $3
            WHERE lead_id = $1 AND sequence_id = $2 AND status = 'scheduled'
            "#,
        )
        .bind(lead_id)
        .bind(sequence_id)
        .bind(when)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_status_change(
        &self,
        record: &StatusChangeRecord,
        interaction: &InteractionLogEntry,
    ) -> StoreResult<Lead> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO status_changes
            (id, lead_id, previous_status, new_status, changed_by, changed_at, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.lead_id)
        .bind(record.previous_status)
        .bind(record.new_status)
        .bind(record.changed_by)
        .bind(record.changed_at)
        .bind(&record.notes)
        .execute(&mut *tx)
        .await?;

        let lead = sqlx::query_as::<_, Lead>(
            r#"
            UPDATE leads
            SET status = $2, updated_at = $3
            WHERE id = $1
            RETURNING id, name, email, company, phone, status, source, assigned_to,
                      created_at, updated_at
            "#,
        )
        .bind(record.lead_id)
        .bind(record.new_status)
        .bind(record.changed_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO interaction_log (id, lead_id, kind, metadata, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(interaction.id)
        .bind(interaction.lead_id)
        .bind(interaction.kind)
        .bind(&interaction.metadata)
        .bind(interaction.created_at)
        .bind(interaction.created_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(lead)
    }

    async fn status_history(&self, lead_id: Uuid) -> StoreResult<Vec<StatusChangeRecord>> {
        let records = sqlx::query_as::<_, StatusChangeRecord>(
            r#"
            SELECT id, lead_id, previous_status, new_status, changed_by, changed_at, notes
            FROM status_changes
            WHERE lead_id = $1
            ORDER BY changed_at DESC
            "#,
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn insert_interaction(&self, entry: &InteractionLogEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO interaction_log (id, lead_id, kind, metadata, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.lead_id)
        .bind(entry.kind)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .bind(entry.created_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
