// Sequence enrollment state machine
//
// Active ⇄ Paused, Active → Completed (terminal). Paused never moves
// directly to Completed, and nothing leaves Completed.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AutomationError, AutomationResult};
use crate::models::{
    Enrollment, EnrollmentStatus, InteractionKind, InteractionLogEntry, Lead, MessageRecipient,
    MessageStatus, ScheduledMessage, Sequence,
};
use crate::services::delay::next_send_time;
use crate::services::notify::OperatorNotifier;
use crate::services::templates::TemplateRenderer;
use crate::store::{AutomationStore, is_constraint_violation};

pub struct SequenceEnrollmentManager {
    store: Arc<dyn AutomationStore>,
    renderer: TemplateRenderer,
    notifier: Arc<dyn OperatorNotifier>,
    clock: Arc<dyn Clock>,
}

impl SequenceEnrollmentManager {
    pub fn new(
        store: Arc<dyn AutomationStore>,
        notifier: Arc<dyn OperatorNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            renderer: TemplateRenderer::new(),
            notifier,
            clock,
        }
    }

    /// Enroll a lead in a sequence at step 0 and schedule its first message.
    pub async fn enroll(&self, lead_id: Uuid, sequence_id: Uuid) -> AutomationResult<()> {
        match self.try_enroll(lead_id, sequence_id).await {
            Ok(summary) => {
                self.notifier.success(&summary);
                Ok(())
            }
            Err(err) => {
                error!("Enrollment failed for lead {}: {}", lead_id, err);
                self.notifier.error(&err.operator_message());
                Err(err)
            }
        }
    }

    async fn try_enroll(&self, lead_id: Uuid, sequence_id: Uuid) -> AutomationResult<String> {
        let lead = self
            .store
            .lead(lead_id)
            .await?
            .ok_or_else(|| AutomationError::not_found("Lead"))?;
        let sequence = self
            .store
            .sequence(sequence_id)
            .await?
            .ok_or_else(|| AutomationError::not_found("Sequence"))?;

        if !sequence.is_active {
            return Err(AutomationError::conflict(format!(
                "Sequence '{}' is not active",
                sequence.name
            )));
        }

        if self
            .store
            .active_enrollment(lead_id, sequence_id)
            .await?
            .is_some()
        {
            return Err(AutomationError::conflict(format!(
                "{} is already enrolled in '{}'",
                lead.name, sequence.name
            )));
        }

        let now = self.clock.now();
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            lead_id,
            sequence_id,
            status: EnrollmentStatus::Active,
            current_step_index: 0,
            enrolled_at: now,
            next_send_at: Some(next_send_time(sequence.steps.first(), now)),
            completed_at: None,
        };

        // The existence check above narrows but cannot close the race with a
        // concurrent enroll; the store's uniqueness constraint is the
        // authority, so its rejection maps to the same conflict.
        self.store
            .insert_enrollment(&enrollment)
            .await
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    AutomationError::conflict(format!(
                        "{} is already enrolled in '{}'",
                        lead.name, sequence.name
                    ))
                } else {
                    AutomationError::Store(err)
                }
            })?;

        self.store
            .insert_interaction(&InteractionLogEntry::new(
                lead_id,
                InteractionKind::SequenceEnrolled,
                json!({ "sequence_id": sequence_id, "sequence_name": sequence.name }),
                now,
                None,
            ))
            .await?;

        info!("Enrolled lead {} in sequence '{}'", lead_id, sequence.name);

        self.schedule_step(lead_id, sequence_id, 0).await?;

        Ok(format!("Enrolled {} in '{}'", lead.name, sequence.name))
    }

    /// Render and queue the message for `step_index`, then move the
    /// enrollment's cursor past it. An index at or past the end of the
    /// sequence completes the enrollment instead; calling again on a
    /// completed enrollment is a no-op.
    pub async fn schedule_step(
        &self,
        lead_id: Uuid,
        sequence_id: Uuid,
        step_index: usize,
    ) -> AutomationResult<()> {
        let mut enrollment = self
            .store
            .latest_enrollment(lead_id, sequence_id)
            .await?
            .ok_or_else(|| AutomationError::not_found("Enrollment"))?;

        match enrollment.status {
            EnrollmentStatus::Completed => return Ok(()),
            EnrollmentStatus::Paused => {
                return Err(AutomationError::conflict(
                    "Cannot schedule a step for a paused enrollment",
                ));
            }
            EnrollmentStatus::Active => {}
        }

        let sequence = self
            .store
            .sequence(sequence_id)
            .await?
            .ok_or_else(|| AutomationError::not_found("Sequence"))?;

        let now = self.clock.now();

        if step_index >= sequence.steps.len() {
            enrollment.status = EnrollmentStatus::Completed;
            enrollment.completed_at = Some(now);
            enrollment.next_send_at = None;
            self.store.update_enrollment(&enrollment).await?;
            info!(
                "Lead {} completed sequence '{}' ({} steps)",
                lead_id,
                sequence.name,
                sequence.steps.len()
            );
            return Ok(());
        }

        let lead = self
            .store
            .lead(lead_id)
            .await?
            .ok_or_else(|| AutomationError::not_found("Lead"))?;

        let step = &sequence.steps[step_index];
        let bag = lead_data_bag(&lead, &sequence, now);

        let message = ScheduledMessage {
            id: Uuid::new_v4(),
            lead_id,
            subject: self.renderer.render(&step.subject, &bag),
            body: self.renderer.render(&step.body, &bag),
            recipients: vec![MessageRecipient::new(
                lead.email.clone(),
                Some(lead.name.clone()),
            )],
            format: step.format,
            status: MessageStatus::Scheduled,
            scheduled_for: next_send_time(Some(step), now),
            sent_at: None,
            attempts: 0,
            created_by: lead.assigned_to,
            sequence_id: Some(sequence_id),
            step_index: Some(step_index as i32),
            created_at: now,
        };
        self.store.insert_message(&message).await?;

        enrollment.current_step_index = (step_index + 1) as i32;
        enrollment.next_send_at = sequence
            .steps
            .get(step_index + 1)
            .map(|next| next_send_time(Some(next), now));
        self.store.update_enrollment(&enrollment).await?;

        info!(
            "Scheduled step {} of '{}' for lead {} at {}",
            step_index, sequence.name, lead_id, message.scheduled_for
        );

        Ok(())
    }

    /// Dispatcher entry point: schedule whatever step the enrollment's
    /// cursor points at. No-op unless the enrollment is active.
    pub async fn advance(&self, lead_id: Uuid, sequence_id: Uuid) -> AutomationResult<()> {
        let Some(enrollment) = self.store.latest_enrollment(lead_id, sequence_id).await? else {
            return Ok(());
        };
        if enrollment.status != EnrollmentStatus::Active {
            return Ok(());
        }
        self.schedule_step(
            lead_id,
            sequence_id,
            enrollment.current_step_index.max(0) as usize,
        )
        .await
    }

    pub async fn pause(&self, lead_id: Uuid, sequence_id: Uuid) -> AutomationResult<()> {
        match self.try_pause(lead_id, sequence_id).await {
            Ok(summary) => {
                self.notifier.success(&summary);
                Ok(())
            }
            Err(err) => {
                error!("Pause failed for lead {}: {}", lead_id, err);
                self.notifier.error(&err.operator_message());
                Err(err)
            }
        }
    }

    async fn try_pause(&self, lead_id: Uuid, sequence_id: Uuid) -> AutomationResult<String> {
        let mut enrollment = self
            .store
            .latest_enrollment(lead_id, sequence_id)
            .await?
            .ok_or_else(|| AutomationError::not_found("Enrollment"))?;

        if enrollment.status != EnrollmentStatus::Active {
            return Err(AutomationError::conflict(
                "Only active enrollments can be paused",
            ));
        }

        enrollment.status = EnrollmentStatus::Paused;
        self.store.update_enrollment(&enrollment).await?;
        info!("Paused enrollment for lead {} in {}", lead_id, sequence_id);

        Ok("Sequence paused".to_string())
    }

    /// Reactivate a paused enrollment. The enrollment and any pending
    /// messages are re-dated to now so the next dispatcher pass sends
    /// immediately instead of waiting out the original delay.
    pub async fn resume(&self, lead_id: Uuid, sequence_id: Uuid) -> AutomationResult<()> {
        match self.try_resume(lead_id, sequence_id).await {
            Ok(summary) => {
                self.notifier.success(&summary);
                Ok(())
            }
            Err(err) => {
                error!("Resume failed for lead {}: {}", lead_id, err);
                self.notifier.error(&err.operator_message());
                Err(err)
            }
        }
    }

    async fn try_resume(&self, lead_id: Uuid, sequence_id: Uuid) -> AutomationResult<String> {
        let mut enrollment = self
            .store
            .latest_enrollment(lead_id, sequence_id)
            .await?
            .ok_or_else(|| AutomationError::not_found("Enrollment"))?;

        if enrollment.status != EnrollmentStatus::Paused {
            return Err(AutomationError::conflict(
                "Only paused enrollments can be resumed",
            ));
        }

        let now = self.clock.now();
        enrollment.status = EnrollmentStatus::Active;
        enrollment.next_send_at = Some(now);
        self.store.update_enrollment(&enrollment).await?;
        self.store
            .reschedule_pending(lead_id, sequence_id, now)
            .await?;
        info!("Resumed enrollment for lead {} in {}", lead_id, sequence_id);

        Ok("Sequence resumed".to_string())
    }
}

/// Data bag for step templates. Lead fields nest under `lead`; dotted token
/// paths like `{{lead.name}}` are the canonical convention.
fn lead_data_bag(lead: &Lead, sequence: &Sequence, now: DateTime<Utc>) -> Value {
    json!({
        "lead": {
            "name": lead.name,
            "email": lead.email,
            "company": lead.company,
            "phone": lead.phone,
            "status": lead.status.as_str(),
        },
        "sequence": {
            "name": sequence.name,
        },
        "currentDate": now.format("%Y-%m-%d").to_string(),
    })
}
