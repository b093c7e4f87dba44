// One dispatcher sweep: find due messages, send per recipient, mark, advance

use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::AutomationResult;
use crate::models::{
    EnrollmentStatus, InteractionKind, InteractionLogEntry, MessageStatus, ScheduledMessage,
};
use crate::services::email::MessageTransport;
use crate::services::enrollment::SequenceEnrollmentManager;
use crate::store::AutomationStore;

#[derive(Debug, Default, Clone)]
pub struct DispatchRunResult {
    pub messages_checked: i32,
    pub messages_sent: i32,
    pub recipients_sent: i32,
    pub recipients_failed: i32,
    pub errors: Vec<String>,
}

pub struct DispatchJob {
    store: Arc<dyn AutomationStore>,
    transport: Arc<dyn MessageTransport>,
    enrollments: Arc<SequenceEnrollmentManager>,
    clock: Arc<dyn Clock>,
    max_attempts: i32,
}

impl DispatchJob {
    pub fn new(
        store: Arc<dyn AutomationStore>,
        transport: Arc<dyn MessageTransport>,
        enrollments: Arc<SequenceEnrollmentManager>,
        clock: Arc<dyn Clock>,
        max_attempts: i32,
    ) -> Self {
        Self {
            store,
            transport,
            enrollments,
            clock,
            max_attempts,
        }
    }

    /// Sweep all due messages once. A failing recipient, message or store
    /// row is recorded and the sweep moves on; only a failure to list the
    /// due messages aborts the run.
    pub async fn run(&self) -> AutomationResult<DispatchRunResult> {
        let mut result = DispatchRunResult::default();
        let now = self.clock.now();

        let due = self.store.due_messages(now).await?;
        result.messages_checked = due.len() as i32;

        for mut message in due {
            if self.enrollment_paused(&message).await? {
                continue;
            }

            let now = self.clock.now();
            let is_rich = message.is_rich();
            for recipient in message.recipients.iter_mut().filter(|r| !r.sent) {
                match self
                    .transport
                    .send(recipient, &message.subject, &message.body, is_rich)
                    .await
                {
                    Ok(()) => {
                        recipient.sent = true;
                        recipient.sent_at = Some(now);
                        recipient.last_error = None;
                        result.recipients_sent += 1;
                    }
                    Err(e) => {
                        warn!(
                            "Send to {} failed for message {}: {}",
                            recipient.email, message.id, e
                        );
                        recipient.last_error = Some(e.to_string());
                        result.recipients_failed += 1;
                    }
                }
            }

            message.attempts += 1;

            let fully_sent = message.all_recipients_sent();
            if fully_sent {
                message.status = MessageStatus::Sent;
                message.sent_at = Some(now);
                result.messages_sent += 1;
            } else if message.attempts >= self.max_attempts {
                message.status = MessageStatus::Failed;
                result.errors.push(format!(
                    "Message {} failed after {} attempts",
                    message.id, message.attempts
                ));
            }

            if let Err(e) = self.store.update_message(&message).await {
                result
                    .errors
                    .push(format!("Failed to update message {}: {}", message.id, e));
                continue;
            }

            if fully_sent {
                if let Err(e) = self.record_and_advance(&message).await {
                    result.errors.push(format!(
                        "Failed to advance enrollment for message {}: {}",
                        message.id, e
                    ));
                }
            }
        }

        info!(
            "Dispatch sweep: {} due, {} sent, {} recipients failed",
            result.messages_checked, result.messages_sent, result.recipients_failed
        );

        Ok(result)
    }

    /// A due message tied to a paused enrollment stays scheduled and is
    /// skipped until the enrollment resumes.
    async fn enrollment_paused(&self, message: &ScheduledMessage) -> AutomationResult<bool> {
        let Some(sequence_id) = message.sequence_id else {
            return Ok(false);
        };
        let enrollment = self
            .store
            .latest_enrollment(message.lead_id, sequence_id)
            .await?;
        Ok(matches!(
            enrollment.map(|e| e.status),
            Some(EnrollmentStatus::Paused)
        ))
    }

    async fn record_and_advance(&self, message: &ScheduledMessage) -> AutomationResult<()> {
        let Some(sequence_id) = message.sequence_id else {
            return Ok(());
        };

        self.store
            .insert_interaction(&InteractionLogEntry::new(
                message.lead_id,
                InteractionKind::SequenceMessageSent,
                serde_json::json!({
                    "message_id": message.id,
                    "sequence_id": sequence_id,
                    "step_index": message.step_index,
                    "subject": message.subject,
                }),
                self.clock.now(),
                None,
            ))
            .await?;

        self.enrollments.advance(message.lead_id, sequence_id).await
    }
}
