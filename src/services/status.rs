// Status transitions: audit history plus status-keyed side effects
//
// The audit record, the lead update and the interaction entry commit as one
// store transaction. Side effects run after commit and never roll the
// transition back.

use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AutomationError, AutomationResult};
use crate::models::{
    InteractionKind, InteractionLogEntry, Lead, LeadStatus, MessageRecipient, StatusChangeRecord,
};
use crate::services::email::MessageTransport;
use crate::services::notify::OperatorNotifier;
use crate::services::templates::TemplateRenderer;
use crate::store::AutomationStore;

/// Side effects a status transition can fire. Each is one message via the
/// transport, built from a fixed template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    NotifyInternalTeam,
    SendThankYou,
    RequestFeedback,
}

/// Action table keyed by the status enum. Statuses without an arm listed
/// here fire nothing.
pub fn status_actions(status: LeadStatus) -> &'static [StatusAction] {
    match status {
        LeadStatus::Qualified | LeadStatus::TourScheduled | LeadStatus::ApplicationSent => {
            &[StatusAction::NotifyInternalTeam]
        }
        LeadStatus::ClosedWon => &[StatusAction::SendThankYou, StatusAction::NotifyInternalTeam],
        LeadStatus::ClosedLost => &[StatusAction::RequestFeedback],
        LeadStatus::New | LeadStatus::Contacted | LeadStatus::Unresponsive => &[],
    }
}

const INTERNAL_SUBJECT: &str = "Lead update: {{lead.name}} is now {{lead.status}}";
const INTERNAL_BODY: &str = "{{lead.name}} ({{lead.email}}) moved to {{lead.status}} on \
                             {{currentDate}}. Company: {{lead.company}}";

const THANK_YOU_SUBJECT: &str = "Welcome aboard, {{lead.name}}!";
const THANK_YOU_BODY: &str = "Hi {{lead.name}},\n\nThank you for choosing us. Our team will \
                              reach out shortly with your next steps.\n\nThe Keystone Leasing Team";

const FEEDBACK_SUBJECT: &str = "We'd love your feedback, {{lead.name}}";
const FEEDBACK_BODY: &str = "Hi {{lead.name}},\n\nSorry things didn't work out this time. If \
                             you have a moment, we'd appreciate hearing what we could have done \
                             better.\n\nThe Keystone Leasing Team";

pub struct StatusChangeDispatcher {
    store: Arc<dyn AutomationStore>,
    transport: Arc<dyn MessageTransport>,
    renderer: TemplateRenderer,
    notifier: Arc<dyn OperatorNotifier>,
    clock: Arc<dyn Clock>,
    internal_team_email: String,
}

impl StatusChangeDispatcher {
    pub fn new(
        store: Arc<dyn AutomationStore>,
        transport: Arc<dyn MessageTransport>,
        notifier: Arc<dyn OperatorNotifier>,
        clock: Arc<dyn Clock>,
        internal_team_email: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transport,
            renderer: TemplateRenderer::new(),
            notifier,
            clock,
            internal_team_email: internal_team_email.into(),
        }
    }

    /// Record a status transition and fire its side effects. The returned
    /// lead reflects the committed update. Notification failures are logged
    /// and surfaced to the operator channel but do not fail the transition.
    pub async fn update_status(
        &self,
        lead_id: Uuid,
        new_status: LeadStatus,
        notes: Option<String>,
        actor: Option<Uuid>,
    ) -> AutomationResult<Lead> {
        let lead = self
            .store
            .lead(lead_id)
            .await?
            .ok_or_else(|| AutomationError::not_found("Lead"))?;

        let now = self.clock.now();
        let record = StatusChangeRecord {
            id: Uuid::new_v4(),
            lead_id,
            previous_status: lead.status,
            new_status,
            changed_by: actor,
            changed_at: now,
            notes,
        };
        let interaction = InteractionLogEntry::new(
            lead_id,
            InteractionKind::StatusChange,
            json!({
                "from": lead.status.as_str(),
                "to": new_status.as_str(),
            }),
            now,
            actor,
        );

        let updated = self.store.apply_status_change(&record, &interaction).await?;

        info!(
            "Lead {} status changed: {} -> {}",
            lead_id,
            record.previous_status.as_str(),
            new_status.as_str()
        );

        self.run_status_actions(&updated, new_status).await;

        Ok(updated)
    }

    async fn run_status_actions(&self, lead: &Lead, status: LeadStatus) {
        let bag = action_data_bag(lead, status);

        for action in status_actions(status) {
            let (recipient, subject, body) = match action {
                StatusAction::NotifyInternalTeam => (
                    MessageRecipient::new(self.internal_team_email.clone(), None),
                    INTERNAL_SUBJECT,
                    INTERNAL_BODY,
                ),
                StatusAction::SendThankYou => (
                    MessageRecipient::new(lead.email.clone(), Some(lead.name.clone())),
                    THANK_YOU_SUBJECT,
                    THANK_YOU_BODY,
                ),
                StatusAction::RequestFeedback => (
                    MessageRecipient::new(lead.email.clone(), Some(lead.name.clone())),
                    FEEDBACK_SUBJECT,
                    FEEDBACK_BODY,
                ),
            };

            let subject = self.renderer.render(subject, &bag);
            let body = self.renderer.render(body, &bag);

            if let Err(e) = self.transport.send(&recipient, &subject, &body, false).await {
                warn!(
                    "Status action {:?} for lead {} failed: {}",
                    action, lead.id, e
                );
                self.notifier
                    .error(&format!("Notification to {} could not be sent", recipient.email));
            }
        }
    }
}

fn action_data_bag(lead: &Lead, status: LeadStatus) -> Value {
    json!({
        "lead": {
            "name": lead.name,
            "email": lead.email,
            "company": lead.company,
            "status": status.as_str(),
        },
    })
}
