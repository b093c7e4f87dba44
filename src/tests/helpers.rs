// In-process doubles for the store, transport, clock and notifier seams

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::clock::Clock;
use crate::jobs::DispatchJob;
use crate::models::{
    Enrollment, EnrollmentStatus, InteractionLogEntry, Lead, MessageRecipient, MessageStatus,
    ScheduledMessage, Sequence, StatusChangeRecord,
};
use crate::services::email::{MessageTransport, TransportError};
use crate::services::enrollment::SequenceEnrollmentManager;
use crate::services::notify::OperatorNotifier;
use crate::services::stale::StaleLeadDetector;
use crate::services::status::StatusChangeDispatcher;
use crate::store::{AutomationStore, StoreError, StoreResult};
use crate::tests::fixtures::base_time;

// ============================================
// In-memory store
// ============================================

#[derive(Default)]
struct StoreState {
    leads: HashMap<Uuid, Lead>,
    sequences: HashMap<Uuid, Sequence>,
    enrollments: Vec<Enrollment>,
    messages: Vec<ScheduledMessage>,
    status_changes: Vec<StatusChangeRecord>,
    interactions: Vec<InteractionLogEntry>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_lead(&self, lead: Lead) {
        self.state.lock().unwrap().leads.insert(lead.id, lead);
    }

    pub fn add_sequence(&self, sequence: Sequence) {
        self.state
            .lock()
            .unwrap()
            .sequences
            .insert(sequence.id, sequence);
    }

    pub fn add_message(&self, message: ScheduledMessage) {
        self.state.lock().unwrap().messages.push(message);
    }

    pub fn messages(&self) -> Vec<ScheduledMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn enrollments(&self) -> Vec<Enrollment> {
        self.state.lock().unwrap().enrollments.clone()
    }

    pub fn status_changes(&self) -> Vec<StatusChangeRecord> {
        self.state.lock().unwrap().status_changes.clone()
    }

    pub fn interactions(&self) -> Vec<InteractionLogEntry> {
        self.state.lock().unwrap().interactions.clone()
    }
}

#[async_trait]
impl AutomationStore for InMemoryStore {
    async fn lead(&self, id: Uuid) -> StoreResult<Option<Lead>> {
        Ok(self.state.lock().unwrap().leads.get(&id).cloned())
    }

    async fn leads(&self) -> StoreResult<Vec<Lead>> {
        let mut leads: Vec<Lead> = self.state.lock().unwrap().leads.values().cloned().collect();
        leads.sort_by_key(|l| l.created_at);
        Ok(leads)
    }

    async fn sequence(&self, id: Uuid) -> StoreResult<Option<Sequence>> {
        Ok(self.state.lock().unwrap().sequences.get(&id).cloned())
    }

    async fn active_enrollment(
        &self,
        lead_id: Uuid,
        sequence_id: Uuid,
    ) -> StoreResult<Option<Enrollment>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .enrollments
            .iter()
            .find(|e| {
                e.lead_id == lead_id
                    && e.sequence_id == sequence_id
                    && e.status == EnrollmentStatus::Active
            })
            .cloned())
    }

    async fn latest_enrollment(
        &self,
        lead_id: Uuid,
        sequence_id: Uuid,
    ) -> StoreResult<Option<Enrollment>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .enrollments
            .iter()
            .filter(|e| e.lead_id == lead_id && e.sequence_id == sequence_id)
            .max_by_key(|e| e.enrolled_at)
            .cloned())
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if enrollment.status == EnrollmentStatus::Active
            && state.enrollments.iter().any(|e| {
                e.lead_id == enrollment.lead_id
                    && e.sequence_id == enrollment.sequence_id
                    && e.status == EnrollmentStatus::Active
            })
        {
            return Err(StoreError::Constraint(
                "duplicate active enrollment for pair".to_string(),
            ));
        }
        state.enrollments.push(enrollment.clone());
        Ok(())
    }

    async fn update_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.enrollments.iter_mut().find(|e| e.id == enrollment.id) {
            *existing = enrollment.clone();
        }
        Ok(())
    }

    async fn insert_message(&self, message: &ScheduledMessage) -> StoreResult<()> {
        self.state.lock().unwrap().messages.push(message.clone());
        Ok(())
    }

    async fn update_message(&self, message: &ScheduledMessage) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.messages.iter_mut().find(|m| m.id == message.id) {
            *existing = message.clone();
        }
        Ok(())
    }

    async fn due_messages(&self, now: DateTime<Utc>) -> StoreResult<Vec<ScheduledMessage>> {
        let mut due: Vec<ScheduledMessage> = self
            .state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.status == MessageStatus::Scheduled && m.scheduled_for <= now)
            .cloned()
            .collect();
        due.sort_by_key(|m| m.scheduled_for);
        Ok(due)
    }

    async fn reschedule_pending(
        &self,
        lead_id: Uuid,
        sequence_id: Uuid,
        when: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        for message in state.messages.iter_mut() {
            if message.lead_id == lead_id
                && message.sequence_id == Some(sequence_id)
                && message.status == MessageStatus::Scheduled
            {
                message.scheduled_for = when;
            }
        }
        Ok(())
    }

    async fn apply_status_change(
        &self,
        record: &StatusChangeRecord,
        interaction: &InteractionLogEntry,
    ) -> StoreResult<Lead> {
        let mut state = self.state.lock().unwrap();
        let Some(lead) = state.leads.get_mut(&record.lead_id) else {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        };
        lead.status = record.new_status;
        lead.updated_at = record.changed_at;
        let updated = lead.clone();
        state.status_changes.push(record.clone());
        state.interactions.push(interaction.clone());
        Ok(updated)
    }

    async fn status_history(&self, lead_id: Uuid) -> StoreResult<Vec<StatusChangeRecord>> {
        let mut records: Vec<StatusChangeRecord> = self
            .state
            .lock()
            .unwrap()
            .status_changes
            .iter()
            .filter(|r| r.lead_id == lead_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.changed_at.cmp(&a.changed_at));
        Ok(records)
    }

    async fn insert_interaction(&self, entry: &InteractionLogEntry) -> StoreResult<()> {
        self.state.lock().unwrap().interactions.push(entry.clone());
        Ok(())
    }
}

// ============================================
// Recording transport
// ============================================

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub is_rich: bool,
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentEmail>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends to this address fail until cleared.
    pub fn fail_address(&self, email: &str) {
        self.failing.lock().unwrap().insert(email.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, email: &str) -> Vec<SentEmail> {
        self.sent()
            .into_iter()
            .filter(|m| m.to == email)
            .collect()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(
        &self,
        recipient: &MessageRecipient,
        subject: &str,
        body: &str,
        is_rich: bool,
    ) -> Result<(), TransportError> {
        if self.failing.lock().unwrap().contains(&recipient.email) {
            return Err(TransportError::Send("smtp unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(SentEmail {
            to: recipient.email.clone(),
            subject: subject.to_string(),
            body: body.to_string(),
            is_rich,
        });
        Ok(())
    }
}

// ============================================
// Manual clock and recording notifier
// ============================================

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    successes: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn successes(&self) -> Vec<String> {
        self.successes.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl OperatorNotifier for RecordingNotifier {
    fn success(&self, message: &str) {
        self.successes.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

// ============================================
// Wired-up engine harness
// ============================================

pub struct TestEngine {
    pub store: Arc<InMemoryStore>,
    pub transport: Arc<RecordingTransport>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub enrollments: Arc<SequenceEnrollmentManager>,
}

impl TestEngine {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let clock = Arc::new(ManualClock::at(base_time()));
        let notifier = Arc::new(RecordingNotifier::default());
        let enrollments = Arc::new(SequenceEnrollmentManager::new(
            store.clone(),
            notifier.clone(),
            clock.clone(),
        ));
        Self {
            store,
            transport,
            clock,
            notifier,
            enrollments,
        }
    }

    pub fn dispatch_job(&self, max_attempts: i32) -> DispatchJob {
        DispatchJob::new(
            self.store.clone(),
            self.transport.clone(),
            self.enrollments.clone(),
            self.clock.clone(),
            max_attempts,
        )
    }

    pub fn status_dispatcher(&self) -> StatusChangeDispatcher {
        StatusChangeDispatcher::new(
            self.store.clone(),
            self.transport.clone(),
            self.notifier.clone(),
            self.clock.clone(),
            "leasing-team@keystonehq.com",
        )
    }

    pub fn stale_detector(&self) -> StaleLeadDetector {
        StaleLeadDetector::new(self.store.clone(), self.clock.clone())
    }
}
