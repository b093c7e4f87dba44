// Outbound messages queued by the engine and swept by the dispatcher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "message_format", rename_all = "lowercase")]
pub enum MessageFormat {
    #[default]
    Plain,
    Rich,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "message_status", rename_all = "lowercase")]
pub enum MessageStatus {
    Draft,
    Scheduled,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// Per-recipient delivery state. A message is only `sent` once every
/// recipient is; a failed recipient keeps its error and is retried on the
/// next sweep without touching the ones that already went out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecipient {
    pub email: String,
    pub name: Option<String>,
    #[serde(default)]
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl MessageRecipient {
    pub fn new(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            email: email.into(),
            name,
            sent: false,
            sent_at: None,
            last_error: None,
        }
    }
}

/// A rendered message waiting for (or past) its send time. Immutable after
/// creation except for status, attempts and recipient delivery state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub subject: String,
    pub body: String,
    pub recipients: Vec<MessageRecipient>,
    pub format: MessageFormat,
    pub status: MessageStatus,
    pub scheduled_for: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub created_by: Option<Uuid>,
    /// Set when the message was produced by a sequence step; the dispatcher
    /// uses it to delegate advancement after a full send.
    pub sequence_id: Option<Uuid>,
    pub step_index: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledMessage {
    pub fn is_rich(&self) -> bool {
        self.format == MessageFormat::Rich
    }

    pub fn all_recipients_sent(&self) -> bool {
        self.recipients.iter().all(|r| r.sent)
    }

    pub fn pending_recipients(&self) -> impl Iterator<Item = &MessageRecipient> {
        self.recipients.iter().filter(|r| !r.sent)
    }
}
