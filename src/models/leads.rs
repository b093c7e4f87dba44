// Lead records and their permanent history (status changes, interaction log)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

/// Pipeline position of a lead. The status action table in
/// `services::status` is keyed by this enum, so adding a variant forces a
/// decision about its side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "lead_status", rename_all = "kebab-case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    TourScheduled,
    ApplicationSent,
    ClosedWon,
    ClosedLost,
    Unresponsive,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::TourScheduled => "tour-scheduled",
            Self::ApplicationSent => "application-sent",
            Self::ClosedWon => "closed-won",
            Self::ClosedLost => "closed-lost",
            Self::Unresponsive => "unresponsive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "contacted" => Some(Self::Contacted),
            "qualified" => Some(Self::Qualified),
            "tour-scheduled" => Some(Self::TourScheduled),
            "application-sent" => Some(Self::ApplicationSent),
            "closed-won" => Some(Self::ClosedWon),
            "closed-lost" => Some(Self::ClosedLost),
            "unresponsive" => Some(Self::Unresponsive),
            _ => None,
        }
    }

    /// Terminal statuses never re-enter the pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ClosedWon | Self::ClosedLost)
    }
}

/// A contact in the sales pipeline. Owned by the surrounding application;
/// the engine reads leads and updates only their status field.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub status: LeadStatus,
    pub source: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit record of a status transition. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StatusChangeRecord {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub previous_status: LeadStatus,
    pub new_status: LeadStatus,
    pub changed_by: Option<Uuid>,
    pub changed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "interaction_kind", rename_all = "kebab-case")]
pub enum InteractionKind {
    StatusChange,
    SequenceEnrolled,
    SequenceMessageSent,
    Note,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusChange => "status-change",
            Self::SequenceEnrolled => "sequence-enrolled",
            Self::SequenceMessageSent => "sequence-message-sent",
            Self::Note => "note",
        }
    }
}

/// Append-only activity trail for a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionLogEntry {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub kind: InteractionKind,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}

impl InteractionLogEntry {
    pub fn new(
        lead_id: Uuid,
        kind: InteractionKind,
        metadata: JsonValue,
        created_at: DateTime<Utc>,
        created_by: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            kind,
            metadata,
            created_at,
            created_by,
        }
    }
}
