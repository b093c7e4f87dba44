// Error taxonomy for the automation engine
//
// Store and transport failures are converted into a failed Result at the
// boundary of each public operation; nothing escapes as a panic.

use thiserror::Error;

use crate::services::email::TransportError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AutomationError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Short operator-facing description, without internal detail. The full
    /// error is logged separately where it occurs.
    pub fn operator_message(&self) -> String {
        match self {
            Self::NotFound { what } => format!("{} not found", what),
            Self::Conflict(msg) => msg.clone(),
            Self::Transport(_) => "Message could not be sent".to_string(),
            Self::Store(_) => "A storage error occurred".to_string(),
        }
    }
}

pub type AutomationResult<T> = Result<T, AutomationError>;
