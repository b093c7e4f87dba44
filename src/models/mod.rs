pub mod leads;
pub mod messages;
pub mod sequences;

pub use leads::{InteractionKind, InteractionLogEntry, Lead, LeadStatus, StatusChangeRecord};
pub use messages::{MessageFormat, MessageRecipient, MessageStatus, ScheduledMessage};
pub use sequences::{DelayUnit, Enrollment, EnrollmentStatus, Sequence, SequenceStep};
