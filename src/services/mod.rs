pub mod delay;
pub mod email;
pub mod enrollment;
pub mod notify;
pub mod stale;
pub mod status;
pub mod templates;

pub use delay::next_send_time;
pub use email::{MessageTransport, SmtpMailer, TransportError};
pub use enrollment::SequenceEnrollmentManager;
pub use notify::{OperatorNotifier, TracingNotifier};
pub use stale::{StaleLead, StaleLeadDetector};
pub use status::{StatusAction, StatusChangeDispatcher, status_actions};
pub use templates::TemplateRenderer;
