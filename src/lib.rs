// Keystone Lead Lifecycle Automation Engine
//
// Enrolls leads in multi-step, time-delayed communication sequences,
// dispatches due messages on a background timer, records status-change
// history with status-keyed side effects, and flags leads that have gone
// stale. Invoked as a library by the surrounding Keystone platform; the
// record store and the outbound transport are collaborators behind traits.

pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use config::{Config, DispatchConfig, SmtpConfig};
pub use error::{AutomationError, AutomationResult};
pub use jobs::{DispatchJob, DispatchRunResult, MessageScheduler};
pub use services::{
    MessageTransport, OperatorNotifier, SequenceEnrollmentManager, SmtpMailer,
    StaleLeadDetector, StatusChangeDispatcher, TemplateRenderer, TracingNotifier,
};
pub use store::{AutomationStore, PgAutomationStore, StoreError};

#[cfg(test)]
mod tests;
