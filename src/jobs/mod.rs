// Background dispatch of scheduled messages
//
// The scheduler wraps a tokio interval task; each tick runs one DispatchJob
// sweep over due messages.

pub mod dispatch;
pub mod scheduler;

pub use dispatch::{DispatchJob, DispatchRunResult};
pub use scheduler::{DispatchRunLog, MessageScheduler};
