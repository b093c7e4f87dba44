// Operator-facing notification channel
//
// Purely informational: short success/failure strings after operator
// actions. The default implementation writes them to the log; the host
// application can substitute its own channel.

use tracing::{error, info};

pub trait OperatorNotifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl OperatorNotifier for TracingNotifier {
    fn success(&self, message: &str) {
        info!("{}", message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
    }
}
