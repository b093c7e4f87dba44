// Stale-lead detection: leads sitting in one status past a threshold
//
// Read-only pass over current state; never mutates anything.

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::AutomationResult;
use crate::models::{Lead, LeadStatus};
use crate::store::AutomationStore;

#[derive(Debug, Clone)]
pub struct StaleLead {
    pub lead: Lead,
    pub days_in_status: i64,
}

pub struct StaleLeadDetector {
    store: Arc<dyn AutomationStore>,
    clock: Arc<dyn Clock>,
}

impl StaleLeadDetector {
    pub fn new(store: Arc<dyn AutomationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Leads whose current status has a threshold configured and whose time
    /// in that status exceeds it. The transition time is the most recent
    /// status change into the current status, falling back to the lead's
    /// creation time when no such record exists.
    pub async fn find_stale(
        &self,
        thresholds: &HashMap<LeadStatus, i64>,
    ) -> AutomationResult<Vec<StaleLead>> {
        let now = self.clock.now();
        let mut stale = Vec::new();

        for lead in self.store.leads().await? {
            let Some(&max_days) = thresholds.get(&lead.status) else {
                continue;
            };

            let transition_time = self
                .store
                .status_history(lead.id)
                .await?
                .into_iter()
                .find(|record| record.new_status == lead.status)
                .map(|record| record.changed_at)
                .unwrap_or(lead.created_at);

            let days_in_status = (now - transition_time).num_days();
            if days_in_status > max_days {
                stale.push(StaleLead {
                    lead,
                    days_in_status,
                });
            }
        }

        Ok(stale)
    }
}
