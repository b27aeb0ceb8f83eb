//! Issue delay queue over the shared store.
//!
//! One sorted set maps issue ids to the Unix timestamp of their next due
//! transition. The queue carries no issue data and may lose entries on a
//! store crash: `IssueFlow::reconcile` re-derives every entry from issue
//! state, which is the queue's real durability mechanism.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::IssueId;
use crate::error::MarketError;
use crate::ports::SharedStore;

/// Name of the sorted set shared by all worker processes.
const ISSUING_LIST: &str = "issuing_list";

pub struct IssueQueue {
    store: Arc<dyn SharedStore>,
}

impl IssueQueue {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Schedule (or reschedule) an issue's next transition. Upserts the
    /// score, so checking in an already-queued issue just moves its
    /// deadline.
    pub async fn check_in(&self, issue: IssueId, due_at: DateTime<Utc>) -> Result<(), MarketError> {
        self.store
            .zadd(ISSUING_LIST, &issue.key(), due_at.timestamp() as f64)
            .await
    }

    /// Remove the entry with the earliest deadline.
    pub async fn check_out(&self) -> Result<Option<IssueId>, MarketError> {
        let popped = self.store.zpopmin(ISSUING_LIST).await?;
        Ok(popped.and_then(|(member, _)| IssueId::parse(&member)))
    }

    /// Remove a specific issue's entry (used when its state goes terminal).
    pub async fn check_out_member(&self, issue: IssueId) -> Result<(), MarketError> {
        self.store.zrem(ISSUING_LIST, &issue.key()).await
    }

    /// All issues due at or before `now`, oldest deadline first. Two issues
    /// due in the same poll cycle come back in deadline order so downstream
    /// chain calls stay rate-limited and auditable.
    pub async fn due_before(&self, now: DateTime<Utc>) -> Result<Vec<IssueId>, MarketError> {
        let members = self
            .store
            .zrangebyscore(ISSUING_LIST, now.timestamp() as f64)
            .await?;
        Ok(members
            .into_iter()
            .filter_map(|m| {
                let id = IssueId::parse(&m);
                if id.is_none() {
                    warn!(member = %m, "dropping unparsable queue member");
                }
                id
            })
            .collect())
    }
}
