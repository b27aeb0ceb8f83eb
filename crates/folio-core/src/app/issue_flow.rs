//! Issue state machine: pre_sale -> on_sale -> {off_sale, unsold}.
//!
//! Driven by the delay queue: creation checks in the open deadline, the
//! open step checks in the close deadline, the close step removes the
//! entry. Every step applies through one atomic repo call, so a crash
//! mid-transition leaves either the old state (the entry is still queued
//! and the next poll retries) or the new one (the retry is rejected as an
//! invalid transition and the entry just gets cleaned up).

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{Issue, IssueId, IssueStatus, IssueTransition, Trade};
use crate::error::MarketError;
use crate::ports::{ChainClient, Clock, MarketRepo};
use crate::queue::IssueQueue;

pub struct IssueFlow {
    repo: Arc<dyn MarketRepo>,
    chain: Arc<dyn ChainClient>,
    queue: Arc<IssueQueue>,
    clock: Arc<dyn Clock>,
}

impl IssueFlow {
    pub fn new(
        repo: Arc<dyn MarketRepo>,
        chain: Arc<dyn ChainClient>,
        queue: Arc<IssueQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            chain,
            queue,
            clock,
        }
    }

    /// "Issue created" hook: schedule the sale-open deadline. The issue
    /// itself is not touched.
    pub async fn on_created(&self, issue: &Issue) -> Result<(), MarketError> {
        if issue.status != IssueStatus::PreSale {
            return Ok(());
        }
        info!(issue = %issue.id, due_at = %issue.published_at, "pre-sale issue queued");
        self.queue.check_in(issue.id, issue.published_at).await
    }

    /// Drive one due issue through its next transition.
    pub async fn advance(&self, id: IssueId) -> Result<(), MarketError> {
        let issue = self.repo.issue(id).await?;
        match issue.status {
            IssueStatus::PreSale => self.open(issue).await,
            IssueStatus::OnSale => self.close(issue).await,
            // Already terminal: a crash-retry or stale entry. Dropping the
            // entry is the only thing left to do.
            IssueStatus::OffSale | IssueStatus::Unsold => self.queue.check_out_member(id).await,
        }
    }

    /// PreSale -> OnSale: list the first release and schedule the close.
    async fn open(&self, issue: Issue) -> Result<(), MarketError> {
        let trade = Trade::first_release(issue.author, issue.id, issue.quantity, issue.price);
        self.repo
            .apply_issue_transition(issue.id, IssueTransition::Open { trade })
            .await?;
        self.queue.check_in(issue.id, issue.closes_at()).await?;
        info!(issue = %issue.id, closes_at = %issue.closes_at(), "sale opened");
        Ok(())
    }

    /// OnSale -> OffSale (something sold: burn the rest) or Unsold
    /// (nothing sold: delist, nothing was minted to third parties).
    async fn close(&self, issue: Issue) -> Result<(), MarketError> {
        if issue.n_circulations > 0 {
            let destroy_log = self.burn_unsold(&issue).await;
            self.repo
                .apply_issue_transition(issue.id, IssueTransition::Close { destroy_log })
                .await?;
            info!(issue = %issue.id, sold = issue.n_circulations, "sale closed");
        } else {
            self.repo
                .apply_issue_transition(issue.id, IssueTransition::Expire)
                .await?;
            info!(issue = %issue.id, "sale expired unsold");
        }
        self.queue.check_out_member(issue.id).await
    }

    /// Best-effort burn of unsold units. Failures are logged and never
    /// block the close: buyer-facing state does not depend on the cleanup.
    async fn burn_unsold(&self, issue: &Issue) -> String {
        let unsold = issue.unsold_quantity();
        if unsold == 0 {
            return String::new();
        }
        let owner = match self.repo.user(issue.author).await {
            Ok(user) => user.address,
            Err(e) => {
                warn!(issue = %issue.id, error = %e, "burn skipped: no author record");
                return String::new();
            }
        };
        match self.chain.burn(&owner, issue.token_id, unsold).await {
            Ok((hash, true)) => {
                info!(issue = %issue.id, unsold, hash = %hash, "unsold inventory burned");
                hash
            }
            Ok((hash, false)) => {
                warn!(issue = %issue.id, hash = %hash, "burn rejected on-chain");
                hash
            }
            Err(e) => {
                warn!(issue = %issue.id, error = %e, "burn failed");
                String::new()
            }
        }
    }

    /// Rebuild the delay queue from issue state. The queue itself is
    /// allowed to lose entries; this pass is its durability mechanism.
    pub async fn reconcile(&self) -> Result<(), MarketError> {
        for issue in self.repo.issues().await? {
            match issue.status {
                IssueStatus::PreSale => self.queue.check_in(issue.id, issue.published_at).await?,
                IssueStatus::OnSale => self.queue.check_in(issue.id, issue.closes_at()).await?,
                IssueStatus::OffSale | IssueStatus::Unsold => {
                    self.queue.check_out_member(issue.id).await?
                }
            }
        }
        Ok(())
    }

    /// One scheduler tick: every due issue, in deadline order.
    pub async fn poll_once(&self) -> Result<(), MarketError> {
        let due = self.queue.due_before(self.clock.now()).await?;
        for id in due {
            if let Err(e) = self.advance(id).await {
                // The entry stays queued unless the step completed; the
                // next tick retries.
                warn!(issue = %id, error = %e, "issue transition failed");
            }
        }
        Ok(())
    }
}
