//! Scheduler driver: the periodic loops behind the state machines.
//!
//! Two loops run per process: the issue timer (reconcile once at startup,
//! then poll the delay queue) and the compensation sweep. Several processes
//! may run the same loops concurrently — every mutation they trigger is
//! either an atomic store operation or guarded by the distributed lock.
//!
//! Infra errors are logged and retried on the next tick; they never take
//! the loop down.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::MarketConfig;

use super::issue_flow::IssueFlow;
use super::sweep::CompensationSweep;

/// Handle to the spawned loops.
/// - `request_shutdown()` stops both loops after their current tick
/// - `shutdown_and_join()` waits for them to wind down
pub struct Driver {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl Driver {
    /// Spawn the issue timer and the compensation sweep.
    pub fn spawn(
        issues: Arc<IssueFlow>,
        sweep: Arc<CompensationSweep>,
        config: &MarketConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(2);
        {
            let mut rx = shutdown_rx.clone();
            let poll = config.poll_interval;
            joins.push(tokio::spawn(async move {
                // The queue may have lost entries while we were down.
                if let Err(e) = issues.reconcile().await {
                    warn!(error = %e, "startup reconcile failed, polling anyway");
                }
                loop {
                    if *rx.borrow() {
                        break;
                    }
                    tokio::select! {
                        _ = rx.changed() => continue,
                        _ = tokio::time::sleep(poll) => {}
                    }
                    if let Err(e) = issues.poll_once().await {
                        warn!(error = %e, "issue timer tick failed");
                    }
                }
                info!("issue timer stopped");
            }));
        }
        {
            let mut rx = shutdown_rx;
            let interval = config.sweep_interval;
            joins.push(tokio::spawn(async move {
                loop {
                    if *rx.borrow() {
                        break;
                    }
                    tokio::select! {
                        _ = rx.changed() => continue,
                        _ = tokio::time::sleep(interval) => {}
                    }
                    if let Err(e) = sweep.run_once().await {
                        warn!(error = %e, "compensation sweep failed");
                    }
                }
                info!("compensation sweep stopped");
            }));
        }

        Self { shutdown_tx, joins }
    }

    /// Ask both loops to stop. In-flight chain calls are not cancelled;
    /// the loops finish their tick first.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Issue, IssueId, IssueStatus, User};
    use crate::impls::{InMemoryMarketRepo, InMemorySharedStore, MockChain};
    use crate::ports::{ChainClient, Clock, MarketRepo, SystemClock};
    use crate::queue::IssueQueue;
    use chrono::Utc;
    use std::time::Duration;

    #[tokio::test]
    async fn driver_opens_a_due_sale_and_shuts_down() {
        let repo = Arc::new(InMemoryMarketRepo::new());
        let chain = Arc::new(MockChain::new());
        let queue = Arc::new(IssueQueue::new(Arc::new(InMemorySharedStore::new())));
        let clock = Arc::new(SystemClock);

        let author = User::new(Address::new("0xauthor"));
        let issue = Issue {
            id: IssueId::generate(),
            author: author.id,
            token_id: 1,
            quantity: 5,
            price: 1.0,
            royalty: 10.0,
            buy_limit: 5,
            published_at: Utc::now(),
            duration: 60,
            n_circulations: 0,
            status: IssueStatus::PreSale,
            destroy_log: String::new(),
        };
        repo.insert_user(author).await.unwrap();
        repo.insert_issue(issue.clone()).await.unwrap();
        // No check-in: startup reconcile must rebuild the entry itself.

        let issues = Arc::new(IssueFlow::new(
            repo.clone() as Arc<dyn MarketRepo>,
            chain.clone() as Arc<dyn ChainClient>,
            queue,
            clock as Arc<dyn Clock>,
        ));
        let sweep = Arc::new(CompensationSweep::new(
            repo.clone() as Arc<dyn MarketRepo>,
            chain as Arc<dyn ChainClient>,
            MarketConfig::default(),
        ));

        let config = MarketConfig {
            poll_interval: Duration::from_millis(10),
            sweep_interval: Duration::from_millis(10),
            ..MarketConfig::default()
        };
        let driver = Driver::spawn(issues, sweep, &config);

        // A few ticks are plenty for reconcile + open.
        tokio::time::sleep(Duration::from_millis(100)).await;
        driver.shutdown_and_join().await;

        assert_eq!(repo.issue(issue.id).await.unwrap().status, IssueStatus::OnSale);
    }
}
