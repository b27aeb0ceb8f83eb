//! Compensation sweep: refund buyers of failed first-class transactions.
//!
//! At-least-once, oldest first, bounded batches (the chain RPC is the
//! scarce resource). A refunded transaction row is deleted and never
//! re-enters the sweep; a failed refund simply stays for the next pass —
//! there is no backoff beyond the sweep interval.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::ports::{ChainClient, MarketRepo};

pub struct CompensationSweep {
    repo: Arc<dyn MarketRepo>,
    chain: Arc<dyn ChainClient>,
    config: MarketConfig,
}

impl CompensationSweep {
    pub fn new(
        repo: Arc<dyn MarketRepo>,
        chain: Arc<dyn ChainClient>,
        config: MarketConfig,
    ) -> Self {
        Self {
            repo,
            chain,
            config,
        }
    }

    /// One pass over the oldest failed first-class transactions.
    pub async fn run_once(&self) -> Result<(), MarketError> {
        let batch = self
            .repo
            .failed_first_class(self.config.refund_batch)
            .await?;
        for txn in batch {
            let buyer = match self.repo.user(txn.buyer).await {
                Ok(user) => user,
                Err(e) => {
                    warn!(txn = %txn.id, error = %e, "refund skipped: no buyer record");
                    continue;
                }
            };
            let amount = txn.quantity as f64 * txn.price;
            match self.chain.refund(&buyer.address, amount).await {
                Ok(true) => {
                    // Resolved: drop the row so it never re-enters the sweep.
                    self.repo.delete_transaction(txn.id).await?;
                    info!(txn = %txn.id, buyer = %buyer.address, amount, "buyer refunded");
                }
                Ok(false) => {
                    warn!(txn = %txn.id, "refund rejected, retrying next sweep");
                }
                Err(e) => {
                    warn!(txn = %txn.id, error = %e, "refund failed, retrying next sweep");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Address, Issue, IssueId, IssueStatus, Trade, Transaction, TxnStatus, User, UserId,
    };
    use crate::impls::{ChainCall, InMemoryMarketRepo, MockChain};
    use chrono::{Duration, Utc};

    struct Fixture {
        sweep: CompensationSweep,
        repo: Arc<InMemoryMarketRepo>,
        chain: Arc<MockChain>,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryMarketRepo::new());
        let chain = Arc::new(MockChain::new());
        let sweep = CompensationSweep::new(
            repo.clone() as Arc<dyn MarketRepo>,
            chain.clone() as Arc<dyn ChainClient>,
            MarketConfig::default(),
        );
        Fixture { sweep, repo, chain }
    }

    async fn seed_failed_txn(fx: &Fixture, age_minutes: i64) -> (Transaction, UserId) {
        let author = User::new(Address::new("0xauthor"));
        let buyer = User::new(Address::new(format!("0xbuyer{age_minutes}")));
        let issue = Issue {
            id: IssueId::generate(),
            author: author.id,
            token_id: 1,
            quantity: 10,
            price: 2.0,
            royalty: 10.0,
            buy_limit: 10,
            published_at: Utc::now(),
            duration: 5,
            n_circulations: 0,
            status: IssueStatus::OnSale,
            destroy_log: String::new(),
        };
        let trade = Trade::first_release(author.id, issue.id, 10, 2.0);
        let mut txn = Transaction::for_trade(&trade, buyer.id, 3, Utc::now());
        txn.status = TxnStatus::Failure;
        txn.created_at = Utc::now() - Duration::minutes(age_minutes);

        fx.repo.insert_user(author).await.unwrap();
        let buyer_id = buyer.id;
        fx.repo.insert_user(buyer).await.unwrap();
        fx.repo.insert_issue(issue).await.unwrap();
        fx.repo.insert_trade(trade).await.unwrap();
        fx.repo.insert_transaction(txn.clone()).await.unwrap();
        (txn, buyer_id)
    }

    #[tokio::test]
    async fn refunded_transactions_are_deleted_and_stay_gone() {
        let fx = fixture();
        let (txn, _) = seed_failed_txn(&fx, 10).await;

        fx.sweep.run_once().await.unwrap();

        // 3 * 2.0 refunded to the buyer, row gone.
        assert!(fx.chain.calls().await.iter().any(|c| matches!(
            c,
            ChainCall::Refund { amount: 6_000_000, .. }
        )));
        assert!(fx.repo.transaction(txn.id).await.is_err());

        // The next sweep finds nothing: no double refund.
        fx.sweep.run_once().await.unwrap();
        let refunds = fx
            .chain
            .calls()
            .await
            .iter()
            .filter(|c| matches!(c, ChainCall::Refund { .. }))
            .count();
        assert_eq!(refunds, 1);
    }

    #[tokio::test]
    async fn failed_refund_stays_for_the_next_sweep() {
        let fx = fixture();
        let (txn, _) = seed_failed_txn(&fx, 10).await;

        fx.chain.set_refunds_fail(true);
        fx.sweep.run_once().await.unwrap();
        assert!(fx.repo.transaction(txn.id).await.is_ok());

        fx.chain.set_refunds_fail(false);
        fx.sweep.run_once().await.unwrap();
        assert!(fx.repo.transaction(txn.id).await.is_err());
    }

    #[tokio::test]
    async fn batch_is_bounded_and_oldest_first() {
        let fx = fixture();
        for age in [5, 40, 10, 30, 20, 50, 60] {
            seed_failed_txn(&fx, age).await;
        }

        fx.sweep.run_once().await.unwrap();

        let refunds: Vec<_> = fx
            .chain
            .calls()
            .await
            .into_iter()
            .filter(|c| matches!(c, ChainCall::Refund { .. }))
            .collect();
        // Default batch is 5 of the 7 failures.
        assert_eq!(refunds.len(), 5);
    }
}
