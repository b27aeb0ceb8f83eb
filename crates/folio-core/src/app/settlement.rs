//! Transaction settlement state machine: pending -> {success, failure}.
//!
//! Only first-class purchases pass through `pending` — they are the ones
//! that touch the chain. The very first sale of an issue mints its whole
//! supply, so that call is serialized behind the per-issue distributed
//! lock; whoever loses the race re-checks circulation after acquiring and
//! falls back to the ordinary non-minting trade call.
//!
//! Chain failures become a terminal `failure` status here and are
//! compensated later by the sweep. Lock and store failures propagate as
//! transient errors: the transaction stays `pending` and the caller's
//! driver retries.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::MarketConfig;
use crate::domain::{SettlementPlan, Source, Transaction, TxnId, TxnStatus};
use crate::error::MarketError;
use crate::lock::LockManager;
use crate::ports::{ChainClient, MarketRepo, Receipt};

pub struct SettlementFlow {
    repo: Arc<dyn MarketRepo>,
    chain: Arc<dyn ChainClient>,
    locks: Arc<LockManager>,
    config: MarketConfig,
}

impl SettlementFlow {
    pub fn new(
        repo: Arc<dyn MarketRepo>,
        chain: Arc<dyn ChainClient>,
        locks: Arc<LockManager>,
        config: MarketConfig,
    ) -> Self {
        Self {
            repo,
            chain,
            locks,
            config,
        }
    }

    /// "Transaction saved" hook: dispatch on the saved status.
    pub async fn handle(&self, id: TxnId) -> Result<(), MarketError> {
        let txn = self.repo.transaction(id).await?;
        match txn.status {
            TxnStatus::Pending => self.pending(txn).await,
            TxnStatus::Success => self.success(txn).await,
            TxnStatus::Failure => {
                self.failure(&txn);
                Ok(())
            }
        }
    }

    /// Settle a pending first-class purchase on-chain.
    ///
    /// The very first sale mints the issue's whole supply, so that path
    /// holds the per-issue lock for the entire call — chain confirmation
    /// and bookkeeping included. Releasing only after `n_circulations` is
    /// written makes the next acquirer's re-check decisive: it either sees
    /// the mint or the lock.
    async fn pending(&self, txn: Transaction) -> Result<(), MarketError> {
        if txn.source == Source::SecondClass {
            // Resales settle purely in the ledger and are recorded already
            // resolved; a pending one is a bug in the buy flow.
            return Err(MarketError::Invariant(format!(
                "second-class transaction {} must not enter pending",
                txn.id
            )));
        }

        if self.repo.issue(txn.issue).await?.n_circulations == 0 {
            let guard = self
                .locks
                .acquire(&LockManager::first_trade_key(txn.issue))
                .await?;
            let result = self.settle_first_candidate(&txn).await;
            guard.release().await;
            match result {
                // None: someone minted while we waited for the lock; this
                // is an ordinary trade after all.
                Ok(None) => {}
                Ok(Some(())) => return Ok(()),
                Err(e) => return self.absorb(txn, e).await,
            }
        }

        let outcome = self.trade_on_chain(&txn, 0).await;
        match outcome {
            Ok(receipt) => self.finish(txn, receipt).await,
            Err(e) => self.absorb(txn, e).await,
        }
    }

    /// Inside the lock: re-check circulation, and if this is still the
    /// first sale, mint, push token metadata and finish the transaction.
    async fn settle_first_candidate(
        &self,
        txn: &Transaction,
    ) -> Result<Option<()>, MarketError> {
        let issue = self.repo.issue(txn.issue).await?;
        if issue.n_circulations > 0 {
            return Ok(None);
        }

        let receipt = self.trade_on_chain(txn, issue.quantity).await?;
        if receipt.ok() {
            // Royalty/author metadata rides along with the first sale. Its
            // failure does not revert the trade; flagged for manual
            // remediation.
            let author = self.repo.user(issue.author).await?;
            match self
                .chain
                .set_token_info(issue.token_id, &author.address, issue.royalty, issue.price)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    warn!(issue = %issue.id, "set_token_info rejected, needs manual fix")
                }
                Err(e) => {
                    warn!(issue = %issue.id, error = %e, "set_token_info failed, needs manual fix")
                }
            }
        }
        self.finish(txn.clone(), receipt).await?;
        Ok(Some(()))
    }

    /// Submit the trade and wait for its receipt.
    async fn trade_on_chain(
        &self,
        txn: &Transaction,
        mint_amount: u32,
    ) -> Result<Receipt, MarketError> {
        let issue = self.repo.issue(txn.issue).await?;
        let seller = self.repo.user(txn.seller).await?;
        let buyer = self.repo.user(txn.buyer).await?;
        let payment = txn.quantity as f64 * txn.price * (1.0 - self.config.platform_fee);
        self.chain
            .first_trade(
                &seller.address,
                payment,
                &buyer.address,
                issue.token_id,
                txn.quantity,
                mint_amount,
            )
            .await
    }

    /// Map the receipt to a terminal status and run the terminal step.
    async fn finish(&self, txn: Transaction, receipt: Receipt) -> Result<(), MarketError> {
        let status = if receipt.ok() {
            TxnStatus::Success
        } else {
            TxnStatus::Failure
        };
        self.repo
            .set_transaction_outcome(txn.id, status, &receipt.hash)
            .await?;
        info!(txn = %txn.id, hash = %receipt.hash, ?status, "settled on-chain");
        match status {
            TxnStatus::Success => {
                let txn = self.repo.transaction(txn.id).await?;
                self.success(txn).await
            }
            _ => {
                self.failure(&txn);
                Ok(())
            }
        }
    }

    /// A chain error becomes a terminal failure so the transaction never
    /// sits in pending starving retries; transient infra errors propagate
    /// and the driver retries the still-pending transaction.
    async fn absorb(&self, txn: Transaction, e: MarketError) -> Result<(), MarketError> {
        if e.is_transient() {
            return Err(e);
        }
        error!(txn = %txn.id, error = %e, "chain settlement failed");
        // Keep whatever hash was recorded before things went wrong; the
        // sweep refunds against the row either way.
        let hash = self
            .repo
            .transaction(txn.id)
            .await
            .map(|t| t.hash)
            .unwrap_or_default();
        self.repo
            .set_transaction_outcome(txn.id, TxnStatus::Failure, &hash)
            .await?;
        self.failure(&txn);
        Ok(())
    }

    /// Apply the settlement bookkeeping as one atomic unit.
    async fn success(&self, txn: Transaction) -> Result<(), MarketError> {
        let issue = self.repo.issue(txn.issue).await?;
        let plan = SettlementPlan::for_success(
            &txn,
            &issue,
            self.config.platform_fee,
            &self.config.currency,
        );
        self.repo.apply_settlement(txn.id, &plan).await?;
        info!(txn = %txn.id, issue = %txn.issue, quantity = txn.quantity, "settlement booked");
        Ok(())
    }

    /// No mutation: the compensation sweep owns recovery.
    fn failure(&self, txn: &Transaction) {
        warn!(txn = %txn.id, source = ?txn.source, "settlement failed, queued for compensation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Issue, IssueId, IssueStatus, Trade, TradeId, User, UserId};
    use crate::impls::{ChainCall, InMemoryMarketRepo, InMemorySharedStore, MockChain};
    use crate::ports::{Clock, SystemClock};
    use chrono::Utc;
    use rand::Rng;
    use std::time::Duration;

    struct Fixture {
        flow: Arc<SettlementFlow>,
        repo: Arc<InMemoryMarketRepo>,
        chain: Arc<MockChain>,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryMarketRepo::new());
        let chain = Arc::new(MockChain::new());
        let locks = Arc::new(LockManager::new(
            Arc::new(InMemorySharedStore::new()),
            Arc::new(SystemClock) as Arc<dyn Clock>,
            Duration::from_secs(2),
            Duration::from_millis(5),
        ));
        let flow = Arc::new(SettlementFlow::new(
            repo.clone() as Arc<dyn MarketRepo>,
            chain.clone() as Arc<dyn ChainClient>,
            locks,
            MarketConfig::default(),
        ));
        Fixture { flow, repo, chain }
    }

    async fn seed_user(fx: &Fixture, addr: &str) -> UserId {
        let user = User::new(Address::new(addr));
        let id = user.id;
        fx.repo.insert_user(user).await.unwrap();
        id
    }

    /// An issue already on sale with its first-release listing.
    async fn seed_on_sale(fx: &Fixture, quantity: u32) -> (Issue, Trade) {
        let author = seed_user(fx, "0xauthor").await;
        let issue = Issue {
            id: IssueId::generate(),
            author,
            token_id: 7,
            quantity,
            price: 2.0,
            royalty: 10.0,
            buy_limit: quantity,
            published_at: Utc::now(),
            duration: 5,
            n_circulations: 0,
            status: IssueStatus::OnSale,
            destroy_log: String::new(),
        };
        let trade = Trade::first_release(author, issue.id, quantity, issue.price);
        fx.repo.insert_issue(issue.clone()).await.unwrap();
        fx.repo.insert_trade(trade.clone()).await.unwrap();
        (issue, trade)
    }

    async fn pending_purchase(fx: &Fixture, trade: &Trade, buyer: UserId, quantity: u32) -> TxnId {
        let txn = Transaction::for_trade(trade, buyer, quantity, Utc::now());
        let id = txn.id;
        fx.repo.insert_transaction(txn).await.unwrap();
        id
    }

    #[tokio::test]
    async fn first_purchase_mints_and_books_everything() {
        let fx = fixture();
        let (issue, trade) = seed_on_sale(&fx, 10).await;
        let buyer = seed_user(&fx, "0xbuyer").await;

        let txn = pending_purchase(&fx, &trade, buyer, 3).await;
        fx.flow.handle(txn).await.unwrap();

        // The mint call carried the full supply and the after-fee payment.
        let calls = fx.chain.calls().await;
        assert!(calls.iter().any(|c| matches!(
            c,
            ChainCall::FirstTrade { mint_amount: 10, quantity: 3, payment: 5_400_000, .. }
        )));
        assert!(calls
            .iter()
            .any(|c| matches!(c, ChainCall::SetTokenInfo { token_id: 7, royalty_pct_pct: 1000, .. })));

        let settled = fx.repo.transaction(txn).await.unwrap();
        assert_eq!(settled.status, TxnStatus::Success);
        assert!(!settled.hash.is_empty());

        assert_eq!(fx.repo.issue(issue.id).await.unwrap().n_circulations, 3);
        assert_eq!(fx.repo.trade(trade.id).await.unwrap().quantity, 7);
        assert_eq!(fx.repo.asset(buyer, issue.id).await.unwrap().unwrap().quantity, 3);

        let benefits = fx.repo.benefits_for(txn).await.unwrap();
        assert_eq!(benefits.len(), 1);
        assert_eq!(benefits[0].user, trade.user);
        assert!((benefits[0].amount - 3.0 * 2.0 * 0.9).abs() < 1e-9);

        // The buyer can now list resales.
        assert!(fx.repo.user(buyer).await.unwrap().seller);
    }

    #[tokio::test]
    async fn later_purchases_do_not_mint_again() {
        let fx = fixture();
        let (_, trade) = seed_on_sale(&fx, 10).await;
        let first = seed_user(&fx, "0xfirst").await;
        let second = seed_user(&fx, "0xsecond").await;

        let txn = pending_purchase(&fx, &trade, first, 3).await;
        fx.flow.handle(txn).await.unwrap();
        let txn = pending_purchase(&fx, &trade, second, 2).await;
        fx.flow.handle(txn).await.unwrap();

        assert_eq!(fx.chain.mint_calls().await, 1);
        let calls = fx.chain.calls().await;
        assert!(calls
            .iter()
            .any(|c| matches!(c, ChainCall::FirstTrade { mint_amount: 0, quantity: 2, .. })));
    }

    #[tokio::test]
    async fn chain_rejection_becomes_failure_without_bookkeeping() {
        let fx = fixture();
        let (issue, trade) = seed_on_sale(&fx, 10).await;
        let buyer = seed_user(&fx, "0xbuyer").await;
        fx.chain.reject_next_trades(1);

        let txn = pending_purchase(&fx, &trade, buyer, 3).await;
        fx.flow.handle(txn).await.unwrap();

        let settled = fx.repo.transaction(txn).await.unwrap();
        assert_eq!(settled.status, TxnStatus::Failure);
        assert!(!settled.hash.is_empty());

        assert_eq!(fx.repo.issue(issue.id).await.unwrap().n_circulations, 0);
        assert_eq!(fx.repo.trade(trade.id).await.unwrap().quantity, 10);
        assert!(fx.repo.asset(buyer, issue.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rpc_error_becomes_failure_not_stuck_pending() {
        let fx = fixture();
        let (_, trade) = seed_on_sale(&fx, 10).await;
        let buyer = seed_user(&fx, "0xbuyer").await;
        fx.chain.error_next_trades(1);

        let txn = pending_purchase(&fx, &trade, buyer, 1).await;
        fx.flow.handle(txn).await.unwrap();

        let settled = fx.repo.transaction(txn).await.unwrap();
        assert_eq!(settled.status, TxnStatus::Failure);
        assert!(settled.hash.is_empty());
    }

    #[tokio::test]
    async fn retry_after_failure_mints_on_second_attempt() {
        let fx = fixture();
        let (issue, trade) = seed_on_sale(&fx, 10).await;
        let buyer = seed_user(&fx, "0xbuyer").await;

        fx.chain.error_next_trades(1);
        let failed = pending_purchase(&fx, &trade, buyer, 2).await;
        fx.flow.handle(failed).await.unwrap();

        // Circulation is still zero, so a later attempt is a legitimate
        // first sale and mints.
        let retry = pending_purchase(&fx, &trade, buyer, 2).await;
        fx.flow.handle(retry).await.unwrap();

        assert_eq!(fx.chain.mint_calls().await, 1);
        assert_eq!(fx.repo.issue(issue.id).await.unwrap().n_circulations, 2);
        assert_eq!(
            fx.repo.transaction(retry).await.unwrap().status,
            TxnStatus::Success
        );
    }

    #[tokio::test]
    async fn concurrent_first_purchases_mint_exactly_once() {
        let fx = fixture();
        let (issue, trade) = seed_on_sale(&fx, 10).await;
        let a = seed_user(&fx, "0xa").await;
        let b = seed_user(&fx, "0xb").await;
        // Make the winner hold the lock long enough for a real race.
        fx.chain.set_latency(Duration::from_millis(30)).await;

        let txn_a = pending_purchase(&fx, &trade, a, 1).await;
        let txn_b = pending_purchase(&fx, &trade, b, 1).await;

        let (ra, rb) = tokio::join!(
            {
                let flow = fx.flow.clone();
                async move { flow.handle(txn_a).await }
            },
            {
                let flow = fx.flow.clone();
                async move { flow.handle(txn_b).await }
            }
        );
        ra.unwrap();
        rb.unwrap();

        assert_eq!(fx.chain.mint_calls().await, 1);
        assert_eq!(fx.repo.issue(issue.id).await.unwrap().n_circulations, 2);
        for txn in [txn_a, txn_b] {
            assert_eq!(
                fx.repo.transaction(txn).await.unwrap().status,
                TxnStatus::Success
            );
        }
    }

    #[tokio::test]
    async fn second_class_settles_in_the_ledger_only() {
        let fx = fixture();
        let (issue, first) = seed_on_sale(&fx, 10).await;
        let seller = seed_user(&fx, "0xreseller").await;
        let buyer = seed_user(&fx, "0xbuyer2").await;

        // Seller holds 5 units from an earlier purchase.
        fx.repo
            .apply_settlement(
                TxnId::generate(),
                &SettlementPlan {
                    issue: issue.id,
                    trade: first.id,
                    circulation_delta: 5,
                    trade_decrement: 5,
                    seller_asset_decrement: None,
                    buyer_asset_increment: (seller, 5),
                    benefits: vec![],
                    grant_seller: seller,
                },
            )
            .await
            .unwrap();

        let resale = Trade {
            id: TradeId::generate(),
            user: seller,
            issue: issue.id,
            quantity: 5,
            price: 4.0,
            first_release: false,
        };
        fx.repo.insert_trade(resale.clone()).await.unwrap();

        // The resale flow records the transaction already successful.
        let mut txn = Transaction::for_trade(&resale, buyer, 2, Utc::now());
        txn.status = TxnStatus::Success;
        let id = txn.id;
        fx.repo.insert_transaction(txn).await.unwrap();
        let chain_calls_before = fx.chain.calls().await.len();
        fx.flow.handle(id).await.unwrap();

        // Ledger moved, chain untouched.
        assert_eq!(fx.chain.calls().await.len(), chain_calls_before);
        assert_eq!(fx.repo.asset(seller, issue.id).await.unwrap().unwrap().quantity, 3);
        assert_eq!(fx.repo.asset(buyer, issue.id).await.unwrap().unwrap().quantity, 2);
        // Circulation counts only first-class sales.
        assert_eq!(fx.repo.issue(issue.id).await.unwrap().n_circulations, 5);

        let benefits = fx.repo.benefits_for(id).await.unwrap();
        assert_eq!(benefits.len(), 2);
        let total: f64 = benefits.iter().map(|b| b.amount).sum();
        assert!((total - 2.0 * 4.0 * 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn second_class_pending_is_rejected() {
        let fx = fixture();
        let (issue, _) = seed_on_sale(&fx, 10).await;
        let seller = seed_user(&fx, "0xreseller").await;
        let buyer = seed_user(&fx, "0xbuyer").await;

        let resale = Trade {
            id: TradeId::generate(),
            user: seller,
            issue: issue.id,
            quantity: 5,
            price: 4.0,
            first_release: false,
        };
        fx.repo.insert_trade(resale.clone()).await.unwrap();
        let txn = Transaction::for_trade(&resale, buyer, 1, Utc::now());
        let id = txn.id;
        fx.repo.insert_transaction(txn).await.unwrap();

        let err = fx.flow.handle(id).await.unwrap_err();
        assert!(matches!(err, MarketError::Invariant(_)));
    }

    /// Circulation never exceeds quantity, however many concurrent buyers
    /// pile on. Oversubscribed attempts fail their bookkeeping unit; the
    /// counter stays within bounds.
    #[tokio::test]
    async fn circulation_never_exceeds_quantity_under_concurrency() {
        let fx = fixture();
        let quantity = 8;
        let (issue, trade) = seed_on_sale(&fx, quantity).await;

        let wants: Vec<u32> = {
            let mut rng = rand::thread_rng();
            (0..6).map(|_| rng.gen_range(1..=3)).collect()
        };

        let mut joins = Vec::new();
        for (i, want) in wants.into_iter().enumerate() {
            let buyer = seed_user(&fx, &format!("0xbuyer{i}")).await;
            let txn = pending_purchase(&fx, &trade, buyer, want).await;
            let flow = fx.flow.clone();
            joins.push(tokio::spawn(async move {
                // Oversold attempts error on their atomic unit; fine.
                let _ = flow.handle(txn).await;
            }));
        }
        for j in joins {
            j.await.unwrap();
        }

        let settled = fx.repo.issue(issue.id).await.unwrap();
        assert!(
            settled.n_circulations <= quantity,
            "circulation {} exceeded quantity {quantity}",
            settled.n_circulations
        );
        assert_eq!(fx.chain.mint_calls().await, 1);
    }
}
