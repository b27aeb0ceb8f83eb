//! Market facade: wiring plus the event hooks the outer layers call.
//!
//! The CRUD/persistence layer stays outside the core; it reaches in through
//! three hooks: "issue created" (enters the sale scheduler), "transaction
//! saved" (enters the settlement state machine) and `submit_purchase`, the
//! thin constructor the buy flow uses to record a purchase against a
//! listing. Status fields flow back out through `counts` and the repo.

use std::sync::Arc;

use crate::config::MarketConfig;
use crate::domain::{
    Issue, IssueStatus, Source, Trade, TradeId, Transaction, TxnId, TxnStatus, User, UserId,
};
use crate::error::MarketError;
use crate::lock::LockManager;
use crate::observability::MarketCounts;
use crate::ports::{ChainClient, Clock, MarketRepo, SharedStore};
use crate::queue::IssueQueue;

use super::driver::Driver;
use super::issue_flow::IssueFlow;
use super::settlement::SettlementFlow;
use super::sweep::CompensationSweep;

pub struct Market {
    repo: Arc<dyn MarketRepo>,
    clock: Arc<dyn Clock>,
    config: MarketConfig,
    issues: Arc<IssueFlow>,
    settlements: Arc<SettlementFlow>,
    sweep: Arc<CompensationSweep>,
}

impl Market {
    pub fn new(
        repo: Arc<dyn MarketRepo>,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn SharedStore>,
        clock: Arc<dyn Clock>,
        config: MarketConfig,
    ) -> Self {
        let queue = Arc::new(IssueQueue::new(Arc::clone(&store)));
        let locks = Arc::new(LockManager::new(
            store,
            Arc::clone(&clock),
            config.lock_ttl,
            config.lock_poll,
        ));
        let issues = Arc::new(IssueFlow::new(
            Arc::clone(&repo),
            Arc::clone(&chain),
            queue,
            Arc::clone(&clock),
        ));
        let settlements = Arc::new(SettlementFlow::new(
            Arc::clone(&repo),
            Arc::clone(&chain),
            locks,
            config.clone(),
        ));
        let sweep = Arc::new(CompensationSweep::new(
            Arc::clone(&repo),
            chain,
            config.clone(),
        ));
        Self {
            repo,
            clock,
            config,
            issues,
            settlements,
            sweep,
        }
    }

    pub fn repo(&self) -> &Arc<dyn MarketRepo> {
        &self.repo
    }

    pub fn issues(&self) -> &Arc<IssueFlow> {
        &self.issues
    }

    pub fn sweep(&self) -> &Arc<CompensationSweep> {
        &self.sweep
    }

    /// Spawn the periodic driver for this market.
    pub fn driver(&self) -> Driver {
        Driver::spawn(
            Arc::clone(&self.issues),
            Arc::clone(&self.sweep),
            &self.config,
        )
    }

    pub async fn register_user(&self, user: User) -> Result<(), MarketError> {
        self.repo.insert_user(user).await
    }

    /// Record a new issue and enter it into the sale scheduler.
    pub async fn publish_issue(&self, issue: Issue) -> Result<(), MarketError> {
        self.repo.insert_issue(issue.clone()).await?;
        self.on_issue_created(&issue).await
    }

    /// "Issue created" event hook.
    pub async fn on_issue_created(&self, issue: &Issue) -> Result<(), MarketError> {
        self.issues.on_created(issue).await
    }

    /// "Transaction saved" event hook.
    pub async fn on_transaction_saved(&self, id: TxnId) -> Result<(), MarketError> {
        self.settlements.handle(id).await
    }

    /// Record a purchase against a listing and push it into settlement.
    ///
    /// First-class purchases start `pending` and go through the chain;
    /// resales settle purely in the ledger, so they are recorded already
    /// successful. Guards mirror the listing: enough units on the trade,
    /// the sale window open and the buyer within `buy_limit` for a first
    /// release.
    pub async fn submit_purchase(
        &self,
        trade_id: TradeId,
        buyer: UserId,
        quantity: u32,
    ) -> Result<TxnId, MarketError> {
        let trade = self.repo.trade(trade_id).await?;
        let issue = self.repo.issue(trade.issue).await?;
        self.check_purchase(&trade, &issue, buyer, quantity).await?;

        let mut txn = Transaction::for_trade(&trade, buyer, quantity, self.clock.now());
        if txn.source == Source::SecondClass {
            txn.status = TxnStatus::Success;
        }
        let id = txn.id;
        self.repo.insert_transaction(txn).await?;
        self.on_transaction_saved(id).await?;
        Ok(id)
    }

    async fn check_purchase(
        &self,
        trade: &Trade,
        issue: &Issue,
        buyer: UserId,
        quantity: u32,
    ) -> Result<(), MarketError> {
        if quantity == 0 || trade.quantity < quantity {
            return Err(MarketError::Invariant(format!(
                "trade {} has {} units, cannot buy {quantity}",
                trade.id, trade.quantity
            )));
        }
        if trade.first_release {
            if issue.status != IssueStatus::OnSale {
                return Err(MarketError::Invariant(format!(
                    "issue {} is not on sale",
                    issue.id
                )));
            }
            let held = self
                .repo
                .asset(buyer, issue.id)
                .await?
                .map(|a| a.quantity)
                .unwrap_or(0);
            if !issue.within_buy_limit(held, quantity) {
                return Err(MarketError::Invariant(format!(
                    "buyer {buyer} holding {held} + {quantity} exceeds buy limit {}",
                    issue.buy_limit
                )));
            }
        }
        Ok(())
    }

    pub async fn counts(&self) -> Result<MarketCounts, MarketError> {
        self.repo.counts().await
    }
}
