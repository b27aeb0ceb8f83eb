//! In-memory market repository.
//!
//! All tables live under one lock; each port call holds it once, which is
//! exactly the all-or-nothing unit the state machines require. Mutating
//! calls validate the whole step before touching anything, so a rejected
//! step leaves no partial writes behind — the same contract a relational
//! adapter gets from a transaction rollback.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    Asset, Benefit, Issue, IssueId, IssueStatus, IssueTransition, SettlementPlan, Source, Trade,
    TradeId, Transaction, TxnId, TxnStatus, User, UserId,
};
use crate::error::MarketError;
use crate::observability::MarketCounts;
use crate::ports::MarketRepo;

#[derive(Default)]
struct MarketState {
    users: HashMap<UserId, User>,
    issues: HashMap<IssueId, Issue>,
    trades: HashMap<TradeId, Trade>,
    transactions: HashMap<TxnId, Transaction>,
    assets: HashMap<(UserId, IssueId), Asset>,
    /// Natural key (user, transaction) — the upsert target that makes
    /// benefit writes idempotent.
    benefits: HashMap<(UserId, TxnId), Benefit>,
}

impl MarketState {
    fn first_release_trade_id(&self, issue: IssueId) -> Option<TradeId> {
        self.trades
            .values()
            .find(|t| t.issue == issue && t.first_release)
            .map(|t| t.id)
    }
}

/// In-memory `MarketRepo`.
pub struct InMemoryMarketRepo {
    state: Arc<Mutex<MarketState>>,
}

impl InMemoryMarketRepo {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MarketState::default())),
        }
    }
}

impl Default for InMemoryMarketRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketRepo for InMemoryMarketRepo {
    async fn issue(&self, id: IssueId) -> Result<Issue, MarketError> {
        let state = self.state.lock().await;
        state
            .issues
            .get(&id)
            .cloned()
            .ok_or(MarketError::IssueNotFound(id))
    }

    async fn issues(&self) -> Result<Vec<Issue>, MarketError> {
        let state = self.state.lock().await;
        Ok(state.issues.values().cloned().collect())
    }

    async fn user(&self, id: UserId) -> Result<User, MarketError> {
        let state = self.state.lock().await;
        state
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| MarketError::NotFound(id.to_string()))
    }

    async fn trade(&self, id: TradeId) -> Result<Trade, MarketError> {
        let state = self.state.lock().await;
        state
            .trades
            .get(&id)
            .cloned()
            .ok_or_else(|| MarketError::NotFound(id.to_string()))
    }

    async fn first_release_trade(&self, issue: IssueId) -> Result<Option<Trade>, MarketError> {
        let state = self.state.lock().await;
        Ok(state
            .trades
            .values()
            .find(|t| t.issue == issue && t.first_release)
            .cloned())
    }

    async fn transaction(&self, id: TxnId) -> Result<Transaction, MarketError> {
        let state = self.state.lock().await;
        state
            .transactions
            .get(&id)
            .cloned()
            .ok_or(MarketError::TxnNotFound(id))
    }

    async fn asset(&self, user: UserId, issue: IssueId) -> Result<Option<Asset>, MarketError> {
        let state = self.state.lock().await;
        Ok(state.assets.get(&(user, issue)).cloned())
    }

    async fn benefits_for(&self, txn: TxnId) -> Result<Vec<Benefit>, MarketError> {
        let state = self.state.lock().await;
        Ok(state
            .benefits
            .values()
            .filter(|b| b.transaction == txn)
            .cloned()
            .collect())
    }

    async fn insert_user(&self, user: User) -> Result<(), MarketError> {
        let mut state = self.state.lock().await;
        state.users.insert(user.id, user);
        Ok(())
    }

    async fn insert_issue(&self, issue: Issue) -> Result<(), MarketError> {
        let mut state = self.state.lock().await;
        state.issues.insert(issue.id, issue);
        Ok(())
    }

    async fn insert_trade(&self, trade: Trade) -> Result<(), MarketError> {
        let mut state = self.state.lock().await;
        state.trades.insert(trade.id, trade);
        Ok(())
    }

    async fn insert_transaction(&self, txn: Transaction) -> Result<(), MarketError> {
        let mut state = self.state.lock().await;
        state.transactions.insert(txn.id, txn);
        Ok(())
    }

    async fn set_transaction_outcome(
        &self,
        id: TxnId,
        status: TxnStatus,
        hash: &str,
    ) -> Result<(), MarketError> {
        let mut state = self.state.lock().await;
        let txn = state
            .transactions
            .get_mut(&id)
            .ok_or(MarketError::TxnNotFound(id))?;
        txn.status = status;
        txn.hash = hash.to_owned();
        Ok(())
    }

    async fn apply_issue_transition(
        &self,
        id: IssueId,
        transition: IssueTransition,
    ) -> Result<(), MarketError> {
        let mut state = self.state.lock().await;
        let current = state
            .issues
            .get(&id)
            .ok_or(MarketError::IssueNotFound(id))?
            .status;

        match (current, transition) {
            (IssueStatus::PreSale, IssueTransition::Open { trade }) => {
                // Upsert: replace any stale first-release listing.
                if let Some(stale) = state.first_release_trade_id(id) {
                    state.trades.remove(&stale);
                }
                state.trades.insert(trade.id, trade);
                state.issues.get_mut(&id).unwrap().status = IssueStatus::OnSale;
                Ok(())
            }
            (IssueStatus::OnSale, IssueTransition::Close { destroy_log }) => {
                let issue = state.issues.get_mut(&id).unwrap();
                issue.status = IssueStatus::OffSale;
                issue.destroy_log = destroy_log;
                Ok(())
            }
            (IssueStatus::OnSale, IssueTransition::Expire) => {
                if let Some(trade) = state.first_release_trade_id(id) {
                    state.trades.remove(&trade);
                }
                state.issues.get_mut(&id).unwrap().status = IssueStatus::Unsold;
                Ok(())
            }
            (from, transition) => Err(MarketError::InvalidTransition {
                issue: id,
                from,
                attempted: match transition {
                    IssueTransition::Open { .. } => "open",
                    IssueTransition::Close { .. } => "close",
                    IssueTransition::Expire => "expire",
                },
            }),
        }
    }

    async fn apply_settlement(
        &self,
        txn: TxnId,
        plan: &SettlementPlan,
    ) -> Result<(), MarketError> {
        let mut state = self.state.lock().await;

        // Validate the whole unit before mutating anything.
        let issue = state
            .issues
            .get(&plan.issue)
            .ok_or(MarketError::IssueNotFound(plan.issue))?;
        if issue.n_circulations + plan.circulation_delta > issue.quantity {
            return Err(MarketError::Invariant(format!(
                "issue {} circulation {} + {} would exceed quantity {}",
                plan.issue, issue.n_circulations, plan.circulation_delta, issue.quantity
            )));
        }
        let trade = state
            .trades
            .get(&plan.trade)
            .ok_or_else(|| MarketError::NotFound(plan.trade.to_string()))?;
        if trade.quantity < plan.trade_decrement {
            return Err(MarketError::Invariant(format!(
                "trade {} has {} units, cannot sell {}",
                plan.trade, trade.quantity, plan.trade_decrement
            )));
        }
        if let Some((seller, dec)) = plan.seller_asset_decrement {
            let held = state
                .assets
                .get(&(seller, plan.issue))
                .map(|a| a.quantity)
                .unwrap_or(0);
            if held < dec {
                return Err(MarketError::Invariant(format!(
                    "seller {seller} holds {held} units of {}, cannot hand over {dec}",
                    plan.issue
                )));
            }
        }

        // Apply.
        state.issues.get_mut(&plan.issue).unwrap().n_circulations += plan.circulation_delta;

        let remaining = {
            let trade = state.trades.get_mut(&plan.trade).unwrap();
            trade.quantity -= plan.trade_decrement;
            trade.quantity
        };
        if remaining == 0 {
            state.trades.remove(&plan.trade);
        }

        if let Some((seller, dec)) = plan.seller_asset_decrement {
            let held = {
                let asset = state.assets.get_mut(&(seller, plan.issue)).unwrap();
                asset.quantity -= dec;
                asset.quantity
            };
            if held == 0 {
                state.assets.remove(&(seller, plan.issue));
            }
        }

        let (buyer, inc) = plan.buyer_asset_increment;
        state
            .assets
            .entry((buyer, plan.issue))
            .or_insert(Asset {
                user: buyer,
                issue: plan.issue,
                quantity: 0,
            })
            .quantity += inc;

        for benefit in &plan.benefits {
            state
                .benefits
                .insert((benefit.user, txn), benefit.clone());
        }

        if let Some(user) = state.users.get_mut(&plan.grant_seller) {
            user.seller = true;
        }

        Ok(())
    }

    async fn failed_first_class(&self, limit: usize) -> Result<Vec<Transaction>, MarketError> {
        let state = self.state.lock().await;
        let mut failed: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.status == TxnStatus::Failure && t.source == Source::FirstClass)
            .cloned()
            .collect();
        failed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        failed.truncate(limit);
        Ok(failed)
    }

    async fn delete_transaction(&self, id: TxnId) -> Result<(), MarketError> {
        let mut state = self.state.lock().await;
        state.transactions.remove(&id);
        Ok(())
    }

    async fn counts(&self) -> Result<MarketCounts, MarketError> {
        let state = self.state.lock().await;
        let mut counts = MarketCounts::default();
        for issue in state.issues.values() {
            match issue.status {
                IssueStatus::PreSale => counts.pre_sale += 1,
                IssueStatus::OnSale => counts.on_sale += 1,
                IssueStatus::OffSale => counts.off_sale += 1,
                IssueStatus::Unsold => counts.unsold += 1,
            }
        }
        for txn in state.transactions.values() {
            match txn.status {
                TxnStatus::Pending => counts.pending += 1,
                TxnStatus::Success => counts.success += 1,
                TxnStatus::Failure => counts.failure += 1,
            }
        }
        Ok(counts)
    }
}
