//! Market repository port — the relational store seam.
//!
//! The store is the source of truth for Issue/Trade/Transaction/Asset/
//! Benefit. Each state-machine step is exposed as a single call
//! (`apply_issue_transition`, `apply_settlement`) that the implementation
//! executes as one all-or-nothing unit; a step either lands whole or not at
//! all, so a crash mid-transition leaves nothing half-done for the next
//! poll to trip over.

use async_trait::async_trait;

use crate::domain::{
    Asset, Benefit, Issue, IssueId, IssueTransition, SettlementPlan, Trade, TradeId, Transaction,
    TxnId, TxnStatus, User, UserId,
};
use crate::error::MarketError;
use crate::observability::MarketCounts;

#[async_trait]
pub trait MarketRepo: Send + Sync {
    async fn issue(&self, id: IssueId) -> Result<Issue, MarketError>;

    /// Every issue, terminal or not. The reconciliation pass walks this to
    /// rebuild the delay queue after a crash.
    async fn issues(&self) -> Result<Vec<Issue>, MarketError>;

    async fn user(&self, id: UserId) -> Result<User, MarketError>;

    async fn trade(&self, id: TradeId) -> Result<Trade, MarketError>;

    /// The issue's first-release listing, while one exists.
    async fn first_release_trade(&self, issue: IssueId) -> Result<Option<Trade>, MarketError>;

    async fn transaction(&self, id: TxnId) -> Result<Transaction, MarketError>;

    async fn asset(&self, user: UserId, issue: IssueId) -> Result<Option<Asset>, MarketError>;

    async fn benefits_for(&self, txn: TxnId) -> Result<Vec<Benefit>, MarketError>;

    async fn insert_user(&self, user: User) -> Result<(), MarketError>;

    async fn insert_issue(&self, issue: Issue) -> Result<(), MarketError>;

    async fn insert_trade(&self, trade: Trade) -> Result<(), MarketError>;

    async fn insert_transaction(&self, txn: Transaction) -> Result<(), MarketError>;

    /// Persist the settlement outcome of a pending transaction.
    async fn set_transaction_outcome(
        &self,
        id: TxnId,
        status: TxnStatus,
        hash: &str,
    ) -> Result<(), MarketError>;

    /// Apply one scheduler step as a single atomic unit. Rejects the step
    /// (`InvalidTransition`) when the issue's current status does not
    /// accept it — which makes a crash-retry of an applied step a no-op at
    /// this boundary.
    async fn apply_issue_transition(
        &self,
        id: IssueId,
        transition: IssueTransition,
    ) -> Result<(), MarketError>;

    /// Apply the full bookkeeping of a successful settlement as a single
    /// atomic unit. An invariant violation (asset below zero, circulation
    /// above quantity) rejects the whole unit.
    async fn apply_settlement(&self, txn: TxnId, plan: &SettlementPlan)
    -> Result<(), MarketError>;

    /// Oldest `limit` failed first-class transactions, by creation time.
    async fn failed_first_class(&self, limit: usize) -> Result<Vec<Transaction>, MarketError>;

    /// Drop a transaction whose failure has been compensated.
    async fn delete_transaction(&self, id: TxnId) -> Result<(), MarketError>;

    async fn counts(&self) -> Result<MarketCounts, MarketError>;
}
