//! Domain model (IDs, entities, state machines' vocabulary).

pub mod ids;
pub mod issue;
pub mod ledger;
pub mod settlement;
pub mod trade;

pub use ids::{IssueId, TradeId, TxnId, UserId};
pub use issue::{Issue, IssueStatus, IssueTransition};
pub use ledger::{Address, Asset, Benefit, User};
pub use settlement::SettlementPlan;
pub use trade::{Source, Trade, Transaction, TxnStatus};
