//! Trades (standing listings) and transactions (buy attempts).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{IssueId, TradeId, TxnId, UserId};

/// A seller's standing offer.
///
/// Exactly one `first_release` trade exists per issue while its first-sale
/// inventory remains; it is deleted when `quantity` reaches zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    /// Seller.
    pub user: UserId,
    pub issue: IssueId,
    /// Units remaining on the listing.
    pub quantity: u32,
    pub price: f64,
    pub first_release: bool,
}

impl Trade {
    /// The first-release listing created when an issue goes on sale.
    pub fn first_release(author: UserId, issue: IssueId, quantity: u32, price: f64) -> Self {
        Self {
            id: TradeId::generate(),
            user: author,
            issue,
            quantity,
            price,
            first_release: true,
        }
    }
}

/// Settlement state of a buy attempt.
///
/// Pending -> {Success, Failure}; both outcomes are terminal. Second-class
/// (resale) transactions never pass through Pending: resales settle purely
/// in the ledger, so the buy flow records them already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnStatus {
    Pending,
    Success,
    Failure,
}

impl TxnStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxnStatus::Success | TxnStatus::Failure)
    }
}

/// Which market a transaction originated from.
///
/// Mirrors the originating trade's `first_release` flag. Only first-class
/// transactions take the distributed lock and call the chain; second-class
/// transactions settle purely in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    FirstClass,
    SecondClass,
}

/// One buy attempt against a trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxnId,
    pub trade: TradeId,
    pub issue: IssueId,
    pub quantity: u32,
    pub price: f64,
    pub seller: UserId,
    pub buyer: UserId,
    pub status: TxnStatus,
    /// Chain tx id; empty until settled.
    pub hash: String,
    pub source: Source,
    /// Creation time — the compensation sweep orders by this, oldest first.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Build a transaction from its originating trade.
    ///
    /// Seller and source are derived from the trade, never supplied by the
    /// caller: a first-release trade yields a first-class transaction.
    pub fn for_trade(trade: &Trade, buyer: UserId, quantity: u32, now: DateTime<Utc>) -> Self {
        let source = if trade.first_release {
            Source::FirstClass
        } else {
            Source::SecondClass
        };
        Self {
            id: TxnId::generate(),
            trade: trade.id,
            issue: trade.issue,
            quantity,
            price: trade.price,
            seller: trade.user,
            buyer,
            status: TxnStatus::Pending,
            hash: String::new(),
            source,
            created_at: now,
        }
    }
}
