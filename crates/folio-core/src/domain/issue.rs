//! Issue: one limited-run sale event for a book's digital asset.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{IssueId, UserId};
use super::trade::Trade;

/// Sale lifecycle of an issue.
///
/// State transitions:
/// - PreSale -> OnSale (sale opens at `published_at`)
/// - OnSale -> OffSale (sale window ends with at least one unit sold)
/// - OnSale -> Unsold (sale window ends with nothing sold)
///
/// OffSale and Unsold are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    PreSale,
    OnSale,
    OffSale,
    Unsold,
}

impl IssueStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, IssueStatus::OffSale | IssueStatus::Unsold)
    }
}

/// A limited-run issue of a book.
///
/// The issue state machine is the only writer of `status` and `destroy_log`;
/// the settlement state machine is the only writer of `n_circulations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,

    /// Publishing author: seller of the first release, owner of unsold
    /// inventory on-chain.
    pub author: UserId,

    /// Token this issue mints on the chain.
    pub token_id: u64,

    /// Total units minted at first sale.
    pub quantity: u32,

    /// First-release unit price.
    pub price: f64,

    /// Author share on resale, 0-100 (%).
    pub royalty: f64,

    /// Max units one buyer may hold from the first release.
    pub buy_limit: u32,

    /// Scheduled sale-open time.
    pub published_at: DateTime<Utc>,

    /// Minutes the sale stays open.
    pub duration: i64,

    /// Units sold so far. Never exceeds `quantity`.
    pub n_circulations: u32,

    pub status: IssueStatus,

    /// Chain tx hash of the burn of unsold inventory; empty until set.
    pub destroy_log: String,
}

impl Issue {
    /// When the sale window closes.
    pub fn closes_at(&self) -> DateTime<Utc> {
        self.published_at + Duration::minutes(self.duration)
    }

    pub fn unsold_quantity(&self) -> u32 {
        self.quantity - self.n_circulations
    }

    /// First-release purchase cap: would a buyer already holding `held`
    /// units stay within `buy_limit` after buying `requested` more?
    pub fn within_buy_limit(&self, held: u32, requested: u32) -> bool {
        held + requested <= self.buy_limit
    }
}

/// One scheduler step over an issue, described ahead of execution.
///
/// Design intent:
/// - The flow computes the transition; the store applies it as one atomic
///   unit (status flip, trade upsert/delete, nothing half-done).
/// - The store rejects transitions that do not match the current status, so
///   a crash-retry of an already-applied step is a visible no-op.
#[derive(Debug, Clone)]
pub enum IssueTransition {
    /// PreSale -> OnSale: open the sale and list the first release.
    Open { trade: Trade },

    /// OnSale -> OffSale: close a sale that moved at least one unit.
    /// `destroy_log` is the burn hash, or empty if the burn failed.
    Close { destroy_log: String },

    /// OnSale -> Unsold: close a sale that moved nothing; the first-release
    /// trade is deleted.
    Expire,
}
