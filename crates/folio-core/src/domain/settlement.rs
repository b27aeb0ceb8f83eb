//! Settlement bookkeeping, computed ahead of execution.
//!
//! A successful transaction mutates five tables at once: issue circulation,
//! the originating trade, both parties' assets, and the benefit ledger. The
//! plan is a pure function of the transaction and its issue — no I/O — and
//! the store applies it as one atomic unit. This keeps the split logic
//! testable without a store and keeps the store free of market rules.

use serde::{Deserialize, Serialize};

use super::ids::{IssueId, TradeId, UserId};
use super::issue::Issue;
use super::ledger::Benefit;
use super::trade::{Source, Transaction};

/// The full bookkeeping delta of one successful settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub issue: IssueId,
    pub trade: TradeId,

    /// Added to `Issue.n_circulations` (first-class only; zero on resale).
    pub circulation_delta: u32,

    /// Subtracted from the trade's remaining quantity; the trade is deleted
    /// if it reaches zero.
    pub trade_decrement: u32,

    /// Resale only: the seller hands over units from their own holding.
    pub seller_asset_decrement: Option<(UserId, u32)>,

    /// Create-or-increment of the buyer's holding.
    pub buyer_asset_increment: (UserId, u32),

    /// Benefit lines, upserted on `(user, transaction)`.
    pub benefits: Vec<Benefit>,

    /// Buyer gains the seller capability for future resale.
    pub grant_seller: UserId,
}

impl SettlementPlan {
    /// Compute the plan for a successful transaction.
    ///
    /// `platform_fee` is the platform's cut as a fraction (0.1 = 10%).
    /// First class: the seller keeps `(1 - fee)` of the gross. Second class:
    /// the author takes `royalty%`, the seller the remainder after fee.
    /// Either way the paid-out total is `quantity * price * (1 - fee)`.
    pub fn for_success(
        txn: &Transaction,
        issue: &Issue,
        platform_fee: f64,
        currency: &str,
    ) -> Self {
        let gross = txn.quantity as f64 * txn.price;

        let (circulation_delta, seller_asset_decrement, benefits) = match txn.source {
            Source::FirstClass => {
                let seller_amount = gross * (1.0 - platform_fee);
                (
                    txn.quantity,
                    None,
                    vec![Benefit {
                        user: txn.seller,
                        transaction: txn.id,
                        amount: seller_amount,
                        currency: currency.to_owned(),
                    }],
                )
            }
            Source::SecondClass => {
                let author_rate = issue.royalty / 100.0;
                let seller_rate = 1.0 - author_rate - platform_fee;
                (
                    0,
                    Some((txn.seller, txn.quantity)),
                    vec![
                        Benefit {
                            user: issue.author,
                            transaction: txn.id,
                            amount: gross * author_rate,
                            currency: currency.to_owned(),
                        },
                        Benefit {
                            user: txn.seller,
                            transaction: txn.id,
                            amount: gross * seller_rate,
                            currency: currency.to_owned(),
                        },
                    ],
                )
            }
        };

        Self {
            issue: txn.issue,
            trade: txn.trade,
            circulation_delta,
            trade_decrement: txn.quantity,
            seller_asset_decrement,
            buyer_asset_increment: (txn.buyer, txn.quantity),
            benefits,
            grant_seller: txn.buyer,
        }
    }
}
