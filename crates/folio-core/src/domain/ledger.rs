//! Users, holdings and the per-user earnings ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{IssueId, TxnId, UserId};

/// A chain account address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A platform user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub address: Address,
    /// Ledger-write capability for resale listings; granted on the user's
    /// first successful purchase.
    pub seller: bool,
}

impl User {
    pub fn new(address: Address) -> Self {
        Self {
            id: UserId::generate(),
            address,
            seller: false,
        }
    }
}

/// A user's holding of an issue.
///
/// Upserted (create-or-increment) on successful settlement; deleted when
/// `quantity` reaches zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub user: UserId,
    pub issue: IssueId,
    pub quantity: u32,
}

/// One royalty/earnings ledger line.
///
/// Keyed by `(user, transaction)` and upserted on that natural key, so
/// re-processing a transaction never double-pays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Benefit {
    pub user: UserId,
    pub transaction: TxnId,
    pub amount: f64,
    pub currency: String,
}
