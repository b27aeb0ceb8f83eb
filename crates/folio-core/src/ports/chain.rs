//! Chain settlement client port.
//!
//! The narrow boundary over blockchain interaction: mint/trade, burn,
//! refund, token metadata. Implementations own the RPC plumbing and the
//! receipt wait; the core only sees hashes and outcomes. All chain calls
//! are blocking network I/O and run on the scheduler/settlement workers,
//! never on a request-serving thread.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Address;
use crate::error::MarketError;

/// Outcome of a submitted chain transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Success,
    Failure,
}

/// Hash + outcome of a mined transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub hash: String,
    pub status: ReceiptStatus,
}

impl Receipt {
    pub fn ok(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

/// The settlement contract surface the market consumes.
///
/// An `Err` means the call could not be submitted or confirmed (RPC error,
/// exception); a `Receipt` with `Failure` means the chain rejected it.
/// Refunds are expected to be idempotent per source transaction on the
/// implementation side.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Execute a trade, minting `mint_amount` units first when this is the
    /// issue's very first sale (`mint_amount` = 0 for every later call).
    async fn first_trade(
        &self,
        seller: &Address,
        payment: f64,
        buyer: &Address,
        token_id: u64,
        quantity: u32,
        mint_amount: u32,
    ) -> Result<Receipt, MarketError>;

    /// Burn unsold units held by `owner`. Returns the tx hash and whether
    /// the burn took effect.
    async fn burn(
        &self,
        owner: &Address,
        token_id: u64,
        quantity: u32,
    ) -> Result<(String, bool), MarketError>;

    /// Pure ERC20 transfer back to a failed buyer.
    async fn refund(&self, to: &Address, amount: f64) -> Result<bool, MarketError>;

    /// Record author address, royalty and price against the token.
    async fn set_token_info(
        &self,
        token_id: u64,
        author: &Address,
        royalty: f64,
        price: f64,
    ) -> Result<bool, MarketError>;
}

/// Fixed-point conversions applied at the settlement boundary.
///
/// The chain has no native decimals: amounts travel as integers scaled by
/// `PRECISION`, royalty percentages as hundredths of a percent. Conversions
/// round toward zero in both directions.
pub mod units {
    /// Scale factor for token amounts (USDC-style 6 decimals).
    pub const PRECISION: u64 = 1_000_000;

    pub fn to_chain_amount(amount: f64) -> u64 {
        (amount * PRECISION as f64) as u64
    }

    pub fn from_chain_amount(raw: u64) -> f64 {
        raw as f64 / PRECISION as f64
    }

    /// % -> %% (hundredths of a percent).
    pub fn to_percent_percent(royalty: f64) -> u32 {
        (royalty * 100.0) as u32
    }

}
