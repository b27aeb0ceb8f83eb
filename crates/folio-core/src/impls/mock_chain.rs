//! Mock chain settlement client.
//!
//! Records every call with the amounts already converted to on-chain units,
//! and lets tests script failures: RPC errors, chain rejections, slow
//! confirmations. Hashes are fresh ULIDs, unique per call like real tx
//! hashes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::domain::Address;
use crate::error::MarketError;
use crate::ports::chain::{ChainClient, Receipt, ReceiptStatus, units};

/// One recorded call, amounts in chain units.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainCall {
    FirstTrade {
        seller: Address,
        payment: u64,
        buyer: Address,
        token_id: u64,
        quantity: u32,
        mint_amount: u32,
    },
    Burn {
        owner: Address,
        token_id: u64,
        quantity: u32,
    },
    Refund {
        to: Address,
        amount: u64,
    },
    SetTokenInfo {
        token_id: u64,
        author: Address,
        royalty_pct_pct: u32,
        price: u64,
    },
}

/// Scriptable `ChainClient` for tests and the demo CLI.
pub struct MockChain {
    calls: Arc<Mutex<Vec<ChainCall>>>,
    /// Trades to reject with a Failure receipt before succeeding.
    rejected_trades: AtomicU32,
    /// Trades to abort with an RPC error before succeeding.
    erroring_trades: AtomicU32,
    refunds_fail: AtomicBool,
    burns_fail: AtomicBool,
    /// Simulated confirmation wait per trade call.
    latency: Mutex<Duration>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            rejected_trades: AtomicU32::new(0),
            erroring_trades: AtomicU32::new(0),
            refunds_fail: AtomicBool::new(false),
            burns_fail: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// The next `n` trade calls come back with a Failure receipt.
    pub fn reject_next_trades(&self, n: u32) {
        self.rejected_trades.store(n, Ordering::SeqCst);
    }

    /// The next `n` trade calls fail at the RPC layer.
    pub fn error_next_trades(&self, n: u32) {
        self.erroring_trades.store(n, Ordering::SeqCst);
    }

    pub fn set_refunds_fail(&self, fail: bool) {
        self.refunds_fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_burns_fail(&self, fail: bool) {
        self.burns_fail.store(fail, Ordering::SeqCst);
    }

    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.lock().await = latency;
    }

    pub async fn calls(&self) -> Vec<ChainCall> {
        self.calls.lock().await.clone()
    }

    /// Trade calls that actually minted supply.
    pub async fn mint_calls(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| matches!(c, ChainCall::FirstTrade { mint_amount, .. } if *mint_amount > 0))
            .count()
    }

    fn fresh_hash() -> String {
        format!("0x{}", Ulid::new().to_string().to_lowercase())
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn first_trade(
        &self,
        seller: &Address,
        payment: f64,
        buyer: &Address,
        token_id: u64,
        quantity: u32,
        mint_amount: u32,
    ) -> Result<Receipt, MarketError> {
        let latency = *self.latency.lock().await;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if Self::take(&self.erroring_trades) {
            return Err(MarketError::Chain {
                op: "first_trade",
                reason: "rpc timeout".to_owned(),
            });
        }

        self.calls.lock().await.push(ChainCall::FirstTrade {
            seller: seller.clone(),
            payment: units::to_chain_amount(payment),
            buyer: buyer.clone(),
            token_id,
            quantity,
            mint_amount,
        });

        let status = if Self::take(&self.rejected_trades) {
            ReceiptStatus::Failure
        } else {
            ReceiptStatus::Success
        };
        Ok(Receipt {
            hash: Self::fresh_hash(),
            status,
        })
    }

    async fn burn(
        &self,
        owner: &Address,
        token_id: u64,
        quantity: u32,
    ) -> Result<(String, bool), MarketError> {
        if self.burns_fail.load(Ordering::SeqCst) {
            return Err(MarketError::Chain {
                op: "burn",
                reason: "rpc timeout".to_owned(),
            });
        }
        self.calls.lock().await.push(ChainCall::Burn {
            owner: owner.clone(),
            token_id,
            quantity,
        });
        Ok((Self::fresh_hash(), true))
    }

    async fn refund(&self, to: &Address, amount: f64) -> Result<bool, MarketError> {
        if self.refunds_fail.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.calls.lock().await.push(ChainCall::Refund {
            to: to.clone(),
            amount: units::to_chain_amount(amount),
        });
        Ok(true)
    }

    async fn set_token_info(
        &self,
        token_id: u64,
        author: &Address,
        royalty: f64,
        price: f64,
    ) -> Result<bool, MarketError> {
        self.calls.lock().await.push(ChainCall::SetTokenInfo {
            token_id,
            author: author.clone(),
            royalty_pct_pct: units::to_percent_percent(royalty),
            price: units::to_chain_amount(price),
        });
        Ok(true)
    }
}
