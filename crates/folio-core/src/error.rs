use thiserror::Error;

use crate::domain::{IssueId, IssueStatus, TxnId};

/// Errors across the market core.
///
/// Split roughly along the operational taxonomy: `Store` and `LockTimeout`
/// are transient infrastructure failures the periodic drivers retry;
/// `Chain` is a settlement outcome, recovered by the compensation sweep;
/// the rest are domain violations, fatal for the single operation only.
#[derive(Debug, Error)]
pub enum MarketError {
    /// Shared key-value store unreachable or misbehaving.
    #[error("shared store: {0}")]
    Store(String),

    /// Could not acquire the lock within its wait budget.
    #[error("lock wait exhausted for key={0}")]
    LockTimeout(String),

    /// The chain client failed to submit or confirm a call.
    #[error("chain call {op} failed: {reason}")]
    Chain { op: &'static str, reason: String },

    #[error("issue {0} not found")]
    IssueNotFound(IssueId),

    #[error("transaction {0} not found")]
    TxnNotFound(TxnId),

    #[error("entity not found: {0}")]
    NotFound(String),

    /// A state-machine step that does not apply to the entity's current
    /// state; the atomic unit is rejected whole.
    #[error("invalid transition for issue {issue}: {from:?} does not accept {attempted}")]
    InvalidTransition {
        issue: IssueId,
        from: IssueStatus,
        attempted: &'static str,
    },

    /// A bookkeeping invariant would be broken (e.g. an asset decremented
    /// below zero). Nothing from the same unit is applied.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl MarketError {
    /// Transient errors are retried by the periodic drivers; everything
    /// else is surfaced as a permanent outcome for that operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, MarketError::Store(_) | MarketError::LockTimeout(_))
    }
}
