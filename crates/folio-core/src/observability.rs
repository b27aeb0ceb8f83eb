//! Status views read by the CRUD layer and the CLI.

use serde::{Deserialize, Serialize};

/// Counts by state across issues and transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCounts {
    pub pre_sale: usize,
    pub on_sale: usize,
    pub off_sale: usize,
    pub unsold: usize,

    pub pending: usize,
    pub success: usize,
    pub failure: usize,
}
