//! Market configuration.

use serde::Deserialize;
use std::time::Duration;

/// Tunables for the sale scheduler and settlement engine.
///
/// Defaults are the production values; tests shrink the intervals.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Platform cut on every settlement, as a fraction (0.1 = 10%).
    pub platform_fee: f64,

    /// Currency of benefit ledger lines.
    pub currency: String,

    /// Self-expiry of the first-trade lock. Must exceed the chain's
    /// worst-case confirmation time: there is no mid-call renewal.
    #[serde(with = "secs")]
    pub lock_ttl: Duration,

    /// How long a blocked `acquire` sleeps between attempts.
    #[serde(with = "secs")]
    pub lock_poll: Duration,

    /// Issue timer poll interval.
    #[serde(with = "secs")]
    pub poll_interval: Duration,

    /// Compensation sweep interval.
    #[serde(with = "secs")]
    pub sweep_interval: Duration,

    /// Max refunds per sweep; bounds load on the chain RPC.
    pub refund_batch: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            platform_fee: 0.1,
            currency: "USDC".to_owned(),
            lock_ttl: Duration::from_secs(120),
            lock_poll: Duration::from_millis(500),
            poll_interval: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
            refund_batch: 5,
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        f64::deserialize(d).map(Duration::from_secs_f64)
    }
}
