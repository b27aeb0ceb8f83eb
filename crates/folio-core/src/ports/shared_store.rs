//! Shared key-value store port.
//!
//! The lock records and the delay queue live in one store shared by every
//! worker process. The operations mirror the store primitives the design
//! relies on (write-if-absent, atomic swap, score-ordered sets); a Redis
//! adapter maps them 1:1 (`SETNX`, `GETSET`, `ZADD`, `ZPOPMIN`,
//! `ZRANGEBYSCORE`). Every mutation is atomic on the store side — callers
//! never do read/modify/write.

use async_trait::async_trait;

use crate::error::MarketError;

#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, MarketError>;

    /// Set `key` only if absent. Returns whether the write happened.
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, MarketError>;

    /// Atomically replace the value and return the previous one.
    async fn getset(&self, key: &str, value: &str) -> Result<Option<String>, MarketError>;

    async fn delete(&self, key: &str) -> Result<(), MarketError>;

    /// Upsert `member` into the sorted set with `score`.
    async fn zadd(&self, set: &str, member: &str, score: f64) -> Result<(), MarketError>;

    /// Pop the lowest-scored member.
    async fn zpopmin(&self, set: &str) -> Result<Option<(String, f64)>, MarketError>;

    /// Remove a specific member.
    async fn zrem(&self, set: &str, member: &str) -> Result<(), MarketError>;

    /// All members with score <= `max`, ascending by score.
    async fn zrangebyscore(&self, set: &str, max: f64) -> Result<Vec<String>, MarketError>;
}
