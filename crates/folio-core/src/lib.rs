//! folio-core
//!
//! Core of the limited-run digital book marketplace: the issue sale
//! scheduler and the transaction settlement engine.
//!
//! Module map:
//! - **domain**: entities and the state machines' vocabulary (Issue, Trade,
//!   Transaction, Asset, Benefit, settlement plans)
//! - **ports**: trait seams to the outside (clock, shared key-value store,
//!   chain settlement client, relational store)
//! - **queue**: the delay queue driving scheduled issue transitions
//! - **lock**: the distributed lock serializing first-sale mints
//! - **app**: the state machines, the periodic driver and the market facade
//! - **impls**: in-memory adapters for tests and the demo CLI
//! - **config / error / observability**: the ambient pieces

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod lock;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{CompensationSweep, Driver, IssueFlow, Market, SettlementFlow};
pub use config::MarketConfig;
pub use error::MarketError;
pub use lock::{LockGuard, LockManager};
pub use observability::MarketCounts;
pub use queue::IssueQueue;
