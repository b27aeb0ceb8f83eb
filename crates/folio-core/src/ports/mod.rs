//! Ports — the trait seams to everything outside the core.
//!
//! Each trait hides one external system: the wall clock, the shared
//! key-value store (lock records + delay queue), the chain RPC, and the
//! relational store. Production adapters live with their systems; the
//! in-memory implementations under `impls` back tests and the demo CLI.

pub mod chain;
pub mod clock;
pub mod repo;
pub mod shared_store;

pub use self::chain::{ChainClient, Receipt, ReceiptStatus};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::repo::MarketRepo;
pub use self::shared_store::SharedStore;
