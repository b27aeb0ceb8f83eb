//! In-memory and mock adapters for the ports.
//!
//! These back tests and the demo CLI. Production deployments supply a Redis
//! adapter for `SharedStore`, a relational adapter for `MarketRepo`, and a
//! real RPC client for `ChainClient` behind the same traits.

mod memory_repo;
mod memory_store;
mod mock_chain;

pub use memory_repo::InMemoryMarketRepo;
pub use memory_store::InMemorySharedStore;
pub use mock_chain::{ChainCall, MockChain};
