//! Application layer: the state machines and their drivers.

mod driver;
mod issue_flow;
mod market;
mod settlement;
mod sweep;

pub use driver::Driver;
pub use issue_flow::IssueFlow;
pub use market::Market;
pub use settlement::SettlementFlow;
pub use sweep::CompensationSweep;
