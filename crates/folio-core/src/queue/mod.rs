//! Delay queue: scheduled issue transitions in the shared store.

mod delay;

pub use delay::IssueQueue;
