//! In-memory shared store implementation.
//!
//! Backs tests and the demo CLI; a deployment swaps in a Redis adapter
//! behind the same trait. All operations take the single state lock, which
//! gives them the same atomicity the real store provides.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::MarketError;
use crate::ports::SharedStore;

#[derive(Default)]
struct SharedState {
    kv: HashMap<String, String>,
    /// set name -> member -> score.
    sets: HashMap<String, HashMap<String, f64>>,
}

/// In-memory `SharedStore`.
pub struct InMemorySharedStore {
    state: Arc<Mutex<SharedState>>,
    /// When set, every call fails as if the store were unreachable.
    unreachable: AtomicBool,
}

impl InMemorySharedStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SharedState::default())),
            unreachable: AtomicBool::new(false),
        }
    }

    /// Simulate the store going down (or coming back).
    pub fn set_unreachable(&self, down: bool) {
        self.unreachable.store(down, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), MarketError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(MarketError::Store("connection refused".to_owned()));
        }
        Ok(())
    }
}

impl Default for InMemorySharedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for InMemorySharedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, MarketError> {
        self.check_reachable()?;
        let state = self.state.lock().await;
        Ok(state.kv.get(key).cloned())
    }

    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, MarketError> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        if state.kv.contains_key(key) {
            return Ok(false);
        }
        state.kv.insert(key.to_owned(), value.to_owned());
        Ok(true)
    }

    async fn getset(&self, key: &str, value: &str) -> Result<Option<String>, MarketError> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        Ok(state.kv.insert(key.to_owned(), value.to_owned()))
    }

    async fn delete(&self, key: &str) -> Result<(), MarketError> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        state.kv.remove(key);
        Ok(())
    }

    async fn zadd(&self, set: &str, member: &str, score: f64) -> Result<(), MarketError> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        state
            .sets
            .entry(set.to_owned())
            .or_default()
            .insert(member.to_owned(), score);
        Ok(())
    }

    async fn zpopmin(&self, set: &str) -> Result<Option<(String, f64)>, MarketError> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        let Some(members) = state.sets.get_mut(set) else {
            return Ok(None);
        };
        let min = members
            .iter()
            .min_by(|a, b| a.1.total_cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(m, s)| (m.clone(), *s));
        if let Some((member, _)) = &min {
            members.remove(member);
        }
        Ok(min)
    }

    async fn zrem(&self, set: &str, member: &str) -> Result<(), MarketError> {
        self.check_reachable()?;
        let mut state = self.state.lock().await;
        if let Some(members) = state.sets.get_mut(set) {
            members.remove(member);
        }
        Ok(())
    }

    async fn zrangebyscore(&self, set: &str, max: f64) -> Result<Vec<String>, MarketError> {
        self.check_reachable()?;
        let state = self.state.lock().await;
        let Some(members) = state.sets.get(set) else {
            return Ok(Vec::new());
        };
        let mut due: Vec<(&String, f64)> = members
            .iter()
            .filter(|(_, score)| **score <= max)
            .map(|(m, s)| (m, *s))
            .collect();
        // Ascending by score, member as tiebreak for a stable order.
        due.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        Ok(due.into_iter().map(|(m, _)| m.clone()).collect())
    }
}
