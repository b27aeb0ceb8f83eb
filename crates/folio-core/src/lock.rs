//! Distributed lock over the shared store.
//!
//! A lock record is `key -> expiry` (Unix seconds as a string). There is no
//! heartbeat renewal: the TTL is fixed and chosen longer than the worst
//! thing done under the lock (for the first-trade lock, the chain's
//! worst-case confirmation time). Crash recovery is built into `acquire`:
//! a record whose expiry has passed is stolen by atomically swapping in a
//! fresh one, and the store's `set_nx`/`getset` are the single source of
//! truth for who holds it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::IssueId;
use crate::error::MarketError;
use crate::ports::{Clock, SharedStore};

/// Acquires and releases named locks.
pub struct LockManager {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    poll: Duration,
}

impl LockManager {
    pub fn new(
        store: Arc<dyn SharedStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        poll: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            ttl,
            poll,
        }
    }

    /// The per-issue lock serializing first-sale mint calls.
    pub fn first_trade_key(issue: IssueId) -> String {
        format!("issue:{}:first-trade", issue.key())
    }

    fn now_secs(&self) -> f64 {
        self.clock.now().timestamp_millis() as f64 / 1000.0
    }

    /// Block (with bounded polling) until the lock is held.
    ///
    /// Waits at most one TTL: any holder either releases or becomes
    /// stealable within that window, so a longer wait means the store is
    /// misbehaving and the caller's driver should retry the whole
    /// operation. Store errors fail fast — the caller must never proceed
    /// without the lock.
    pub async fn acquire(&self, key: &str) -> Result<LockGuard, MarketError> {
        let deadline = self.now_secs() + self.ttl.as_secs_f64();
        loop {
            let fresh_expiry = (self.now_secs() + self.ttl.as_secs_f64()).to_string();
            if self.store.set_nx(key, &fresh_expiry).await? {
                debug!(key, "lock acquired");
                return Ok(self.guard(key));
            }

            // Occupied. Swap in a fresh expiry and look at what was there:
            // only one of several racing stealers observes the expired
            // value. A losing swap extends the holder's expiry by at most
            // one TTL, which the wait budget already accounts for.
            let previous = self.store.getset(key, &fresh_expiry).await?;
            match previous.as_deref().map(str::parse::<f64>) {
                Some(Ok(expiry)) if self.now_secs() > expiry => {
                    debug!(key, "stole expired lock");
                    return Ok(self.guard(key));
                }
                Some(Ok(_)) => {}
                // A record we cannot read is a corrupt leftover; claim it.
                None | Some(Err(_)) => {
                    warn!(key, "unreadable lock record, claiming");
                    return Ok(self.guard(key));
                }
            }

            if self.now_secs() >= deadline {
                return Err(MarketError::LockTimeout(key.to_owned()));
            }
            tokio::time::sleep(self.poll).await;
        }
    }

    fn guard(&self, key: &str) -> LockGuard {
        LockGuard {
            store: Arc::clone(&self.store),
            key: key.to_owned(),
        }
    }
}

/// A held lock.
///
/// Correctness never depends on `release`: the record self-expires. The
/// happy path releases early so the next caller does not wait out the TTL.
pub struct LockGuard {
    store: Arc<dyn SharedStore>,
    key: String,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).finish()
    }
}

impl LockGuard {
    pub async fn release(self) {
        if let Err(e) = self.store.delete(&self.key).await {
            // The record will self-expire; nothing else to do.
            warn!(key = %self.key, error = %e, "lock release failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemorySharedStore;
    use crate::ports::SystemClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn manager(store: Arc<InMemorySharedStore>, ttl_ms: u64) -> LockManager {
        LockManager::new(
            store,
            Arc::new(SystemClock),
            Duration::from_millis(ttl_ms),
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn acquire_then_release_then_reacquire() {
        let store = Arc::new(InMemorySharedStore::new());
        let locks = manager(Arc::clone(&store), 500);

        let guard = locks.acquire("k").await.unwrap();
        guard.release().await;
        let guard = locks.acquire("k").await.unwrap();
        guard.release().await;
    }

    #[tokio::test]
    async fn held_lock_blocks_until_wait_budget_runs_out() {
        let store = Arc::new(InMemorySharedStore::new());
        let locks = manager(Arc::clone(&store), 100);

        let _held = locks.acquire("k").await.unwrap();
        let err = locks.acquire("k").await.unwrap_err();
        assert!(matches!(err, MarketError::LockTimeout(_)));
    }

    #[tokio::test]
    async fn expired_lock_is_stolen() {
        let store = Arc::new(InMemorySharedStore::new());
        let locks = manager(Arc::clone(&store), 500);

        // A crashed holder left a record whose expiry has passed.
        store.set_nx("k", "1.0").await.unwrap();

        let guard = locks.acquire("k").await.unwrap();
        guard.release().await;
    }

    #[tokio::test]
    async fn unreachable_store_fails_fast() {
        let store = Arc::new(InMemorySharedStore::new());
        let locks = manager(Arc::clone(&store), 500);
        store.set_unreachable(true);

        let err = locks.acquire("k").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn critical_sections_never_overlap() {
        let store = Arc::new(InMemorySharedStore::new());
        let locks = Arc::new(manager(Arc::clone(&store), 2_000));

        let in_section = Arc::new(AtomicU32::new(0));
        let mut joins = Vec::new();
        for _ in 0..4 {
            let locks = Arc::clone(&locks);
            let in_section = Arc::clone(&in_section);
            joins.push(tokio::spawn(async move {
                let guard = locks.acquire("k").await.unwrap();
                assert_eq!(in_section.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
                guard.release().await;
            }));
        }
        for j in joins {
            j.await.unwrap();
        }
    }
}
