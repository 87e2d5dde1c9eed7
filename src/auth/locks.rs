//! Per-user lock arena.
//!
//! Serializes password changes and resets per user inside this process.
//! Locks are created on demand and idle entries are evicted on the next
//! acquisition, so the table stays bounded in a long-running server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;

struct Entry {
    lock: Arc<tokio::sync::Mutex<()>>,
    last_used: Instant,
}

pub struct LockArena {
    ttl: Duration,
    inner: Mutex<HashMap<String, Entry>>,
}

impl LockArena {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for `key`, creating it if needed. Expired idle
    /// entries are swept first; an entry still held elsewhere survives the
    /// sweep regardless of age.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let ttl = self.ttl;
            table.retain(|_, entry| {
                Arc::strong_count(&entry.lock) > 1 || now.duration_since(entry.last_used) < ttl
            });
            let entry = table.entry(key.to_string()).or_insert_with(|| Entry {
                lock: Arc::new(tokio::sync::Mutex::new(())),
                last_used: now,
            });
            entry.last_used = now;
            Arc::clone(&entry.lock)
        };
        lock.lock_owned().await
    }

    /// Number of live entries, for diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_serializes() {
        let arena = Arc::new(LockArena::new(Duration::from_secs(60)));
        let guard = arena.acquire("alice").await;

        let contender = Arc::clone(&arena);
        let pending = tokio::spawn(async move {
            let _guard = contender.acquire("alice").await;
        });
        // The second acquisition cannot complete while the guard is held.
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        drop(guard);
        pending.await.expect("contender finished");
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let arena = LockArena::new(Duration::from_secs(60));
        let _alice = arena.acquire("alice").await;
        let _bob = arena.acquire("bob").await;
        assert_eq!(arena.len(), 2);
    }

    #[tokio::test]
    async fn idle_entries_are_evicted() {
        let arena = LockArena::new(Duration::from_millis(0));
        drop(arena.acquire("alice").await);
        // Next acquisition sweeps the now-idle entry before inserting "bob".
        drop(arena.acquire("bob").await);
        assert_eq!(arena.len(), 1);
    }

    #[tokio::test]
    async fn held_entries_survive_eviction() {
        let arena = LockArena::new(Duration::from_millis(0));
        let guard = arena.acquire("alice").await;
        drop(arena.acquire("bob").await);
        assert_eq!(arena.len(), 2);
        drop(guard);
    }
}
