//! Time-to-live snapshot cache
//!
//! Snapshots are `Arc`s swapped in wholesale, so a reader sees either the old
//! or the new value. Refreshes are serialized: callers that miss while a
//! refresh is running wait for it and then reuse its result, unless the
//! cache was invalidated after that refresh started.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct CacheEntry<V> {
    value: Arc<V>,
    created_at: Instant,
    generation: u64,
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    refresh_lock: Mutex<()>,
    /// Bumped by `invalidate`; entries from an older generation are stale
    generation: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Copy + Debug,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// The stored snapshot for `key`, if it is still within the TTL
    pub async fn get(&self, key: K) -> Option<Arc<V>> {
        let generation = self.generation.load(Ordering::Acquire);
        let entries = self.entries.read().await;
        entries
            .get(&key)
            .filter(|entry| entry.generation == generation && entry.created_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Return the fresh snapshot or run `refresh` once and store its value.
    /// Failed refreshes are not cached.
    pub async fn get_or_refresh<F, Fut, E>(&self, key: K, refresh: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key).await {
            tracing::debug!("Cache hit for {:?}", key);
            return Ok(value);
        }

        let _refreshing = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        tracing::debug!("Cache miss for {:?}, refreshing", key);
        let generation = self.generation.load(Ordering::Acquire);
        let value = Arc::new(refresh().await?);

        let mut entries = self.entries.write().await;
        if self.generation.load(Ordering::Acquire) == generation {
            entries.insert(
                key,
                CacheEntry {
                    value: value.clone(),
                    created_at: Instant::now(),
                    generation,
                },
            );
        } else {
            tracing::debug!("Cache invalidated during refresh for {:?}, result not stored", key);
        }
        Ok(value)
    }

    /// Drop every snapshot so the next read refreshes, including snapshots
    /// from refreshes still in flight
    pub async fn invalidate(&self) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
        tracing::debug!("Cache invalidated");
    }
}
