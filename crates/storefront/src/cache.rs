//! In-process TTL cache for expensive read aggregates.
//!
//! Each entry carries its own time-to-live. Expired entries are never
//! returned: a read past expiry behaves exactly like a miss, and the entry is
//! physically dropped by the next maintenance pass. [`TtlCache::spawn_sweeper`]
//! runs that pass on a fixed interval so keys that are written once and never
//! read again do not pin memory.
//!
//! The cache is single-process and not a source of truth. Handlers must
//! invalidate any key whose aggregate a write could change.
//!
//! There is no entry-count bound: TTLs and the sweeper bound memory, and a
//! size-bounded cache could refuse a fresh `set`.
//!
//! Every invalidation bumps a generation counter. A caller that loads a value
//! and then stores it with [`TtlCache::set_if_unchanged`] skips the store when
//! an invalidation happened during the load, so a stale aggregate is not put
//! back for a full TTL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

#[derive(Clone)]
struct Slot<V> {
    value: V,
    ttl: Duration,
}

/// Reads each entry's lifetime from its slot.
struct SlotExpiry;

impl<V> Expiry<String, Slot<V>> for SlotExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        slot: &Slot<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(slot.ttl)
    }

    // Overwrites restart the clock with the new entry's TTL.
    fn expire_after_update(
        &self,
        _key: &String,
        slot: &Slot<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(slot.ttl)
    }
}

/// Snapshot of the live cache contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entry_count: usize,
    /// Live keys, sorted.
    pub keys: Vec<String>,
}

/// String-keyed cache with per-entry expiry.
///
/// Cloning is cheap and clones share storage.
#[derive(Clone)]
pub struct TtlCache<V> {
    inner: Cache<String, Slot<V>>,
    /// Held across conditional stores and invalidations so the two never interleave.
    generation: Arc<Mutex<u64>>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        let inner = Cache::builder().expire_after(SlotExpiry).build();
        Self {
            inner,
            generation: Arc::new(Mutex::new(0)),
        }
    }

    /// Value for `key` if present and unexpired.
    pub async fn get(&self, key: &str) -> Option<V> {
        let hit = self.inner.get(key).await.map(|slot| slot.value);
        trace!(key, hit = hit.is_some(), "Cache lookup");
        hit
    }

    /// Store `value` under `key` for `ttl`, replacing any existing entry.
    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.inner.insert(key.into(), Slot { value, ttl }).await;
    }

    /// Current invalidation generation. Read it before loading a value that
    /// will be stored with [`TtlCache::set_if_unchanged`].
    pub async fn generation(&self) -> u64 {
        *self.generation.lock().await
    }

    /// Store `value` unless an invalidation happened since `seen` was read.
    ///
    /// Returns whether the value was stored.
    pub async fn set_if_unchanged(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: Duration,
        seen: u64,
    ) -> bool {
        let key: String = key.into();
        let generation = self.generation.lock().await;
        if *generation != seen {
            debug!(key = %key, "Invalidated during load, not caching");
            return false;
        }
        self.inner.insert(key, Slot { value, ttl }).await;
        true
    }

    /// Evict `key`. Missing keys are ignored.
    pub async fn delete(&self, key: &str) {
        let mut generation = self.generation.lock().await;
        *generation += 1;
        self.inner.invalidate(key).await;
    }

    /// Evict every entry.
    pub async fn clear(&self) {
        let mut generation = self.generation.lock().await;
        *generation += 1;
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
        drop(generation);
        debug!("Cache cleared");
    }

    /// Evict entries whose expiry has passed.
    ///
    /// Maintenance is applied in bounded batches, so concurrent readers and
    /// writers are never blocked for a whole scan.
    pub async fn sweep(&self) {
        self.inner.run_pending_tasks().await;
    }

    /// Live entry count and keys.
    pub async fn stats(&self) -> CacheStats {
        self.sweep().await;
        let mut keys: Vec<String> = self
            .inner
            .iter()
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        keys.sort_unstable();
        CacheStats {
            entry_count: keys.len(),
            keys,
        }
    }

    /// Spawn a task that sweeps the cache every `every`.
    ///
    /// The task runs until aborted through the returned handle or until the
    /// runtime shuts down.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        debug!(interval_secs = every.as_secs(), "Spawning cache sweeper");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                cache.sweep().await;
                trace!(entries = cache.inner.entry_count(), "Cache sweep complete");
            }
        })
    }
}

impl<V> Default for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}
