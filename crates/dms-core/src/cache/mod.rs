//! Size-bounded, thread-safe result cache.
//!
//! [`BoundedResultCache`] maps an opaque key to an opaque value and caps the
//! *total serialized size* of everything it holds, rather than the number of
//! entries.  The size of an entry is the length of the JSON encoding of its
//! key plus the length of the JSON encoding of its value, which is also
//! (within a few bytes of framing) what the entry costs in the snapshot file.
//!
//! # Composition
//!
//! The cache is a synchronization layer around an injected [`ResultStore`]:
//!
//! ```text
//! BoundedResultCache          ← one Mutex, capacity policy, size accounting
//!   └─ ResultStore            ← entries + random victim selection
//!        (RandomReplacementStore by default)
//! ```
//!
//! # Capacity policy
//!
//! After an insertion pushes the total above capacity, entries *other than
//! the one just inserted* are evicted at random until the total fits again.
//! If a single item is larger than the whole capacity, every other entry is
//! evicted and the oversized item is kept anyway: the cache never rejects an
//! insertion.
//!
//! # Serialization failures
//!
//! If a key or value cannot be serialized while computing its size, the
//! failure is logged and that part contributes zero bytes.  The insertion
//! still goes ahead.

pub mod probe;
pub mod snapshot;
pub mod store;

use std::hash::Hash;
use std::io;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use store::{RandomReplacementStore, ResultStore};

/// Default capacity of the probe cache: 64 MiB of serialized entries.
pub const DEFAULT_CACHE_CAPACITY: u64 = 64 << 20;

/// One key/value pair as returned by [`BoundedResultCache::items`] and as
/// stored in the snapshot file.
///
/// The record field names are also accepted capitalized (`Key`, `Value`).
/// Only the field names are matched case-insensitively: a key must still have
/// the shape of `K`, so snapshots whose keys were encoded differently fail to
/// load as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItem<K, V> {
    #[serde(alias = "Key")]
    pub key: K,
    #[serde(alias = "Value")]
    pub value: V,
}

/// A thread-safe cache bounded by the total serialized size of its entries.
///
/// Every operation takes the same lock, so `get`, `set` and `items` are
/// linearizable with respect to each other.  No I/O happens while the lock is
/// held; callers that persist the cache work on the copy returned by
/// [`items`](Self::items).
pub struct BoundedResultCache<K, V, S = RandomReplacementStore<K, V>> {
    store: Mutex<S>,
    capacity: u64,
    _entries: PhantomData<fn() -> (K, V)>,
}

impl<K, V> BoundedResultCache<K, V>
where
    K: Serialize + Eq + Hash + Clone + Send,
    V: Serialize + Clone + Send,
{
    /// Creates an empty cache with a [`RandomReplacementStore`].
    pub fn new(capacity: u64) -> Self {
        Self::with_store(RandomReplacementStore::new(), capacity)
    }
}

impl<K, V, S> BoundedResultCache<K, V, S>
where
    K: Serialize + Eq + Hash + Clone,
    V: Serialize + Clone,
    S: ResultStore<K, V>,
{
    /// Wraps `store` with a lock and a capacity of `capacity` bytes.
    ///
    /// The capacity is fixed for the life of the cache.
    pub fn with_store(store: S, capacity: u64) -> Self {
        Self {
            store: Mutex::new(store),
            capacity,
            _entries: PhantomData,
        }
    }

    /// Returns a copy of the value cached under `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    /// Caches `value` under `key`, evicting random other entries if the total
    /// serialized size would exceed capacity.
    pub fn set(&self, key: K, value: V) {
        let size = serialized_len(&key, "key") + serialized_len(&value, "value");
        let protect = key.clone();

        let mut store = self.lock();
        store.insert(key, value, size);

        let mut evicted = 0usize;
        while store.total_size() > self.capacity {
            match store.evict_random(&protect) {
                Some(_) => evicted += 1,
                None => break,
            }
        }

        if evicted > 0 {
            debug!(
                "evicted {evicted} cache entries; {} bytes in {} entries remain",
                store.total_size(),
                store.len()
            );
        }
        if store.total_size() > self.capacity {
            debug!(
                "admitted a {size}-byte entry larger than the {}-byte cache capacity",
                self.capacity
            );
        }
    }

    /// Returns an independent snapshot of every entry, taken under the lock.
    pub fn items(&self) -> Vec<CacheItem<K, V>> {
        self.lock()
            .items()
            .into_iter()
            .map(|(key, value)| CacheItem { key, value })
            .collect()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the serialized sizes of all cached entries.
    pub fn total_size(&self) -> u64 {
        self.lock().total_size()
    }

    /// The fixed capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, S> {
        // A panic inside a critical section cannot leave the store in a state
        // that is unsafe to read, so a poisoned lock is simply taken over.
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `io::Write` sink that only counts bytes.
struct ByteCounter(u64);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// JSON-encoded length of `item`, or zero (with a warning) if it cannot be
/// encoded.
fn serialized_len<T: Serialize>(item: &T, what: &str) -> u64 {
    let mut counter = ByteCounter(0);
    match serde_json::to_writer(&mut counter, item) {
        Ok(()) => counter.0,
        Err(e) => {
            warn!("could not serialize cache {what} for size accounting: {e}");
            0
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
