//! Unsynchronized result stores with random-replacement eviction.
//!
//! A [`ResultStore`] is the storage engine behind [`BoundedResultCache`]: it
//! keeps entries and their accounted sizes, and can give up a random victim
//! on demand.  It knows nothing about capacity or locking; the cache wrapper
//! decides *when* to evict and serializes every access.
//!
//! # Why random replacement?
//!
//! Probe results are looked up by path and modification time.  Access
//! patterns follow whatever a media client happens to browse, so neither
//! recency nor frequency predicts the next hit particularly well, and random
//! replacement needs no bookkeeping on `get`.  Lookups therefore only need a
//! shared borrow of the store.
//!
//! [`BoundedResultCache`]: super::BoundedResultCache

use std::collections::HashMap;
use std::hash::Hash;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Storage engine injected into a [`BoundedResultCache`](super::BoundedResultCache).
pub trait ResultStore<K, V>: Send {
    /// Returns the value stored under `key`.
    fn get(&self, key: &K) -> Option<&V>;

    /// Stores `value` under `key` with an accounted size of `size` bytes,
    /// replacing (and un-accounting) any previous entry for the same key.
    fn insert(&mut self, key: K, value: V, size: u64);

    /// Removes one randomly selected entry whose key is not `protect`.
    ///
    /// Returns the evicted key and its accounted size, or `None` when no
    /// entry other than `protect` remains.
    fn evict_random(&mut self, protect: &K) -> Option<(K, u64)>;

    /// Returns a copy of every stored key/value pair, in no particular order.
    fn items(&self) -> Vec<(K, V)>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Sum of the accounted sizes of all stored entries.
    fn total_size(&self) -> u64;
}

#[derive(Debug, Clone)]
struct Entry<K, V> {
    key: K,
    value: V,
    size: u64,
}

/// A [`ResultStore`] that evicts uniformly at random.
///
/// Entries live in a dense `Vec` so a victim can be picked by index in O(1)
/// and removed with `swap_remove`; a `HashMap` maps each key to its current
/// slot.
#[derive(Debug)]
pub struct RandomReplacementStore<K, V> {
    entries: Vec<Entry<K, V>>,
    index: HashMap<K, usize>,
    total_size: u64,
    rng: StdRng,
}

impl<K, V> RandomReplacementStore<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty store seeded from the OS entropy source.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates an empty store that draws victims from `rng`.
    ///
    /// Tests use a seeded generator to make eviction reproducible.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            total_size: 0,
            rng,
        }
    }

    fn remove_at(&mut self, slot: usize) -> Entry<K, V> {
        let removed = self.entries.swap_remove(slot);
        self.index.remove(&removed.key);
        // `swap_remove` moved the last entry into `slot`; repoint its index.
        if let Some(moved) = self.entries.get(slot) {
            self.index.insert(moved.key.clone(), slot);
        }
        self.total_size -= removed.size;
        removed
    }
}

impl<K, V> Default for RandomReplacementStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ResultStore<K, V> for RandomReplacementStore<K, V>
where
    K: Eq + Hash + Clone + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&slot| &self.entries[slot].value)
    }

    fn insert(&mut self, key: K, value: V, size: u64) {
        if let Some(&slot) = self.index.get(&key) {
            let entry = &mut self.entries[slot];
            self.total_size = self.total_size - entry.size + size;
            entry.value = value;
            entry.size = size;
            return;
        }

        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(Entry { key, value, size });
        self.total_size += size;
    }

    fn evict_random(&mut self, protect: &K) -> Option<(K, u64)> {
        let protected_slot = self.index.get(protect).copied();
        let candidates = self.entries.len() - usize::from(protected_slot.is_some());
        if candidates == 0 {
            return None;
        }

        // Draw among the unprotected slots only, skipping over the protected one.
        let mut slot = self.rng.gen_range(0..candidates);
        if let Some(protected) = protected_slot {
            if slot >= protected {
                slot += 1;
            }
        }

        let removed = self.remove_at(slot);
        Some((removed.key, removed.size))
    }

    fn items(&self) -> Vec<(K, V)> {
        self.entries
            .iter()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn total_size(&self) -> u64 {
        self.total_size
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> RandomReplacementStore<&'static str, u32> {
        RandomReplacementStore::with_rng(StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_insert_accounts_size() {
        // Arrange
        let mut store = seeded();

        // Act
        store.insert("a", 1, 10);
        store.insert("b", 2, 15);

        // Assert
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_size(), 25);
        assert_eq!(store.get(&"a"), Some(&1));
    }

    #[test]
    fn test_insert_existing_key_replaces_value_and_size() {
        let mut store = seeded();
        store.insert("a", 1, 10);

        store.insert("a", 9, 4);

        assert_eq!(store.len(), 1);
        assert_eq!(store.total_size(), 4);
        assert_eq!(store.get(&"a"), Some(&9));
    }

    #[test]
    fn test_evict_random_never_picks_protected_key() {
        // Arrange: many rounds so every slot position gets exercised
        for seed in 0..64 {
            let mut store: RandomReplacementStore<&str, u32> =
                RandomReplacementStore::with_rng(StdRng::seed_from_u64(seed));
            store.insert("a", 1, 1);
            store.insert("keep", 2, 1);
            store.insert("c", 3, 1);

            // Act
            let (victim, _) = store.evict_random(&"keep").expect("a victim exists");

            // Assert
            assert_ne!(victim, "keep");
            assert!(store.get(&"keep").is_some());
            assert_eq!(store.len(), 2);
        }
    }

    #[test]
    fn test_evict_random_returns_none_when_only_protected_key_remains() {
        let mut store = seeded();
        store.insert("only", 1, 100);

        assert_eq!(store.evict_random(&"only"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_evict_random_on_empty_store_returns_none() {
        let mut store = seeded();

        assert_eq!(store.evict_random(&"missing"), None);
    }

    #[test]
    fn test_evict_random_keeps_index_consistent_after_swap_remove() {
        // Arrange
        let mut store = seeded();
        for (i, key) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            store.insert(key, i as u32, 1);
        }

        // Act: evict until empty, checking every survivor is still reachable
        while let Some((victim, size)) = store.evict_random(&"none") {
            assert_eq!(size, 1);
            assert!(store.get(&victim).is_none());
            for (key, value) in store.items() {
                assert_eq!(store.get(&key), Some(&value));
            }
        }

        // Assert
        assert_eq!(store.len(), 0);
        assert_eq!(store.total_size(), 0);
    }
}
