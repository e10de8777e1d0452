//! LruCache: index plus recency list behind one lock

use std::fmt;
use std::hash::Hash;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::index::Index;
use crate::list::{NodeId, RecencyList};
use crate::stats::CacheStats;
use crate::MAX_CAPACITY;

/// Bounded, thread-safe LRU cache.
///
/// Every operation takes the same lock for its whole duration, so writes and
/// resizes are totally ordered per cache. Only `write` changes recency:
/// a `read` leaves the order as it was.
///
/// Share between threads with [`std::sync::Arc`]; all operations take `&self`.
pub struct LruCache<K, V> {
    /// Index and list, always mutated together
    state: Mutex<State<K, V>>,

    /// Cache statistics
    stats: CacheStats,
}

/// Locked context. Helpers here assume the caller holds the lock.
struct State<K, V> {
    index: Index<K>,
    list: RecencyList<K, V>,
    capacity: usize,
}

fn check_capacity(capacity: usize) -> Result<()> {
    if !(1..=MAX_CAPACITY).contains(&capacity) {
        error!(capacity, "size needs to be between 1 and {}", MAX_CAPACITY);
        return Err(Error::InvalidCapacity(capacity));
    }
    Ok(())
}

impl<K, V> State<K, V>
where
    K: Hash + Eq + Clone,
    V: PartialEq,
{
    fn size(&self) -> Result<usize> {
        let indexed = self.index.len();
        let listed = self.list.len();
        if indexed != listed {
            let msg = format!(
                "mismatch in data structure sizes: index holds {} but list holds {}",
                indexed, listed
            );
            error!("{}", msg);
            return Err(Error::InternalInconsistency(msg));
        }
        Ok(indexed)
    }

    fn write(&mut self, key: K, value: V, stats: &CacheStats) -> Result<()> {
        if let Some(id) = self.index.get(&key) {
            let current = self.list.value_mut(id)?;
            if *current != value {
                *current = value;
            }
            // Promotion happens whether or not the value changed.
            self.list.promote(id)?;
            stats.record_update();
            return Ok(());
        }

        // The index sheds the tail key before the list evicts the same node.
        let evicting = self.size()? == self.capacity;
        if evicting {
            if let Some(tail) = self.list.tail() {
                let tail_key = self.list.key(tail)?;
                self.index.remove(tail_key);
            }
        }

        let (id, evicted) = self.list.insert(key.clone(), value)?;
        if evicting != evicted.is_some() {
            let msg = format!(
                "index expected eviction: {}, list evicted: {}",
                evicting,
                evicted.is_some()
            );
            error!("{}", msg);
            return Err(Error::InternalInconsistency(msg));
        }
        self.link_index(key, id)?;

        stats.record_insert();
        if evicting {
            stats.record_evictions(1);
            debug!(capacity = self.capacity, "evicted least recently used entry");
        }
        Ok(())
    }

    /// Record the handle of a freshly inserted node. The key must not be indexed yet.
    fn link_index(&mut self, key: K, id: NodeId) -> Result<()> {
        if let Some(stale) = self.index.insert(key, id) {
            let msg = format!("new key replaced index handle {} for node {}", stale, id);
            error!("{}", msg);
            return Err(Error::InternalInconsistency(msg));
        }
        Ok(())
    }

    fn resize(&mut self, new_capacity: usize, stats: &CacheStats) -> Result<()> {
        check_capacity(new_capacity)?;

        if new_capacity >= self.capacity {
            debug!(
                from = self.capacity,
                to = new_capacity,
                "growing cache capacity"
            );
            self.capacity = new_capacity;
            self.list.set_max_size(new_capacity);
            return Ok(());
        }

        let excess = self.list.len().saturating_sub(new_capacity);
        info!(
            from = self.capacity,
            to = new_capacity,
            "need to remove {} nodes",
            excess
        );

        let removed = self.list.trim(excess)?;
        for (key, _) in &removed {
            if self.index.remove(key).is_none() {
                let msg = "trimmed node had no index entry".to_string();
                error!("{}", msg);
                return Err(Error::InternalInconsistency(msg));
            }
        }
        self.capacity = new_capacity;
        self.list.set_max_size(new_capacity);

        stats.record_evictions(removed.len() as u64);
        self.size()?;
        Ok(())
    }

    fn remove(&mut self, key: &K) -> Result<Option<V>> {
        match self.index.remove(key) {
            Some(id) => {
                let (_, value) = self.list.remove(id)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn check_invariants(&self) -> Result<()> {
        self.list.validate()?;
        let size = self.size()?;

        if self.list.max_size() != self.capacity || size > self.capacity {
            let msg = format!(
                "size {} and list bound {} disagree with capacity {}",
                size,
                self.list.max_size(),
                self.capacity
            );
            error!("{}", msg);
            return Err(Error::InternalInconsistency(msg));
        }

        for (key, id) in self.index.iter() {
            if self.list.key(id)? != key {
                let msg = format!("index handle {} resolves to a node with a different key", id);
                error!("{}", msg);
                return Err(Error::InternalInconsistency(msg));
            }
        }

        Ok(())
    }

    /// Panic on a broken invariant in debug builds
    fn debug_check(&self) {
        if cfg!(debug_assertions) {
            if let Err(err) = self.check_invariants() {
                panic!("cache invariant violated: {}", err);
            }
        }
    }
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + PartialEq,
{
    /// Create a new cache holding at most `capacity` entries
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries, in `1..=MAX_CAPACITY`
    ///
    /// # Returns
    /// * `Result<LruCache>` - Empty cache, or `InvalidCapacity`
    pub fn new(capacity: usize) -> Result<Self> {
        check_capacity(capacity)?;

        Ok(Self {
            state: Mutex::new(State {
                index: Index::with_capacity(capacity),
                list: RecencyList::new(capacity),
                capacity,
            }),
            stats: CacheStats::new(),
        })
    }

    /// Write a value and make its key the most recently used.
    ///
    /// A new key on a full cache evicts the least recently used entry first.
    /// An existing key gets the new value and is promoted even when the value
    /// is unchanged.
    pub fn write(&self, key: K, value: V) -> Result<()> {
        let mut state = self.state.lock();
        state.write(key, value, &self.stats)?;
        state.debug_check();
        Ok(())
    }

    /// Read the value stored for `key` without changing recency
    ///
    /// # Returns
    /// * `Result<V>` - Clone of the value, or `NotFound`
    pub fn read(&self, key: &K) -> Result<V> {
        let state = self.state.lock();
        match state.index.get(key) {
            Some(id) => {
                let value = state.list.value(id)?.clone();
                self.stats.record_hit();
                Ok(value)
            }
            None => {
                self.stats.record_miss();
                Err(Error::NotFound)
            }
        }
    }

    /// Check whether `key` is cached
    pub fn exists(&self, key: &K) -> bool {
        self.state.lock().index.contains(key)
    }

    /// Check whether `key` is cached with exactly `value`.
    ///
    /// `None` stands for an empty value and is rejected with `InvalidArgument`.
    pub fn exists_value(&self, key: &K, value: Option<&V>) -> Result<bool> {
        let value = value.ok_or(Error::InvalidArgument("value cannot be empty"))?;

        let state = self.state.lock();
        match state.index.get(key) {
            Some(id) => Ok(state.list.value(id)? == value),
            None => Ok(false),
        }
    }

    /// Number of cached entries.
    ///
    /// Fails with `InternalInconsistency` if the index and list disagree.
    pub fn size(&self) -> Result<usize> {
        self.state.lock().size()
    }

    /// Check if the cache holds no entries.
    ///
    /// Fails like [`LruCache::size`] if the index and list disagree.
    pub fn is_empty(&self) -> Result<bool> {
        self.state.lock().size().map(|size| size == 0)
    }

    /// Configured maximum number of entries
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Change the capacity in place.
    ///
    /// Growing only raises the bound. Shrinking below the current size drops
    /// the least recently used entries until `new_capacity` remain.
    pub fn resize(&self, new_capacity: usize) -> Result<()> {
        let mut state = self.state.lock();
        state.resize(new_capacity, &self.stats)?;
        state.debug_check();
        Ok(())
    }

    /// Remove a key, returning its value if it was cached
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        let mut state = self.state.lock();
        let removed = state.remove(key)?;
        state.debug_check();
        Ok(removed)
    }

    /// Drop every entry and reset statistics. Capacity is kept.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.index.clear();
        state.list.clear();
        self.stats.reset();
    }

    /// Position of `key` in recency order (0 = most recent).
    ///
    /// Linear scan, meant for diagnostics and tests.
    pub fn index_of(&self, key: &K) -> Option<usize> {
        self.state.lock().list.index_of(key)
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<K> {
        let state = self.state.lock();
        state.list.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Most recently used key
    pub fn head_key(&self) -> Result<Option<K>> {
        let state = self.state.lock();
        state.size()?;
        state.list.head().map(|id| state.list.key(id).cloned()).transpose()
    }

    /// Least recently used key
    pub fn tail_key(&self) -> Result<Option<K>> {
        let state = self.state.lock();
        state.size()?;
        state.list.tail().map(|id| state.list.key(id).cloned()).transpose()
    }

    /// Validate index and list against each other.
    ///
    /// Checks that the list is acyclic with open ends, that no node links to
    /// itself, that both structures hold the same number of entries within
    /// capacity, and that every index handle points at its own key.
    pub fn check_invariants(&self) -> Result<()> {
        self.state.lock().check_invariants()
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: Clone + PartialEq + fmt::Debug,
{
    /// Render entries from head to tail as `key : value -> key : value`.
    ///
    /// Fails instead of looping when the list is malformed.
    pub fn render(&self) -> Result<String> {
        let state = self.state.lock();
        state.size()?;
        state.list.render()
    }
}
