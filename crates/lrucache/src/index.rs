//! Key index: maps each cached key to its node in the recency list.

use std::collections::HashMap;
use std::hash::Hash;

use ahash::RandomState;

use crate::list::NodeId;

/// Key to node-handle mapping. Holds handles only; the recency list owns the nodes.
pub(crate) struct Index<K> {
    map: HashMap<K, NodeId, RandomState>,
}

impl<K> Index<K>
where
    K: Hash + Eq,
{
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<NodeId> {
        self.map.get(key).copied()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Insert a handle, returning the one it replaced
    pub fn insert(&mut self, key: K, id: NodeId) -> Option<NodeId> {
        self.map.insert(key, id)
    }

    pub fn remove(&mut self, key: &K) -> Option<NodeId> {
        self.map.remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, NodeId)> {
        self.map.iter().map(|(k, &id)| (k, id))
    }
}
