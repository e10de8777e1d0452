//! Recency list: doubly-linked ordering from most recently used (head)
//! to least recently used (tail).
//!
//! Nodes live in an arena (`Vec<Option<Node>>`) and link to each other by
//! index, so a [`NodeId`] stays valid until its node is evicted or removed.
//! Freed slots are recycled through a free list.

use std::fmt::{self, Write as _};

use tracing::{debug, error};

use crate::error::{Error, Result};

/// Stable handle to a node in the recency list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node in the recency list
struct Node<K, V> {
    key: K,
    value: V,
    /// Next more recently used node
    prev: Option<NodeId>,
    /// Next less recently used node
    next: Option<NodeId>,
}

/// Bounded doubly-linked list over an arena of nodes
pub(crate) struct RecencyList<K, V> {
    nodes: Vec<Option<Node<K, V>>>,
    free_list: Vec<usize>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
    max_size: usize,
}

fn inconsistency(msg: String) -> Error {
    error!("{}", msg);
    Error::InternalInconsistency(msg)
}

impl<K, V> RecencyList<K, V> {
    /// Create an empty list that holds at most `max_size` nodes
    pub fn new(max_size: usize) -> Self {
        debug_assert!(max_size > 0, "max_size must be greater than 0");

        Self {
            nodes: Vec::with_capacity(max_size),
            free_list: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Change the bound checked by `insert`. Existing nodes are not touched;
    /// shrink with [`RecencyList::trim`] first.
    pub fn set_max_size(&mut self, max_size: usize) {
        debug_assert!(max_size > 0, "max_size must be greater than 0");
        self.max_size = max_size;
    }

    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    pub fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    pub fn key(&self, id: NodeId) -> Result<&K> {
        self.node(id).map(|node| &node.key)
    }

    pub fn value(&self, id: NodeId) -> Result<&V> {
        self.node(id).map(|node| &node.value)
    }

    pub fn value_mut(&mut self, id: NodeId) -> Result<&mut V> {
        self.node_mut(id).map(|node| &mut node.value)
    }

    /// Link a node for a key the caller knows to be absent.
    ///
    /// The node becomes the head. If that pushes the list past `max_size`,
    /// the tail is evicted and returned alongside the new handle.
    pub fn insert(&mut self, key: K, value: V) -> Result<(NodeId, Option<(K, V)>)> {
        let id = self.alloc(Node {
            key,
            value,
            prev: None,
            next: None,
        });
        self.link_front(id)?;
        self.len += 1;

        if self.head != Some(id) {
            return Err(inconsistency(format!(
                "inserted node {} did not land at the head",
                id
            )));
        }

        let evicted = if self.len > self.max_size {
            let entry = self.pop_tail()?;
            debug!(len = self.len, "evicted tail after insert");
            Some(entry)
        } else {
            None
        };

        Ok((id, evicted))
    }

    /// Move a linked node to the head. No-op if it already is the head.
    pub fn promote(&mut self, id: NodeId) -> Result<()> {
        if self.head == Some(id) {
            return Ok(());
        }

        self.unlink(id)?;
        self.link_front(id)
    }

    /// Unlink and free a node, returning its entry
    pub fn remove(&mut self, id: NodeId) -> Result<(K, V)> {
        self.unlink(id)?;
        self.len -= 1;
        let node = self.free(id)?;
        Ok((node.key, node.value))
    }

    /// Remove `count` nodes starting at the tail and moving towards the head.
    ///
    /// Returns the removed entries, least recently used first, so the caller
    /// can reconcile its index.
    pub fn trim(&mut self, count: usize) -> Result<Vec<(K, V)>> {
        if count > self.len {
            return Err(inconsistency(format!(
                "asked to trim {} nodes but the list holds only {}",
                count, self.len
            )));
        }

        let mut removed = Vec::with_capacity(count);
        for _ in 0..count {
            removed.push(self.pop_tail()?);
        }

        debug!(trimmed = count, len = self.len, "trimmed list");
        Ok(removed)
    }

    /// Drop every node
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Iterate entries from head to tail
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    /// Position of `key` counted from the head (0 = most recent).
    ///
    /// Linear scan; diagnostic only.
    pub fn index_of(&self, key: &K) -> Option<usize>
    where
        K: PartialEq,
    {
        self.iter().position(|(k, _)| k == key)
    }

    /// Walk the list and check every structural invariant
    pub fn validate(&self) -> Result<()> {
        if self.len > self.max_size {
            return Err(inconsistency(format!(
                "list holds {} nodes, more than its bound of {}",
                self.len, self.max_size
            )));
        }

        let live = self.nodes.iter().filter(|slot| slot.is_some()).count();
        if live != self.len {
            return Err(inconsistency(format!(
                "arena holds {} live nodes but the list tracks {}",
                live, self.len
            )));
        }

        match (self.head, self.tail) {
            (None, None) if self.len == 0 => return Ok(()),
            (Some(_), Some(_)) if self.len > 0 => {}
            _ => {
                return Err(inconsistency(format!(
                    "head/tail presence does not match size {}",
                    self.len
                )))
            }
        }

        let mut seen = 0;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            seen += 1;
            if seen > self.len {
                return Err(inconsistency(format!(
                    "walked more than {} nodes from the head; the list has a loop",
                    self.len
                )));
            }

            let node = self.node(id)?;
            if node.next == Some(id) || node.prev == Some(id) {
                return Err(inconsistency(format!("node {} links to itself", id)));
            }
            if node.prev != prev {
                return Err(inconsistency(format!(
                    "node {} has a back link that does not match its predecessor",
                    id
                )));
            }

            prev = Some(id);
            cursor = node.next;
        }

        if seen != self.len {
            return Err(inconsistency(format!(
                "walked {} nodes from the head but the list tracks {}",
                seen, self.len
            )));
        }
        if prev != self.tail {
            return Err(inconsistency("walk from the head did not end at the tail".into()));
        }

        Ok(())
    }

    fn node(&self, id: NodeId) -> Result<&Node<K, V>> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| inconsistency(format!("dangling node handle {}", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<K, V>> {
        match self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            Some(node) => Ok(node),
            None => Err(inconsistency(format!("dangling node handle {}", id))),
        }
    }

    fn set_next(&mut self, id: NodeId, next: Option<NodeId>) -> Result<()> {
        if next == Some(id) {
            return Err(inconsistency(format!("attempted to link node {} to itself", id)));
        }
        self.node_mut(id)?.next = next;
        Ok(())
    }

    fn set_prev(&mut self, id: NodeId, prev: Option<NodeId>) -> Result<()> {
        if prev == Some(id) {
            return Err(inconsistency(format!("attempted to link node {} to itself", id)));
        }
        self.node_mut(id)?.prev = prev;
        Ok(())
    }

    /// Splice a linked node out, bridging its neighbours or moving the
    /// head/tail pointer when it sits at a boundary. Leaves the node with
    /// no links; does not change `len`.
    fn unlink(&mut self, id: NodeId) -> Result<()> {
        let (prev, next) = {
            let node = self.node(id)?;
            (node.prev, node.next)
        };

        if (prev.is_none() && self.head != Some(id)) || (next.is_none() && self.tail != Some(id)) {
            return Err(inconsistency(format!(
                "node {} is not linked into the list",
                id
            )));
        }

        match prev {
            Some(prev_id) => self.set_next(prev_id, next)?,
            None => self.head = next,
        }

        match next {
            Some(next_id) => self.set_prev(next_id, prev)?,
            None => self.tail = prev,
        }

        let node = self.node_mut(id)?;
        node.prev = None;
        node.next = None;
        Ok(())
    }

    /// Link an unlinked node in front of the current head
    fn link_front(&mut self, id: NodeId) -> Result<()> {
        let old_head = self.head;
        self.set_prev(id, None)?;
        self.set_next(id, old_head)?;

        match old_head {
            Some(head_id) => self.set_prev(head_id, Some(id))?,
            None => self.tail = Some(id),
        }

        self.head = Some(id);
        Ok(())
    }

    fn pop_tail(&mut self) -> Result<(K, V)> {
        match self.tail {
            Some(tail_id) => self.remove(tail_id),
            None => Err(inconsistency("attempted to evict from an empty list".into())),
        }
    }

    fn alloc(&mut self, node: Node<K, V>) -> NodeId {
        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx] = Some(node);
            NodeId(idx)
        } else {
            self.nodes.push(Some(node));
            NodeId(self.nodes.len() - 1)
        }
    }

    fn free(&mut self, id: NodeId) -> Result<Node<K, V>> {
        let node = self
            .nodes
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or_else(|| inconsistency(format!("freeing dangling node handle {}", id)))?;
        self.free_list.push(id.0);
        Ok(node)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> RecencyList<K, V> {
    /// Render `key : value` pairs from head to tail.
    ///
    /// Refuses to loop forever: a self-link, or a node count that does not
    /// match the tracked size, is reported as an inconsistency.
    pub fn render(&self) -> Result<String> {
        let mut out = String::new();
        let mut seen = 0;
        let mut cursor = self.head;

        while let Some(id) = cursor {
            seen += 1;
            if seen > self.len {
                return Err(inconsistency(format!(
                    "too many nodes: expected {} but have already seen {}; probably a loop",
                    self.len, seen
                )));
            }

            let node = self.node(id)?;
            if node.next == Some(id) || node.prev == Some(id) {
                return Err(inconsistency(format!(
                    "node {:?} : {:?} points to itself",
                    node.key, node.value
                )));
            }

            // Writing to a String cannot fail.
            let _ = write!(out, "{:?} : {:?}", node.key, node.value);
            if node.next.is_some() {
                out.push_str(" -> ");
            }
            cursor = node.next;
        }

        if seen < self.len {
            return Err(inconsistency(format!(
                "too few nodes: expected {} but saw only {}",
                self.len, seen
            )));
        }

        Ok(out)
    }
}

/// Head-to-tail iterator over a [`RecencyList`]
pub(crate) struct Iter<'a, K, V> {
    list: &'a RecencyList<K, V>,
    cursor: Option<NodeId>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.list.node(self.cursor?).ok()?;
        self.remaining -= 1;
        self.cursor = node.next;
        Some((&node.key, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &RecencyList<&'static str, i32>) -> Vec<&'static str> {
        list.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn test_insert_into_empty() {
        let mut list = RecencyList::new(3);

        let (id, evicted) = list.insert("a", 1).unwrap();

        assert!(evicted.is_none());
        assert_eq!(list.len(), 1);
        assert_eq!(list.head(), Some(id));
        assert_eq!(list.tail(), Some(id));
        list.validate().unwrap();
    }

    #[test]
    fn test_insert_orders_most_recent_first() {
        let mut list = RecencyList::new(3);

        list.insert("a", 1).unwrap();
        list.insert("b", 2).unwrap();
        list.insert("c", 3).unwrap();

        assert_eq!(keys(&list), vec!["c", "b", "a"]);
        assert_eq!(list.index_of(&"c"), Some(0));
        assert_eq!(list.index_of(&"a"), Some(2));
        assert_eq!(list.index_of(&"z"), None);
        list.validate().unwrap();
    }

    #[test]
    fn test_insert_past_bound_evicts_tail() {
        let mut list = RecencyList::new(2);

        list.insert("a", 1).unwrap();
        list.insert("b", 2).unwrap();
        let (_, evicted) = list.insert("c", 3).unwrap();

        assert_eq!(evicted, Some(("a", 1)));
        assert_eq!(list.len(), 2);
        assert_eq!(keys(&list), vec!["c", "b"]);
        list.validate().unwrap();
    }

    #[test]
    fn test_bound_of_one_keeps_single_node() {
        let mut list = RecencyList::new(1);

        list.insert("a", 1).unwrap();
        let (id, evicted) = list.insert("b", 2).unwrap();

        assert_eq!(evicted, Some(("a", 1)));
        assert_eq!(list.head(), Some(id));
        assert_eq!(list.tail(), Some(id));
        list.validate().unwrap();
    }

    #[test]
    fn test_promote_tail_middle_and_head() {
        let mut list = RecencyList::new(4);

        let (a, _) = list.insert("a", 1).unwrap();
        let (b, _) = list.insert("b", 2).unwrap();
        list.insert("c", 3).unwrap();
        let (d, _) = list.insert("d", 4).unwrap();

        // tail
        list.promote(a).unwrap();
        assert_eq!(keys(&list), vec!["a", "d", "c", "b"]);
        list.validate().unwrap();

        // middle
        list.promote(d).unwrap();
        assert_eq!(keys(&list), vec!["d", "a", "c", "b"]);
        list.validate().unwrap();

        // head
        list.promote(d).unwrap();
        assert_eq!(keys(&list), vec!["d", "a", "c", "b"]);

        // new tail after promoting the old one
        list.promote(b).unwrap();
        assert_eq!(list.key(list.tail().unwrap()).unwrap(), &"c");
        list.validate().unwrap();
    }

    #[test]
    fn test_promote_in_pair_swaps_head_and_tail() {
        let mut list = RecencyList::new(2);

        let (a, _) = list.insert("a", 1).unwrap();
        let (b, _) = list.insert("b", 2).unwrap();
        list.promote(a).unwrap();

        assert_eq!(list.head(), Some(a));
        assert_eq!(list.tail(), Some(b));
        list.validate().unwrap();
    }

    #[test]
    fn test_promote_dangling_handle_fails() {
        let mut list = RecencyList::new(2);

        let (a, _) = list.insert("a", 1).unwrap();
        list.insert("b", 2).unwrap();
        list.remove(a).unwrap();

        let err = list.promote(a).unwrap_err();
        assert!(err.is_defect());
        list.validate().unwrap();
    }

    #[test]
    fn test_remove_reuses_slot() {
        let mut list = RecencyList::new(3);

        list.insert("a", 1).unwrap();
        let (b, _) = list.insert("b", 2).unwrap();
        list.insert("c", 3).unwrap();

        assert_eq!(list.remove(b).unwrap(), ("b", 2));
        assert_eq!(keys(&list), vec!["c", "a"]);

        let (d, _) = list.insert("d", 4).unwrap();
        assert_eq!(d, b);
        assert_eq!(keys(&list), vec!["d", "c", "a"]);
        list.validate().unwrap();
    }

    #[test]
    fn test_trim_from_tail() {
        let mut list = RecencyList::new(5);
        for (i, key) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            list.insert(key, i as i32).unwrap();
        }

        let removed = list.trim(3).unwrap();

        assert_eq!(removed, vec![("a", 0), ("b", 1), ("c", 2)]);
        assert_eq!(keys(&list), vec!["e", "d"]);
        list.validate().unwrap();
    }

    #[test]
    fn test_trim_to_single_node() {
        let mut list = RecencyList::new(3);
        list.insert("a", 1).unwrap();
        list.insert("b", 2).unwrap();
        list.insert("c", 3).unwrap();

        list.trim(2).unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(list.head(), list.tail());
        list.validate().unwrap();
    }

    #[test]
    fn test_trim_more_than_present_fails() {
        let mut list = RecencyList::new(5);
        list.insert("a", 1).unwrap();

        let err = list.trim(2).unwrap_err();

        assert!(err.is_defect());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_value_mut_updates_in_place() {
        let mut list = RecencyList::new(2);
        let (a, _) = list.insert("a", 1).unwrap();

        *list.value_mut(a).unwrap() = 10;

        assert_eq!(list.value(a).unwrap(), &10);
    }

    #[test]
    fn test_render_head_to_tail() {
        let mut list: RecencyList<&str, i32> = RecencyList::new(3);
        assert_eq!(list.render().unwrap(), "");

        list.insert("a", 1).unwrap();
        list.insert("b", 2).unwrap();

        assert_eq!(list.render().unwrap(), "\"b\" : 2 -> \"a\" : 1");
    }

    #[test]
    fn test_render_and_validate_detect_self_loop() {
        let mut list = RecencyList::new(3);
        let (a, _) = list.insert("a", 1).unwrap();
        list.insert("b", 2).unwrap();

        list.node_mut(a).unwrap().next = Some(a);

        assert!(list.render().unwrap_err().is_defect());
        assert!(list.validate().unwrap_err().is_defect());
    }

    #[test]
    fn test_render_detects_count_mismatch() {
        let mut list = RecencyList::new(3);
        list.insert("a", 1).unwrap();
        list.insert("b", 2).unwrap();

        list.len = 3;
        assert!(list.render().unwrap_err().is_defect());

        list.len = 1;
        assert!(list.render().unwrap_err().is_defect());
    }

    #[test]
    fn test_set_link_rejects_self_loop() {
        let mut list = RecencyList::new(2);
        let (a, _) = list.insert("a", 1).unwrap();

        assert!(list.set_next(a, Some(a)).is_err());
        assert!(list.set_prev(a, Some(a)).is_err());
        list.validate().unwrap();
    }

    #[test]
    fn test_clear() {
        let mut list = RecencyList::new(2);
        list.insert("a", 1).unwrap();
        list.insert("b", 2).unwrap();

        list.clear();

        assert_eq!(list.len(), 0);
        assert!(list.head().is_none());
        assert!(list.tail().is_none());
        list.validate().unwrap();
    }
}
