// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! An unbounded recency index over cache keys.

use lru::LruCache;
use std::hash::Hash;

/// Tracks the recency order of a set of keys.
///
/// The front holds the most recently used key, the back the least recently
/// used one. Backed by an unbounded [`LruCache`] with unit values, so every
/// operation except iteration is O(1).
///
/// The index holds no values and enforces no capacity: what to evict, and when,
/// is decided by the owner.
pub struct LruIndex<K: Hash + Eq> {
    order: LruCache<K, ()>,
}

impl<K: Hash + Eq> Default for LruIndex<K> {
    fn default() -> Self {
        Self {
            order: LruCache::unbounded(),
        }
    }
}

impl<K: Hash + Eq + std::fmt::Debug> std::fmt::Debug for LruIndex<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<K: Hash + Eq> LruIndex<K> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns `true` if `key` is tracked.
    pub fn contains(&self, key: &K) -> bool {
        self.order.contains(key)
    }

    /// Inserts `key` as the most recently used entry.
    ///
    /// An already tracked key is moved to the front instead, and `false` is returned.
    pub fn push_front(&mut self, key: K) -> bool {
        if self.order.contains(&key) {
            self.order.promote(&key);
            return false;
        }
        self.order.put(key, ());
        true
    }

    /// Marks `key` as the most recently used entry. Returns `false` if it is not tracked.
    pub fn touch(&mut self, key: &K) -> bool {
        if !self.order.contains(key) {
            return false;
        }
        self.order.promote(key);
        true
    }

    /// Returns the least recently used key.
    pub fn back(&self) -> Option<&K> {
        self.order.peek_lru().map(|(key, _)| key)
    }

    /// Returns the most recently used key.
    pub fn front(&self) -> Option<&K> {
        self.order.iter().next().map(|(key, _)| key)
    }

    /// Removes and returns the least recently used key.
    pub fn pop_back(&mut self) -> Option<K> {
        self.order.pop_lru().map(|(key, _)| key)
    }

    /// Stops tracking `key`. Returns `false` if it was not tracked.
    pub fn remove(&mut self, key: &K) -> bool {
        self.order.pop(key).is_some()
    }

    /// Iterates from the most to the least recently used key.
    pub fn iter(&self) -> impl Iterator<Item = &K> + '_ {
        self.order.iter().map(|(key, _)| key)
    }

    /// Forgets every key.
    pub fn clear(&mut self) {
        self.order.clear();
    }
}

impl<K: Hash + Eq + Clone> LruIndex<K> {
    /// Moves the least recently used key to the front, so the next candidate
    /// becomes visible at the back.
    pub fn rotate_back_to_front(&mut self) {
        if let Some(key) = self.back().cloned() {
            self.order.promote(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(index: &LruIndex<&'static str>) -> Vec<&'static str> {
        index.iter().copied().collect()
    }

    #[test]
    fn push_front_orders_by_recency() {
        let mut lru = LruIndex::new();
        assert!(lru.push_front("a"));
        assert!(lru.push_front("b"));
        assert!(lru.push_front("c"));
        assert_eq!(order(&lru), vec!["c", "b", "a"]);
        assert_eq!(lru.back(), Some(&"a"));
        assert_eq!(lru.front(), Some(&"c"));
    }

    #[test]
    fn touch_moves_to_front() {
        let mut lru = LruIndex::new();
        lru.push_front("a");
        lru.push_front("b");
        lru.push_front("c");
        assert!(lru.touch(&"a"));
        assert_eq!(order(&lru), vec!["a", "c", "b"]);
        assert!(!lru.touch(&"z"));
    }

    #[test]
    fn duplicate_push_only_touches() {
        let mut lru = LruIndex::new();
        lru.push_front("a");
        lru.push_front("b");
        assert!(!lru.push_front("a"));
        assert_eq!(lru.len(), 2);
        assert_eq!(order(&lru), vec!["a", "b"]);
    }

    #[test]
    fn pop_back_drains_oldest_first() {
        let mut lru = LruIndex::new();
        lru.push_front("a");
        lru.push_front("b");
        assert_eq!(lru.pop_back(), Some("a"));
        lru.push_front("c");
        assert_eq!(order(&lru), vec!["c", "b"]);
        assert_eq!(lru.pop_back(), Some("b"));
        assert_eq!(lru.pop_back(), Some("c"));
        assert_eq!(lru.pop_back(), None);
        assert!(lru.is_empty());
    }

    #[test]
    fn remove_from_middle_head_and_tail() {
        let mut lru = LruIndex::new();
        for key in ["a", "b", "c", "d"] {
            lru.push_front(key);
        }
        assert!(lru.remove(&"c"));
        assert_eq!(order(&lru), vec!["d", "b", "a"]);
        assert!(lru.remove(&"d"));
        assert!(lru.remove(&"a"));
        assert_eq!(order(&lru), vec!["b"]);
        assert_eq!(lru.back(), Some(&"b"));
        assert!(!lru.remove(&"a"));
    }

    #[test]
    fn rotate_back_to_front() {
        let mut lru = LruIndex::new();
        lru.push_front("a");
        lru.push_front("b");
        lru.rotate_back_to_front();
        assert_eq!(order(&lru), vec!["a", "b"]);
        lru.clear();
        lru.rotate_back_to_front();
        assert!(lru.back().is_none());
    }
}
