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

//! Least-recently-used eviction with pinned entries skipped.

use super::ResourceStore;
use khora_core::resource::ResourceId;

/// A resource dropped by an eviction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedResource {
    /// Id of the dropped entry.
    pub id: ResourceId,
    /// Path reported by the resource, for eviction callbacks and logs.
    pub path: String,
    /// Bytes released.
    pub bytes: usize,
}

/// What an eviction pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Dropped resources, oldest first.
    pub evicted: Vec<EvictedResource>,
    /// Total bytes released.
    pub freed: usize,
    /// Whether the pass stopped with the budget condition still unmet.
    pub exhausted: bool,
}

impl EvictionReport {
    /// Whether nothing was dropped.
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty()
    }

    /// Appends the outcome of a later pass.
    pub fn merge(&mut self, later: EvictionReport) {
        self.evicted.extend(later.evicted);
        self.freed += later.freed;
        self.exhausted = later.exhausted;
    }
}

impl ResourceStore {
    /// Evicts least recently used entries until `required` more bytes fit in the budget.
    ///
    /// Pinned entries are rotated to the front instead of being dropped. The pass
    /// gives up, over budget, once every remaining entry has been skipped in a row.
    /// With `required == 0` it simply brings usage back under the budget.
    pub fn evict_lru(&mut self, required: usize) -> EvictionReport {
        let mut report = EvictionReport::default();
        let mut skipped = 0;

        while self.budget().would_exceed(required) {
            if skipped >= self.lru.len() {
                report.exhausted = true;
                break;
            }
            let Some(&id) = self.lru.back() else {
                report.exhausted = true;
                break;
            };

            if self.pins().is_pinned(id) {
                self.lru.rotate_back_to_front();
                skipped += 1;
                continue;
            }

            match self.remove(id) {
                Some((entry, bytes)) => {
                    let path = entry.resource().path().to_string();
                    log::debug!("ResourceStore: evicted '{}' ({} bytes)", path, bytes);
                    report.freed += bytes;
                    report.evicted.push(EvictedResource { id, path, bytes });
                    skipped = 0;
                }
                None => {
                    // Recency index out of sync with the map; drop the stray id.
                    log::error!("ResourceStore: LRU entry {} has no cached resource", id);
                    self.lru.remove(&id);
                }
            }
        }

        if report.exhausted {
            log::warn!(
                "ResourceStore: eviction could not free enough memory ({} / {} bytes, {} more required)",
                self.budget().current(),
                self.budget().max(),
                required
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::super::store::tests::{id, Block};
    use super::super::{CachedResource, ResourceStore};
    use std::sync::atomic::Ordering;

    fn store_with(budget: usize, keys: &[&str], unit: usize) -> ResourceStore {
        let mut store = ResourceStore::new(budget);
        for key in keys {
            store.insert(id(key), CachedResource::new(Block::new(key, unit)));
        }
        store
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let mut store = store_with(20, &["a", "b"], 10);
        let report = store.evict_lru(10);
        assert_eq!(report.evicted.len(), 1);
        assert_eq!(report.evicted[0].path, "a");
        assert_eq!(report.freed, 10);
        assert!(!store.contains(id("a")));
        assert!(store.contains(id("b")));
        assert_eq!(store.budget().current(), 10);
    }

    #[test]
    fn touched_entries_survive() {
        let mut store = store_with(30, &["a", "b", "c"], 10);
        store.get(id("a"));
        let report = store.evict_lru(10);
        assert_eq!(report.evicted[0].path, "b");
        assert!(store.contains(id("a")));
    }

    #[test]
    fn pinned_entries_are_skipped() {
        let mut store = store_with(20, &["a", "b"], 10);
        store.pin(id("a"));
        let report = store.evict_lru(10);
        assert_eq!(report.evicted.len(), 1);
        assert_eq!(report.evicted[0].path, "b");
        assert!(store.contains(id("a")));
    }

    #[test]
    fn all_pinned_stops_over_budget() {
        let mut store = store_with(10, &["a", "b"], 10);
        store.pin(id("a"));
        store.pin(id("b"));
        let report = store.evict_lru(0);
        assert!(report.is_empty());
        assert!(report.exhausted);
        assert_eq!(store.len(), 2);
        assert_eq!(store.budget().current(), 20);
    }

    #[test]
    fn zero_requirement_only_restores_the_budget() {
        let mut store = store_with(25, &["a", "b", "c"], 10);
        let report = store.evict_lru(0);
        assert_eq!(report.evicted.len(), 1);
        assert_eq!(store.budget().current(), 20);
    }

    #[test]
    fn evicted_resources_are_unloaded() {
        let mut store = ResourceStore::new(10);
        let block = Block::new("a", 10);
        store.insert(id("a"), CachedResource::new(block.clone()));
        store.evict_lru(5);
        assert_eq!(block.unloads.load(Ordering::SeqCst), 1);
        assert_eq!(store.recency().count(), 0);
    }

    #[test]
    fn empty_store_is_exhausted_when_requirement_exceeds_budget() {
        let mut store = ResourceStore::new(10);
        let report = store.evict_lru(11);
        assert!(report.exhausted);
        assert!(report.is_empty());
    }
}
