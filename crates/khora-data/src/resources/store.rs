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

//! The cache store: the single source of truth for which resources are resident.

use super::{GpuBudget, LruIndex, PinSet};
use khora_core::resource::{Resource, ResourceId};
use std::{any::Any, collections::HashMap, sync::Arc};

/// A type-erased cache entry.
///
/// The same allocation is kept twice: as a [`Resource`] trait object for the
/// cache's own bookkeeping, and as [`Any`] so typed handles can be recovered.
#[derive(Clone)]
pub struct CachedResource {
    resource: Arc<dyn Resource>,
    typed: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl CachedResource {
    /// Wraps a freshly constructed resource.
    pub fn new<T: Resource>(resource: Arc<T>) -> Self {
        let typed: Arc<dyn Any + Send + Sync> = resource.clone();
        Self {
            resource,
            typed,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The resource, viewed through its contract.
    pub fn resource(&self) -> &Arc<dyn Resource> {
        &self.resource
    }

    /// The Rust type name of the entry.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recovers the concrete resource, or `None` if it is not a `T`.
    pub fn downcast<T: Resource>(&self) -> Option<Arc<T>> {
        self.typed.clone().downcast::<T>().ok()
    }

    /// Bytes the entry currently holds on the GPU; zero once unloaded.
    pub fn resident_bytes(&self) -> usize {
        if self.resource.is_loaded() {
            self.resource.gpu_memory_size()
        } else {
            0
        }
    }
}

impl std::fmt::Debug for CachedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedResource")
            .field("path", &self.resource.path())
            .field("type", &self.type_name)
            .field("state", &self.resource.state())
            .finish()
    }
}

/// Footprints observed around an in-place reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// Whether the resource reported a successful reload.
    pub success: bool,
    /// Bytes held before the reload.
    pub old_bytes: usize,
    /// Bytes held after the reload.
    pub new_bytes: usize,
}

impl ReloadOutcome {
    /// Signed change in footprint.
    pub fn delta(&self) -> isize {
        self.new_bytes as isize - self.old_bytes as isize
    }
}

/// Resident resources with their recency order, pins and GPU budget.
///
/// An id is in the recency index if and only if it is a key of the map. The
/// store never evicts on its own; see [`ResourceStore::evict_lru`].
#[derive(Debug)]
pub struct ResourceStore {
    entries: HashMap<ResourceId, CachedResource>,
    pub(super) lru: LruIndex<ResourceId>,
    pins: PinSet,
    budget: GpuBudget,
}

impl ResourceStore {
    /// Creates an empty store with a budget of `max_gpu_memory` bytes.
    pub fn new(max_gpu_memory: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruIndex::new(),
            pins: PinSet::new(),
            budget: GpuBudget::new(max_gpu_memory),
        }
    }

    /// The GPU budget.
    pub fn budget(&self) -> &GpuBudget {
        &self.budget
    }

    /// Replaces the budget without evicting.
    pub fn set_max_gpu_memory(&mut self, max: usize) {
        self.budget.set_max(max);
    }

    /// The pinned ids.
    pub fn pins(&self) -> &PinSet {
        &self.pins
    }

    /// Exempts `id` from eviction.
    pub fn pin(&mut self, id: ResourceId) -> bool {
        self.pins.pin(id)
    }

    /// Makes `id` evictable again.
    pub fn unpin(&mut self, id: ResourceId) -> bool {
        self.pins.unpin(id)
    }

    /// Number of cached entries, loaded or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is cached. Does not affect recency.
    pub fn contains(&self, id: ResourceId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Returns the entry for `id` and marks it as most recently used.
    pub fn get(&mut self, id: ResourceId) -> Option<&CachedResource> {
        let entry = self.entries.get(&id)?;
        self.lru.touch(&id);
        Some(entry)
    }

    /// Returns the entry for `id` without affecting recency.
    pub fn peek(&self, id: ResourceId) -> Option<&CachedResource> {
        self.entries.get(&id)
    }

    /// Iterates over all entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &CachedResource)> {
        self.entries.iter()
    }

    /// Ids from the most to the least recently used.
    pub fn recency(&self) -> impl Iterator<Item = &ResourceId> + '_ {
        self.lru.iter()
    }

    /// Number of cached entries that are pinned.
    pub fn pinned_count(&self) -> usize {
        self.entries
            .keys()
            .filter(|id| self.pins.is_pinned(**id))
            .count()
    }

    /// Inserts `entry` as the most recently used one and charges its actual footprint.
    ///
    /// An entry already stored under `id` is unloaded, uncharged and returned.
    pub fn insert(&mut self, id: ResourceId, entry: CachedResource) -> Option<CachedResource> {
        let bytes = entry.resident_bytes();
        let replaced = self.entries.insert(id, entry);
        if let Some(old) = &replaced {
            log::debug!(
                "ResourceStore: replacing cached entry for '{}'",
                old.resource().path()
            );
            self.budget.release(old.resident_bytes());
            old.resource().unload();
        }
        self.lru.push_front(id);
        self.budget.charge(bytes);
        replaced
    }

    /// Unloads the resource behind `id` but keeps its entry.
    ///
    /// Returns the bytes released, or `None` if `id` is not cached. Unloading an
    /// already unloaded entry releases nothing.
    pub fn unload(&mut self, id: ResourceId) -> Option<usize> {
        let entry = self.entries.get(&id)?;
        let bytes = entry.resident_bytes();
        entry.resource().unload();
        self.budget.release(bytes);
        Some(bytes)
    }

    /// Reloads the resource behind `id` in place and applies the footprint delta.
    pub fn reload(&mut self, id: ResourceId) -> Option<ReloadOutcome> {
        let entry = self.entries.get(&id)?;
        let old_bytes = entry.resident_bytes();
        let success = entry.resource().reload();
        let new_bytes = entry.resident_bytes();
        self.budget.apply_resize(old_bytes, new_bytes);
        Some(ReloadOutcome {
            success,
            old_bytes,
            new_bytes,
        })
    }

    /// Removes `id` entirely, unloading it. Returns the removed entry and the bytes freed.
    pub fn remove(&mut self, id: ResourceId) -> Option<(CachedResource, usize)> {
        let entry = self.entries.remove(&id)?;
        self.lru.remove(&id);
        let bytes = entry.resident_bytes();
        entry.resource().unload();
        self.budget.release(bytes);
        Some((entry, bytes))
    }

    /// Unloads and forgets every entry and resets the usage to zero.
    ///
    /// Pins survive. Returns the number of entries dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        for entry in self.entries.values() {
            entry.resource().unload();
        }
        self.entries.clear();
        self.lru.clear();
        self.budget.reset();
        count
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use khora_core::resource::ResourceState;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    pub(crate) struct Block {
        path: String,
        bytes: AtomicUsize,
        reload_bytes: AtomicUsize,
        loaded: AtomicBool,
        pub(crate) unloads: AtomicUsize,
    }

    impl Block {
        pub(crate) fn new(path: &str, bytes: usize) -> Arc<Self> {
            Arc::new(Self {
                path: path.to_string(),
                bytes: AtomicUsize::new(bytes),
                reload_bytes: AtomicUsize::new(bytes),
                loaded: AtomicBool::new(true),
                unloads: AtomicUsize::new(0),
            })
        }

        pub(crate) fn reload_to(&self, bytes: usize) {
            self.reload_bytes.store(bytes, Ordering::SeqCst);
        }
    }

    impl Resource for Block {
        fn gpu_memory_size(&self) -> usize {
            if self.loaded.load(Ordering::SeqCst) {
                self.bytes.load(Ordering::SeqCst)
            } else {
                0
            }
        }
        fn path(&self) -> &str {
            &self.path
        }
        fn unload(&self) -> bool {
            self.unloads.fetch_add(1, Ordering::SeqCst);
            self.loaded.store(false, Ordering::SeqCst);
            true
        }
        fn reload(&self) -> bool {
            self.bytes
                .store(self.reload_bytes.load(Ordering::SeqCst), Ordering::SeqCst);
            self.loaded.store(true, Ordering::SeqCst);
            true
        }
        fn is_loaded(&self) -> bool {
            self.loaded.load(Ordering::SeqCst)
        }
        fn state(&self) -> ResourceState {
            if self.is_loaded() {
                ResourceState::Loaded
            } else {
                ResourceState::Unloaded
            }
        }
    }

    pub(crate) fn id(key: &str) -> ResourceId {
        ResourceId::from_key(key)
    }

    #[test]
    fn insert_charges_actual_size() {
        let mut store = ResourceStore::new(100);
        store.insert(id("a"), CachedResource::new(Block::new("a", 30)));
        assert_eq!(store.budget().current(), 30);
        assert!(store.contains(id("a")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_touches_peek_does_not() {
        let mut store = ResourceStore::new(100);
        store.insert(id("a"), CachedResource::new(Block::new("a", 1)));
        store.insert(id("b"), CachedResource::new(Block::new("b", 1)));
        store.peek(id("a"));
        assert_eq!(store.recency().next(), Some(&id("b")));
        store.get(id("a"));
        assert_eq!(store.recency().next(), Some(&id("a")));
    }

    #[test]
    fn downcast_recovers_the_concrete_type() {
        let block = Block::new("a", 1);
        let entry = CachedResource::new(block.clone());
        let recovered = entry.downcast::<Block>().unwrap();
        assert!(Arc::ptr_eq(&block, &recovered));
        assert!(entry.type_name().ends_with("Block"));
    }

    #[test]
    fn unload_is_idempotent_and_keeps_entry() {
        let mut store = ResourceStore::new(100);
        store.insert(id("a"), CachedResource::new(Block::new("a", 40)));
        assert_eq!(store.unload(id("a")), Some(40));
        assert_eq!(store.budget().current(), 0);
        assert_eq!(store.unload(id("a")), Some(0));
        assert_eq!(store.budget().current(), 0);
        assert!(store.contains(id("a")));
        assert_eq!(store.unload(id("missing")), None);
    }

    #[test]
    fn reload_applies_delta() {
        const MB: usize = 1024 * 1024;
        let mut store = ResourceStore::new(100 * MB);
        let block = Block::new("a", 10 * MB);
        store.insert(id("a"), CachedResource::new(block.clone()));

        block.reload_to(4 * MB);
        let outcome = store.reload(id("a")).unwrap();
        assert_eq!(outcome.delta(), -(6 * MB as isize));
        assert_eq!(store.budget().current(), 4 * MB);

        block.reload_to(12 * MB);
        let outcome = store.reload(id("a")).unwrap();
        assert_eq!(outcome.delta(), 8 * MB as isize);
        assert_eq!(store.budget().current(), 12 * MB);
    }

    #[test]
    fn replacing_an_entry_releases_the_old_charge() {
        let mut store = ResourceStore::new(100);
        let first = Block::new("a", 30);
        store.insert(id("a"), CachedResource::new(first.clone()));
        let replaced = store.insert(id("a"), CachedResource::new(Block::new("a", 20)));
        assert!(replaced.is_some());
        assert_eq!(first.unloads.load(Ordering::SeqCst), 1);
        assert_eq!(store.budget().current(), 20);
        assert_eq!(store.recency().count(), 1);
    }

    #[test]
    fn clear_keeps_pins() {
        let mut store = ResourceStore::new(100);
        let block = Block::new("a", 10);
        store.insert(id("a"), CachedResource::new(block.clone()));
        store.pin(id("a"));
        assert_eq!(store.clear(), 1);
        assert!(store.is_empty());
        assert_eq!(store.budget().current(), 0);
        assert_eq!(store.recency().count(), 0);
        assert!(store.pins().is_pinned(id("a")));
        assert!(!block.is_loaded());
    }
}
