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

use khora_core::resource::ResourceId;
use std::collections::HashSet;

/// Identifiers exempt from eviction.
///
/// Pinning an id that is not cached is legal; it takes effect once the id is loaded.
#[derive(Debug, Clone, Default)]
pub struct PinSet {
    ids: HashSet<ResourceId>,
}

impl PinSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `id`. Returns `false` if it was already pinned.
    pub fn pin(&mut self, id: ResourceId) -> bool {
        self.ids.insert(id)
    }

    /// Unpins `id`. Returns `false` if it was not pinned.
    pub fn unpin(&mut self, id: ResourceId) -> bool {
        self.ids.remove(&id)
    }

    /// Whether `id` is pinned.
    pub fn is_pinned(&self, id: ResourceId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of pinned ids, cached or not.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing is pinned.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_unpin() {
        let mut pins = PinSet::new();
        let id = ResourceId::from_raw(7);
        assert!(pins.pin(id));
        assert!(!pins.pin(id));
        assert!(pins.is_pinned(id));
        assert_eq!(pins.len(), 1);
        assert!(pins.unpin(id));
        assert!(!pins.unpin(id));
        assert!(pins.is_empty());
    }
}
