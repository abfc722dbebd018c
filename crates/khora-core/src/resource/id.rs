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

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A stable, deterministic identifier for a cached resource.
///
/// The id is derived from the cache-relative key of a resource (see
/// [`relative_key`](crate::vfs::relative_key)) with a name-based (version 5)
/// UUID folded down to 64 bits. Two paths that normalize to the same key always
/// map to the same id, across runs and across processes.
///
/// Collisions share a cache slot; 64 bits keep them practically negligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Derives the id of a cache-relative key.
    pub fn from_key(key: &str) -> Self {
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes());
        let (high, low) = uuid.as_u64_pair();
        Self(high ^ low)
    }

    /// Wraps a raw value. Mostly useful in tests.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
