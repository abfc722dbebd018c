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

use super::{Resource, ResourceState};
use std::{fmt, sync::Arc};

/// A thread-safe, reference-counted handle to a cached resource.
///
/// The cache and every caller holding a handle share ownership of the resource.
/// Eviction drops the cache's reference and unloads the resource, but handles
/// that already escaped stay valid: they simply observe an unloaded resource.
///
/// Kinds without a stub representation yield an *absent* handle when loading
/// fails, so callers must check [`get`](ResourceHandle::get) before use.
pub struct ResourceHandle<T: Resource>(Option<Arc<T>>);

impl<T: Resource> ResourceHandle<T> {
    /// Creates a handle sharing ownership of `resource`.
    pub fn new(resource: Arc<T>) -> Self {
        Self(Some(resource))
    }

    /// Creates a handle that points to nothing.
    pub fn absent() -> Self {
        Self(None)
    }

    /// Returns the resource, or `None` for an absent handle.
    pub fn get(&self) -> Option<&T> {
        self.0.as_deref()
    }

    /// Returns the shared pointer, or `None` for an absent handle.
    pub fn arc(&self) -> Option<&Arc<T>> {
        self.0.as_ref()
    }

    /// Consumes the handle, returning the shared pointer.
    pub fn into_arc(self) -> Option<Arc<T>> {
        self.0
    }

    /// Returns `true` if the handle points to nothing.
    pub fn is_absent(&self) -> bool {
        self.0.is_none()
    }

    /// Returns `true` if the handle points to a stub placeholder.
    pub fn is_stub(&self) -> bool {
        self.get()
            .is_some_and(|resource| resource.state() == ResourceState::Stub)
    }

    /// Returns `true` if the handle points to a resource with resident GPU data.
    pub fn is_loaded(&self) -> bool {
        self.get().is_some_and(Resource::is_loaded)
    }

    /// Returns `true` if both handles point to the same allocation (or are both absent).
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Resource> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Resource> Default for ResourceHandle<T> {
    fn default() -> Self {
        Self::absent()
    }
}

impl<T: Resource> From<Arc<T>> for ResourceHandle<T> {
    fn from(resource: Arc<T>) -> Self {
        Self::new(resource)
    }
}

impl<T: Resource> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(resource) => f
                .debug_struct("ResourceHandle")
                .field("path", &resource.path())
                .field("state", &resource.state())
                .finish(),
            None => f.write_str("ResourceHandle(absent)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Placeholder;

    impl Resource for Placeholder {
        fn gpu_memory_size(&self) -> usize {
            0
        }
        fn path(&self) -> &str {
            "placeholder"
        }
        fn unload(&self) -> bool {
            true
        }
        fn reload(&self) -> bool {
            true
        }
        fn is_loaded(&self) -> bool {
            true
        }
        fn state(&self) -> ResourceState {
            ResourceState::Stub
        }
    }

    #[test]
    fn absent_handle() {
        let handle = ResourceHandle::<Placeholder>::absent();
        assert!(handle.is_absent());
        assert!(!handle.is_stub());
        assert!(!handle.is_loaded());
        assert_eq!(format!("{handle:?}"), "ResourceHandle(absent)");
    }

    #[test]
    fn clones_share_the_allocation() {
        let handle = ResourceHandle::new(Arc::new(Placeholder));
        let other = handle.clone();
        assert!(handle.ptr_eq(&other));
        assert!(handle.is_stub());
        assert!(!handle.ptr_eq(&ResourceHandle::absent()));
    }
}
