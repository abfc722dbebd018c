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

//! Per-kind policy hooks: size estimators and stub factories.
//!
//! The cache is generic over [`Resource`], but two decisions depend on the
//! concrete kind: how much GPU memory a load is expected to take (so eviction
//! can run *before* construction), and what placeholder to hand out when a
//! load fails. Each kind describes both in a [`ResourceKind`], either submitted
//! from its own module through `inventory` or registered at runtime.
//!
//! ```ignore
//! inventory::submit! {
//!     ResourceKind::of::<Texture>("Texture")
//!         .with_estimate(texture_estimate)
//!         .with_stub(texture_stub)
//! }
//! ```

use khora_core::resource::Resource;
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    path::Path,
    sync::Arc,
};

/// Estimate used for kinds that do not provide their own: 1 MiB.
pub const DEFAULT_ESTIMATE_BYTES: usize = 1024 * 1024;

/// A 2048x2048 RGBA8 texture with its full mip chain (~21.3 MiB).
pub const TEXTURE_ESTIMATE_BYTES: usize = 2048 * 2048 * 4 * 4 / 3;

/// Builds the shared placeholder of a kind.
pub type StubFactory = fn() -> Arc<dyn Any + Send + Sync>;

/// The flat default estimator.
pub fn default_estimate(_path: &Path) -> usize {
    DEFAULT_ESTIMATE_BYTES
}

/// A conservative estimator for textures whose resolution is unknown before decode.
pub fn texture_estimate(_path: &Path) -> usize {
    TEXTURE_ESTIMATE_BYTES
}

/// Policy hooks of one resource kind.
#[derive(Clone, Copy)]
pub struct ResourceKind {
    /// Human readable kind name, used in logs.
    pub name: &'static str,
    /// Returns the [`TypeId`] of the resource type this kind describes.
    pub type_id: fn() -> TypeId,
    /// Estimates the GPU footprint of the resource at a path, before construction.
    pub estimate: fn(&Path) -> usize,
    /// Builds the placeholder handed out on failure. Kinds without one yield absent handles.
    pub stub: Option<StubFactory>,
}

impl ResourceKind {
    /// Describes `T` with the default estimator and no stub.
    pub const fn of<T: Resource>(name: &'static str) -> Self {
        Self {
            name,
            type_id: TypeId::of::<T>,
            estimate: default_estimate,
            stub: None,
        }
    }

    /// Replaces the estimator.
    pub const fn with_estimate(mut self, estimate: fn(&Path) -> usize) -> Self {
        self.estimate = estimate;
        self
    }

    /// Sets the stub factory. It must return an `Arc` of the kind's own type.
    pub const fn with_stub(mut self, stub: StubFactory) -> Self {
        self.stub = Some(stub);
        self
    }
}

impl std::fmt::Debug for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceKind")
            .field("name", &self.name)
            .field("has_stub", &self.stub.is_some())
            .finish()
    }
}

inventory::collect!(ResourceKind);

/// Lookup table from resource type to its [`ResourceKind`].
pub struct ResourceKindRegistry {
    kinds: HashMap<TypeId, ResourceKind>,
    stubs: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Default for ResourceKindRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceKindRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            kinds: HashMap::new(),
            stubs: HashMap::new(),
        }
    }

    /// Creates a registry holding every kind submitted through `inventory`.
    pub fn with_submitted() -> Self {
        let mut registry = Self::new();
        for kind in inventory::iter::<ResourceKind> {
            registry.register(*kind);
        }
        registry
    }

    /// Registers `kind`, replacing (and returning) any kind already registered for the same type.
    pub fn register(&mut self, kind: ResourceKind) -> Option<ResourceKind> {
        let type_id = (kind.type_id)();
        self.stubs.remove(&type_id);
        let previous = self.kinds.insert(type_id, kind);
        match &previous {
            Some(old) => log::debug!(
                "ResourceKindRegistry: kind '{}' replaced by '{}'",
                old.name,
                kind.name
            ),
            None => log::debug!("ResourceKindRegistry: registered kind '{}'", kind.name),
        }
        previous
    }

    /// The kind registered for `T`, if any.
    pub fn kind_of<T: Resource>(&self) -> Option<&ResourceKind> {
        self.kinds.get(&TypeId::of::<T>())
    }

    /// Display name for `T`: the registered kind name, or the Rust type name.
    pub fn name_of<T: Resource>(&self) -> &'static str {
        self.kind_of::<T>()
            .map(|kind| kind.name)
            .unwrap_or_else(std::any::type_name::<T>)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether no kind is registered.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Estimated GPU footprint of loading `path` as a `T`.
    pub fn estimate<T: Resource>(&self, path: &Path) -> usize {
        match self.kind_of::<T>() {
            Some(kind) => (kind.estimate)(path),
            None => DEFAULT_ESTIMATE_BYTES,
        }
    }

    /// The shared placeholder for `T`, created on first use.
    ///
    /// Returns `None` if `T` has no stub factory, or if the factory builds a
    /// value of another type.
    pub fn stub<T: Resource>(&mut self) -> Option<Arc<T>> {
        let type_id = TypeId::of::<T>();
        if let Some(stub) = self.stubs.get(&type_id) {
            return stub.clone().downcast::<T>().ok();
        }

        let kind = self.kinds.get(&type_id)?;
        let factory = kind.stub?;
        let stub = factory();
        match stub.clone().downcast::<T>() {
            Ok(typed) => {
                self.stubs.insert(type_id, stub);
                Some(typed)
            }
            Err(_) => {
                log::error!(
                    "ResourceKindRegistry: stub factory of '{}' does not build a `{}`",
                    kind.name,
                    std::any::type_name::<T>()
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for ResourceKindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.kinds.values().map(|kind| kind.name).collect();
        names.sort_unstable();
        f.debug_struct("ResourceKindRegistry")
            .field("kinds", &names)
            .field("stubs", &self.stubs.len())
            .finish()
    }
}
