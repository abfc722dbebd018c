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

//! Provides the contracts every GPU-resident resource must fulfil to be cached.
//!
//! This module is the "common language" between the resource cache and the
//! concrete resource kinds (textures, shaders, fonts...). It knows nothing about
//! eviction or budgets; it only describes what a cached item can do.
//!
//! The key components are:
//! - The [`Resource`] trait: footprint, lifecycle and identity queries.
//! - The [`LoadableResource`] trait: the two-phase (CPU decode, GPU upload)
//!   construction used by both the synchronous and the background load paths.
//! - [`ResourceId`] and [`ResourceHandle`], the identifiers and shared handles
//!   handed out by the cache.

mod error;
mod handle;
mod id;

pub use error::*;
pub use handle::*;
pub use id::*;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// The lifecycle state reported by a cached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    /// GPU-side data is resident and [`Resource::gpu_memory_size`] is meaningful.
    Loaded,
    /// The resource is known but its GPU memory has been released.
    Unloaded,
    /// A minimal placeholder handed out when the real resource is unavailable.
    Stub,
    /// Construction was attempted and failed.
    Failed,
}

/// The capability set shared by every cacheable resource.
///
/// Resources are shared between the cache and any caller holding a handle, so
/// all methods take `&self`; implementors keep their mutable state behind
/// atomics or locks.
///
/// The supertraits mirror the asset system's guarantees: a resource can be
/// decoded on the worker thread and handed back to the thread owning the
/// graphics context.
pub trait Resource: Send + Sync + 'static {
    /// The GPU memory held by this resource, in bytes.
    ///
    /// Only meaningful while [`is_loaded`](Resource::is_loaded) returns `true`;
    /// after [`unload`](Resource::unload) it must report `0`.
    fn gpu_memory_size(&self) -> usize;

    /// The canonical path this resource was loaded from.
    fn path(&self) -> &str;

    /// Releases GPU-side data. Calling it on an already unloaded resource is a no-op.
    fn unload(&self) -> bool;

    /// Re-runs construction in place, refreshing GPU-side data.
    fn reload(&self) -> bool;

    /// Whether GPU-side data is currently resident.
    fn is_loaded(&self) -> bool;

    /// The current lifecycle state.
    fn state(&self) -> ResourceState;
}

/// Flags handed to resource constructors by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadContext {
    /// When `false`, constructors must skip any work that needs a graphics
    /// context (headless tools and tests).
    pub gpu_enabled: bool,
}

impl Default for LoadContext {
    fn default() -> Self {
        Self { gpu_enabled: true }
    }
}

/// A [`Resource`] the cache knows how to build from a path.
///
/// Construction is split in two phases so it can straddle the worker thread
/// and the thread that owns the graphics context:
///
/// 1. [`decode`](LoadableResource::decode) does file I/O and CPU-side parsing.
///    It must never touch the GPU.
/// 2. [`upload`](LoadableResource::upload) turns the decoded data into the
///    final resource, creating GPU objects as needed.
///
/// # Examples
///
/// ```
/// use khora_core::resource::{LoadContext, LoadableResource, Resource, ResourceError, ResourceState};
/// use std::path::Path;
///
/// struct Blob {
///     path: String,
///     bytes: usize,
/// }
///
/// impl Resource for Blob {
///     fn gpu_memory_size(&self) -> usize { self.bytes }
///     fn path(&self) -> &str { &self.path }
///     fn unload(&self) -> bool { true }
///     fn reload(&self) -> bool { true }
///     fn is_loaded(&self) -> bool { true }
///     fn state(&self) -> ResourceState { ResourceState::Loaded }
/// }
///
/// impl LoadableResource for Blob {
///     type Decoded = usize;
///
///     fn decode(_path: &Path) -> Result<usize, ResourceError> {
///         Ok(64)
///     }
///
///     fn upload(path: &Path, bytes: usize, _ctx: &LoadContext) -> Result<Self, ResourceError> {
///         Ok(Blob { path: path.display().to_string(), bytes })
///     }
/// }
///
/// let blob = Blob::load(Path::new("/assets/blob.bin"), &LoadContext::default()).unwrap();
/// assert_eq!(blob.gpu_memory_size(), 64);
/// ```
pub trait LoadableResource: Resource + Sized {
    /// The CPU-side product passed from `decode` to `upload`.
    type Decoded: Send + 'static;

    /// Performs the CPU-only part of construction.
    fn decode(path: &Path) -> Result<Self::Decoded, ResourceError>;

    /// Performs the GPU-side part of construction.
    fn upload(path: &Path, decoded: Self::Decoded, ctx: &LoadContext) -> Result<Self, ResourceError>;

    /// Runs both phases back to back on the calling thread.
    fn load(path: &Path, ctx: &LoadContext) -> Result<Self, ResourceError> {
        let decoded = Self::decode(path)?;
        Self::upload(path, decoded, ctx)
    }
}

/// Priority of a background load request.
///
/// Higher variants are dequeued first by the decode worker.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LoadPriority {
    /// Prefetching and other speculative work.
    Low = 0,
    /// Regular requests.
    #[default]
    Normal = 1,
    /// Resources needed for the next frames.
    High = 2,
}
