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

//! The GPU resource cache.
//!
//! [`ResourceCache`] keeps GPU-resident resources under a memory budget. It
//! serves repeated loads from memory, evicts the least recently used resources
//! when the budget is exceeded (skipping pinned ones), and moves the CPU-side
//! half of loads onto a background worker.
//!
//! Typical frame loop:
//!
//! ```no_run
//! # use khora_io::resource::{ResourceCache, ResourceCacheConfig};
//! # fn frame(cache: &ResourceCache) {
//! // Complete the background loads decoded since last frame.
//! cache.process_async_uploads();
//! # }
//! ```

mod cache;
mod config;
mod pending;
mod pipeline;
mod registry;
mod stats;
mod watcher;

pub use cache::{EvictionCallback, ResourceCache};
pub use config::{
    ConfigError, ResourceCacheConfig, ENV_ASSETS_DIR, ENV_BUDGET_MB, ENV_GPU_LOADING,
};
pub use pending::{LoadResult, PendingResource};
pub use registry::{
    default_estimate, texture_estimate, ResourceKind, ResourceKindRegistry, StubFactory,
    DEFAULT_ESTIMATE_BYTES, TEXTURE_ESTIMATE_BYTES,
};
pub use stats::CacheStats;
pub use watcher::ResourceWatcher;

pub use khora_core::resource::{
    LoadContext, LoadPriority, LoadableResource, Resource, ResourceError, ResourceHandle,
    ResourceId, ResourceState,
};
pub use khora_data::resources::MemoryPressure;
