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

//! The resource cache facade.

use super::{
    config::ResourceCacheConfig,
    pending::{pending, LoadResult, PendingResource},
    pipeline::{panic_message, AsyncPipeline, DecodeFn, UploadFn},
    registry::{ResourceKind, ResourceKindRegistry},
    stats::{CacheCounters, CacheStats},
};
use khora_core::{
    resource::{
        LoadContext, LoadPriority, LoadableResource, Resource, ResourceError, ResourceHandle,
        ResourceId,
    },
    vfs,
};
use khora_data::resources::{CachedResource, EvictionReport, ResourceStore};
use std::{
    io,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
    },
};

const MB: f64 = 1024.0 * 1024.0;

/// Called with the path of every resource evicted by budget pressure.
pub type EvictionCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// A path resolved to its cache identity.
struct Resolved {
    canonical: PathBuf,
    key: String,
    id: ResourceId,
}

/// Output of a background decode, tagged with the file it was read from.
struct Prepared<D> {
    decoded_from: PathBuf,
    result: Result<D, ResourceError>,
}

/// Everything guarded by the cache lock.
struct CacheState {
    store: ResourceStore,
    registry: ResourceKindRegistry,
    counters: CacheCounters,
}

impl CacheState {
    fn evict(&mut self, required: usize) -> EvictionReport {
        let report = self.store.evict_lru(required);
        self.counters.evictions += report.evicted.len() as u64;
        report
    }
}

/// The state shared by the facade and the upload closures.
pub(crate) struct CacheCore {
    state: Mutex<CacheState>,
    // Kept out of `state` so resolving a path never waits on a load in progress.
    base_dir: RwLock<Option<PathBuf>>,
    gpu_loading: AtomicBool,
    on_evict: Mutex<Option<EvictionCallback>>,
}

impl CacheCore {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn base_dir(&self) -> Option<PathBuf> {
        self.base_dir
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn resolve(&self, path: &Path) -> Option<Resolved> {
        let base_dir = self.base_dir.read().unwrap_or_else(PoisonError::into_inner);
        let canonical = vfs::normalize_path(path, base_dir.as_deref())?;
        let key = vfs::relative_key(&canonical, base_dir.as_deref());
        let id = ResourceId::from_key(&key);
        Some(Resolved { canonical, key, id })
    }

    fn context(&self) -> LoadContext {
        LoadContext {
            gpu_enabled: self.gpu_loading.load(Ordering::Acquire),
        }
    }

    /// The synchronous load path.
    ///
    /// `prepared` carries the output of a decode already run on the worker; when
    /// absent, or decoded from another file than `path` now resolves to, both
    /// phases run here.
    fn load_inner<T: LoadableResource>(
        &self,
        path: &Path,
        prepared: Option<Prepared<T::Decoded>>,
    ) -> Result<Arc<T>, ResourceError> {
        let resolved = self.resolve(path);
        let mut state = self.lock();

        let Some(Resolved { canonical, key, id }) = resolved else {
            state.counters.load_failures += 1;
            log::error!("ResourceCache: invalid or unsafe path '{}'", path.display());
            return Err(ResourceError::InvalidPath(path.display().to_string()));
        };

        if let Some(entry) = state.store.get(id) {
            return match entry.downcast::<T>() {
                Some(resource) => {
                    let cold = !resource.is_loaded();
                    state.counters.hits += 1;
                    if cold {
                        state.counters.cold_hits += 1;
                        log::debug!("ResourceCache: cold hit for '{}' (unloaded)", key);
                    } else {
                        log::debug!("ResourceCache: cache hit for '{}'", key);
                    }
                    Ok(resource)
                }
                None => {
                    let cached = entry.type_name();
                    state.counters.load_failures += 1;
                    log::error!(
                        "ResourceCache: '{}' is cached as `{}`, cannot load it as `{}`",
                        key,
                        cached,
                        std::any::type_name::<T>()
                    );
                    Err(ResourceError::TypeMismatch {
                        path: key,
                        cached,
                        requested: std::any::type_name::<T>(),
                    })
                }
            };
        }
        state.counters.misses += 1;

        let estimate = state.registry.estimate::<T>(&canonical);
        let mut report = EvictionReport::default();
        if state.store.budget().would_exceed(estimate) {
            log::warn!(
                "ResourceCache: GPU memory budget exceeded, evicting LRU resources for '{}' (~{:.2}MB)",
                key,
                estimate as f64 / MB
            );
            report = state.evict(estimate);
        }

        log::info!("ResourceCache: loading {} '{}'", state.registry.name_of::<T>(), key);
        let ctx = self.context();
        let built = match prepared {
            Some(Prepared {
                decoded_from,
                result,
            }) if decoded_from == canonical => {
                result.and_then(|decoded| T::upload(&canonical, decoded, &ctx))
            }
            Some(Prepared { decoded_from, .. }) => {
                log::debug!(
                    "ResourceCache: '{}' was decoded from '{}', now resolves to '{}', loading again",
                    key,
                    decoded_from.display(),
                    canonical.display()
                );
                T::load(&canonical, &ctx)
            }
            None => T::load(&canonical, &ctx),
        };

        let result = match built {
            Ok(resource) => {
                let resource = Arc::new(resource);
                state
                    .store
                    .insert(id, CachedResource::new(Arc::clone(&resource)));

                if state.store.budget().is_over() {
                    log::warn!(
                        "ResourceCache: post-load budget exceeded ({:.2}MB > {:.2}MB), evicting...",
                        state.store.budget().current() as f64 / MB,
                        state.store.budget().max() as f64 / MB
                    );
                    report.merge(state.evict(0));
                }

                log::trace!(
                    "ResourceCache: loaded '{}', GPU usage: {:.2}MB / {:.2}MB",
                    key,
                    state.store.budget().current() as f64 / MB,
                    state.store.budget().max() as f64 / MB
                );
                Ok(resource)
            }
            Err(error) => {
                state.counters.load_failures += 1;
                log::error!("ResourceCache: failed to load '{}': {}", key, error);
                Err(error)
            }
        };

        drop(state);
        self.notify_evicted(&report);
        result
    }

    /// Loads `path`, falling back to the kind's stub (or an absent handle) on failure.
    fn load_or_stub<T: LoadableResource>(
        &self,
        path: &Path,
        prepared: Option<Prepared<T::Decoded>>,
    ) -> ResourceHandle<T> {
        match self.load_inner::<T>(path, prepared) {
            Ok(resource) => ResourceHandle::new(resource),
            Err(_) => self.fallback::<T>(),
        }
    }

    fn fallback<T: LoadableResource>(&self) -> ResourceHandle<T> {
        match self.lock().registry.stub::<T>() {
            Some(stub) => ResourceHandle::new(stub),
            None => ResourceHandle::absent(),
        }
    }

    /// Runs the upload half of an asynchronous load.
    fn complete_async<T: LoadableResource>(
        &self,
        path: &Path,
        prepared: Option<Prepared<T::Decoded>>,
    ) -> LoadResult<T> {
        panic::catch_unwind(AssertUnwindSafe(|| self.load_or_stub::<T>(path, prepared))).map_err(
            |payload| {
                let message = panic_message(payload.as_ref());
                log::error!(
                    "ResourceCache: async upload of '{}' panicked: {}",
                    path.display(),
                    message
                );
                ResourceError::Panicked {
                    path: path.display().to_string(),
                    message,
                }
            },
        )
    }

    /// Reports evictions to the registered callback. Must run without the cache lock held.
    fn notify_evicted(&self, report: &EvictionReport) {
        if report.is_empty() {
            return;
        }
        let callback = self
            .on_evict
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for evicted in &report.evicted {
            log::debug!(
                "ResourceCache: evicted '{}' ({:.2}MB)",
                evicted.path,
                evicted.bytes as f64 / MB
            );
            if let Some(callback) = &callback {
                callback(&evicted.path);
            }
        }
    }
}

/// A memory-bounded cache of GPU resources with LRU eviction and background loading.
///
/// The cache is an explicit context object: build one at startup and share it
/// (by reference or `Arc`) with every system that loads resources.
///
/// # Threading
///
/// Every synchronous operation takes the cache lock for its whole duration,
/// construction and eviction included. [`load_async`](Self::load_async) only
/// enqueues: a dedicated worker thread runs the CPU-side decode, and the GPU
/// upload happens when the thread owning the graphics context calls
/// [`process_async_uploads`](Self::process_async_uploads), once per frame.
///
/// # Failure handling
///
/// Loads never fail loudly. An invalid path or a failed construction yields the
/// kind's stub, or an absent handle for kinds without one, and leaves the cache
/// untouched. [`try_load`](Self::try_load) exposes the underlying error instead.
pub struct ResourceCache {
    core: CacheCore,
    pipeline: AsyncPipeline,
    max_uploads_per_frame: Option<usize>,
}

impl ResourceCache {
    /// Creates a cache and starts its decode worker.
    ///
    /// Kinds submitted through `inventory` are registered automatically.
    ///
    /// # Errors
    /// Returns an error if the worker thread cannot be spawned.
    pub fn new(config: ResourceCacheConfig) -> io::Result<Self> {
        let base_dir = config
            .base_assets_dir
            .as_deref()
            .and_then(|dir| vfs::normalize_path(dir, None));
        let registry = ResourceKindRegistry::with_submitted();

        log::info!(
            "ResourceCache: created with a {:.2}MB GPU budget, {} registered kind(s)",
            config.max_gpu_memory as f64 / MB,
            registry.len()
        );

        let pipeline = AsyncPipeline::spawn(&config.worker_thread_name)?;
        Ok(Self {
            core: CacheCore {
                state: Mutex::new(CacheState {
                    store: ResourceStore::new(config.max_gpu_memory),
                    registry,
                    counters: CacheCounters::default(),
                }),
                base_dir: RwLock::new(base_dir),
                gpu_loading: AtomicBool::new(config.gpu_loading_enabled),
                on_evict: Mutex::new(None),
            },
            pipeline,
            max_uploads_per_frame: config.max_uploads_per_frame,
        })
    }

    /// Loads `path` as a `T`, serving it from the cache when possible.
    ///
    /// On a miss the GPU footprint is estimated first and least recently used
    /// resources are evicted to make room; the actual footprint is charged once
    /// the resource is built, evicting again if the estimate was too low.
    pub fn load<T: LoadableResource>(&self, path: impl AsRef<Path>) -> ResourceHandle<T> {
        self.core.load_or_stub::<T>(path.as_ref(), None)
    }

    /// Like [`load`](Self::load), but reports failures instead of falling back to a stub.
    pub fn try_load<T: LoadableResource>(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<ResourceHandle<T>, ResourceError> {
        self.core
            .load_inner::<T>(path.as_ref(), None)
            .map(ResourceHandle::new)
    }

    /// Queues a background load and returns immediately.
    ///
    /// The decode runs on the worker thread; the resource is built and cached by
    /// a later [`process_async_uploads`](Self::process_async_uploads) call, which
    /// also resolves the returned future. Never waits on the cache lock, so a
    /// synchronous load running on another thread does not delay it.
    pub fn load_async<T: LoadableResource>(
        &self,
        path: impl AsRef<Path>,
        priority: LoadPriority,
    ) -> PendingResource<T> {
        let raw = path.as_ref().to_path_buf();
        let label = raw.display().to_string();
        let canonical = self.core.resolve(&raw).map(|r| r.canonical);
        let (promise, future) = pending::<T>(label.clone());

        let decode: DecodeFn = Box::new(move || -> UploadFn {
            let prepared = canonical.map(|canonical| {
                panic::catch_unwind(AssertUnwindSafe(|| T::decode(&canonical)))
                    .map(|result| Prepared {
                        decoded_from: canonical,
                        result,
                    })
                    .map_err(|payload| panic_message(payload.as_ref()))
            });

            Box::new(move |core: &CacheCore| {
                let result = match prepared {
                    Some(Err(message)) => {
                        log::error!(
                            "ResourceCache: async decode of '{}' panicked: {}",
                            raw.display(),
                            message
                        );
                        Err(ResourceError::Panicked {
                            path: raw.display().to_string(),
                            message,
                        })
                    }
                    Some(Ok(decoded)) => core.complete_async::<T>(&raw, Some(decoded)),
                    None => core.complete_async::<T>(&raw, None),
                };
                if promise.send(result).is_err() {
                    log::trace!(
                        "ResourceCache: async result for '{}' discarded by caller",
                        raw.display()
                    );
                }
            })
        });

        self.pipeline.submit(label, priority, decode);
        future
    }

    /// Runs the uploads of completed background decodes. Returns how many ran.
    ///
    /// Call it once per frame from the thread owning the graphics context. Only
    /// uploads queued when the call starts are run, capped by
    /// [`ResourceCacheConfig::max_uploads_per_frame`]; the closures run outside
    /// the queue lock.
    pub fn process_async_uploads(&self) -> usize {
        self.run_uploads(self.max_uploads_per_frame)
    }

    /// Like [`process_async_uploads`](Self::process_async_uploads) with an explicit cap.
    pub fn process_async_uploads_bounded(&self, max: usize) -> usize {
        self.run_uploads(Some(max))
    }

    fn run_uploads(&self, max: Option<usize>) -> usize {
        let uploads = self.pipeline.take_uploads(max);
        let count = uploads.len();
        for upload in uploads {
            upload(&self.core);
        }
        if count > 0 {
            log::trace!("ResourceCache: processed {} async upload(s)", count);
        }
        count
    }

    /// Releases the GPU memory of `path` but keeps it cached.
    ///
    /// A later [`load`](Self::load) returns the unloaded resource (a cold hit);
    /// call [`reload`](Self::reload) to bring it back. Unloading twice is harmless.
    pub fn unload(&self, path: impl AsRef<Path>) {
        let Some(resolved) = self.core.resolve(path.as_ref()) else {
            return;
        };
        let mut state = self.core.lock();
        if let Some(freed) = state.store.unload(resolved.id) {
            log::trace!(
                "ResourceCache: unloaded '{}' ({:.2}MB freed), GPU usage: {:.2}MB",
                resolved.key,
                freed as f64 / MB,
                state.store.budget().current() as f64 / MB
            );
        }
    }

    /// Rebuilds `path` in place and charges the footprint delta.
    ///
    /// Returns `false` if `path` is not cached or the resource failed to reload.
    /// Growth past the budget triggers an eviction pass.
    pub fn reload(&self, path: impl AsRef<Path>) -> bool {
        let Some(resolved) = self.core.resolve(path.as_ref()) else {
            return false;
        };
        let mut state = self.core.lock();
        let Some(outcome) = state.store.reload(resolved.id) else {
            log::debug!("ResourceCache: '{}' is not cached, nothing to reload", resolved.key);
            return false;
        };
        log::info!(
            "ResourceCache: reloaded '{}' ({:+.2}MB)",
            resolved.key,
            outcome.delta() as f64 / MB
        );
        if !outcome.success {
            log::warn!("ResourceCache: reload of '{}' reported failure", resolved.key);
        }

        let mut report = EvictionReport::default();
        if outcome.delta() > 0 && state.store.budget().is_over() {
            log::warn!("ResourceCache: budget exceeded after reload, evicting");
            report = state.evict(0);
        }
        drop(state);
        self.core.notify_evicted(&report);
        outcome.success
    }

    /// Unloads and forgets every cached resource. Pins and counters are kept.
    pub fn clear_cache(&self) {
        let cleared = self.core.lock().store.clear();
        log::info!("ResourceCache: cache cleared ({} resource(s))", cleared);
    }

    /// Changes the GPU budget, evicting right away if usage no longer fits.
    pub fn set_max_gpu_memory(&self, bytes: usize) {
        let mut state = self.core.lock();
        state.store.set_max_gpu_memory(bytes);
        log::info!(
            "ResourceCache: max GPU memory set to {:.2}MB",
            bytes as f64 / MB
        );
        let report = if state.store.budget().is_over() {
            state.evict(0)
        } else {
            EvictionReport::default()
        };
        drop(state);
        self.core.notify_evicted(&report);
    }

    /// GPU bytes currently charged.
    pub fn current_gpu_usage(&self) -> usize {
        self.core.lock().store.budget().current()
    }

    /// The GPU budget in bytes.
    pub fn max_gpu_memory(&self) -> usize {
        self.core.lock().store.budget().max()
    }

    /// Number of cached resources, loaded or not.
    pub fn cached_count(&self) -> usize {
        self.core.lock().store.len()
    }

    /// Whether `path` is cached. Does not affect eviction order.
    pub fn is_cached(&self, path: impl AsRef<Path>) -> bool {
        self.core
            .resolve(path.as_ref())
            .is_some_and(|resolved| self.core.lock().store.contains(resolved.id))
    }

    /// Exempts `path` from eviction. Paths not yet cached are pinned ahead of time.
    pub fn pin(&self, path: impl AsRef<Path>) {
        if let Some(resolved) = self.core.resolve(path.as_ref()) {
            if self.core.lock().store.pin(resolved.id) {
                log::debug!("ResourceCache: pinned '{}'", resolved.key);
            }
        }
    }

    /// Makes `path` evictable again.
    pub fn unpin(&self, path: impl AsRef<Path>) {
        if let Some(resolved) = self.core.resolve(path.as_ref()) {
            if self.core.lock().store.unpin(resolved.id) {
                log::debug!("ResourceCache: unpinned '{}'", resolved.key);
            }
        }
    }

    /// Whether `path` is pinned.
    pub fn is_pinned(&self, path: impl AsRef<Path>) -> bool {
        self.core
            .resolve(path.as_ref())
            .is_some_and(|resolved| self.core.lock().store.pins().is_pinned(resolved.id))
    }

    /// Sandboxes every later path inside `dir`. An empty path removes the sandbox.
    ///
    /// Already cached resources keep their identifiers.
    pub fn set_base_assets_dir(&self, dir: impl AsRef<Path>) {
        let dir = dir.as_ref();
        let base = vfs::normalize_path(dir, None);
        match &base {
            Some(base) => log::info!("ResourceCache: assets directory set to '{}'", base.display()),
            None => log::info!("ResourceCache: assets directory cleared"),
        }
        *self
            .core
            .base_dir
            .write()
            .unwrap_or_else(PoisonError::into_inner) = base;
    }

    /// The normalized assets directory, if any.
    pub fn base_assets_dir(&self) -> Option<PathBuf> {
        self.core.base_dir()
    }

    /// Registers a callback run with the path of every evicted resource.
    ///
    /// The callback runs after the cache lock is released, so it may call back into the cache.
    pub fn set_eviction_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self
            .core
            .on_evict
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Removes the eviction callback.
    pub fn clear_eviction_callback(&self) {
        *self
            .core
            .on_evict
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Allows or forbids GPU-side construction (headless tools and tests turn it off).
    pub fn set_gpu_loading_enabled(&self, enabled: bool) {
        self.core.gpu_loading.store(enabled, Ordering::Release);
        log::info!(
            "ResourceCache: GPU resource loading {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Whether GPU-side construction is allowed.
    pub fn is_gpu_loading_enabled(&self) -> bool {
        self.core.gpu_loading.load(Ordering::Acquire)
    }

    /// Registers (or replaces) the policy hooks of a resource kind.
    pub fn register_kind(&self, kind: ResourceKind) {
        self.core.lock().registry.register(kind);
    }

    /// A snapshot of the cache counters and usage.
    pub fn stats(&self) -> CacheStats {
        let (pending_decodes, pending_uploads) = (
            self.pipeline.pending_decodes(),
            self.pipeline.pending_uploads(),
        );
        let state = self.core.lock();
        let budget = state.store.budget();
        CacheStats {
            cached: state.store.len(),
            pinned: state.store.pinned_count(),
            current_gpu_usage: budget.current(),
            max_gpu_memory: budget.max(),
            hits: state.counters.hits,
            cold_hits: state.counters.cold_hits,
            misses: state.counters.misses,
            evictions: state.counters.evictions,
            load_failures: state.counters.load_failures,
            pending_decodes,
            pending_uploads,
        }
    }

    /// Writes [`stats`](Self::stats) to the log at info level.
    pub fn log_stats(&self) {
        for line in self.stats().to_string().lines() {
            log::info!("{}", line);
        }
    }
}

impl Drop for ResourceCache {
    fn drop(&mut self) {
        self.pipeline.shutdown();
        self.clear_cache();
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.core.lock();
        f.debug_struct("ResourceCache")
            .field("cached", &state.store.len())
            .field("budget", state.store.budget())
            .field("base_dir", &self.core.base_dir())
            .field("registry", &state.registry)
            .finish()
    }
}
