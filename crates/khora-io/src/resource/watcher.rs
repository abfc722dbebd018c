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

//! Filesystem watching for hot-reload.

use super::ResourceCache;
use crossbeam_channel::{Receiver, Sender};
use khora_core::vfs;
use notify::{event::ModifyKind, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

/// Watches an assets directory and reloads cached resources whose file changed.
///
/// Events are collected on notify's own thread and queued; nothing touches the
/// cache until [`apply`](ResourceWatcher::apply) is called, typically once per
/// frame next to [`ResourceCache::process_async_uploads`].
pub struct ResourceWatcher {
    root: PathBuf,
    events: Receiver<PathBuf>,
    _watcher: RecommendedWatcher,
}

impl ResourceWatcher {
    /// Starts watching `root` recursively.
    pub fn new(root: impl AsRef<Path>) -> notify::Result<Self> {
        let root = vfs::normalize_path(root.as_ref(), None).ok_or_else(|| {
            notify::Error::generic(&format!(
                "cannot watch '{}': invalid path",
                root.as_ref().display()
            ))
        })?;

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            forward_event(res, &tx)
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        log::info!("ResourceWatcher: watching '{}'", root.display());

        Ok(Self {
            root,
            events: rx,
            _watcher: watcher,
        })
    }

    /// The watched directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Takes the changed paths reported so far, without duplicates.
    pub fn drain(&self) -> Vec<PathBuf> {
        drain_unique(&self.events)
    }

    /// Reloads every changed file that is cached. Returns how many were reloaded.
    pub fn apply(&self, cache: &ResourceCache) -> usize {
        let base = cache.base_assets_dir();
        let mut reloaded = 0;
        for changed in self.drain() {
            let Some(path) = cache_path(&changed, base.as_deref()) else {
                continue;
            };
            if cache.is_cached(&path) && cache.reload(&path) {
                log::info!("ResourceWatcher: hot-reloaded '{}'", path.display());
                reloaded += 1;
            }
        }
        reloaded
    }
}

impl std::fmt::Debug for ResourceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceWatcher")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn forward_event(res: notify::Result<Event>, tx: &Sender<PathBuf>) {
    match res {
        Ok(event) if triggers_reload(&event.kind) => {
            for path in event.paths {
                if let Err(e) = tx.send(vfs::lexically_normal(&path)) {
                    log::trace!(
                        "ResourceWatcher: dropping change to '{}', watcher is shutting down",
                        e.into_inner().display()
                    );
                    return;
                }
            }
        }
        Ok(_) => {}
        Err(e) => log::warn!("ResourceWatcher: watch error: {}", e),
    }
}

fn drain_unique(events: &Receiver<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    events
        .try_iter()
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

/// Content changes and (re)creations reload; metadata-only changes, accesses and removals do not.
fn triggers_reload(kind: &EventKind) -> bool {
    match kind {
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) | EventKind::Create(_) => true,
        _ => false,
    }
}

/// Maps a changed file to the path the cache knows it by.
///
/// With an assets directory the cache expects paths relative to it; files
/// outside of it are ignored.
fn cache_path(changed: &Path, base: Option<&Path>) -> Option<PathBuf> {
    match base {
        Some(base) => changed
            .strip_prefix(base)
            .ok()
            .filter(|relative| !relative.as_os_str().is_empty())
            .map(Path::to_path_buf),
        None => Some(changed.to_path_buf()),
    }
}
