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

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use khora_core::resource::{Resource, ResourceError, ResourceHandle};
use std::time::Duration;

/// The value a background load resolves to.
pub type LoadResult<T> = Result<ResourceHandle<T>, ResourceError>;

/// Creates the two ends of a one-shot load result.
pub(crate) fn pending<T: Resource>(path: String) -> (Sender<LoadResult<T>>, PendingResource<T>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (tx, PendingResource { path, receiver: rx })
}

/// The future returned by [`ResourceCache::load_async`](super::ResourceCache::load_async).
///
/// It resolves once the thread owning the cache runs
/// [`process_async_uploads`](super::ResourceCache::process_async_uploads) after
/// the decode finished. Failed constructions resolve like a synchronous load
/// does (stub or absent handle); only panics and shutdown resolve to an error.
///
/// Do not block on it from the thread that drives the uploads: it would wait forever.
#[derive(Debug)]
pub struct PendingResource<T: Resource> {
    path: String,
    receiver: Receiver<LoadResult<T>>,
}

impl<T: Resource> PendingResource<T> {
    /// The path the load was requested for.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether a result is waiting to be taken.
    pub fn is_ready(&self) -> bool {
        !self.receiver.is_empty()
    }

    /// Takes the result if the load has completed, without blocking.
    ///
    /// Once a result has been taken, later calls report [`ResourceError::Cancelled`].
    pub fn try_take(&self) -> Option<LoadResult<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(self.cancelled())),
        }
    }

    /// Blocks until the load completes.
    pub fn wait(self) -> LoadResult<T> {
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(self.cancelled()))
    }

    /// Blocks for at most `timeout`. Returns `None` if the load is still in flight.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<LoadResult<T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(self.cancelled())),
        }
    }

    fn cancelled(&self) -> ResourceError {
        ResourceError::Cancelled(self.path.clone())
    }
}
