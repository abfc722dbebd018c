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

//! The background half of asynchronous loads.
//!
//! A request travels through two queues:
//! 1. a priority queue of [`LoadTask`]s, consumed by a single decode worker;
//! 2. a FIFO of upload closures, drained once per frame by the thread that owns
//!    the graphics context.
//!
//! The decode closure runs on the worker and returns the upload closure, which
//! carries the decoded data back across the thread boundary.

use super::cache::CacheCore;
use khora_core::resource::LoadPriority;
use std::{
    any::Any,
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
    io,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread,
};

/// GPU-side work, run on the owning thread.
pub(crate) type UploadFn = Box<dyn FnOnce(&CacheCore) + Send>;

/// CPU-side work, run on the decode worker.
pub(crate) type DecodeFn = Box<dyn FnOnce() -> UploadFn + Send>;

/// A queued background load.
pub(crate) struct LoadTask {
    path: String,
    priority: LoadPriority,
    sequence: u64,
    decode: DecodeFn,
}

// Higher priority first; earlier submissions first within a tier.
impl Ord for LoadTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for LoadTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for LoadTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for LoadTask {}

struct QueueState {
    tasks: BinaryHeap<LoadTask>,
    uploads: VecDeque<UploadFn>,
    decoding: usize,
    next_sequence: u64,
    running: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    signal: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The decode worker and both queues.
pub(crate) struct AsyncPipeline {
    shared: Arc<Shared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl AsyncPipeline {
    /// Starts the decode worker under the given thread name.
    pub(crate) fn spawn(thread_name: &str) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                tasks: BinaryHeap::new(),
                uploads: VecDeque::new(),
                decoding: 0,
                next_sequence: 0,
                running: true,
            }),
            signal: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || worker_loop(&worker_shared))?;

        log::debug!("ResourceCache: decode worker '{}' started", thread_name);
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Queues a decode and wakes the worker.
    pub(crate) fn submit(&self, path: String, priority: LoadPriority, decode: DecodeFn) {
        {
            let mut state = self.shared.lock();
            if !state.running {
                log::warn!("ResourceCache: pipeline stopped, dropping request for '{}'", path);
                return;
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            log::trace!("ResourceCache: queued '{}' ({:?})", path, priority);
            state.tasks.push(LoadTask {
                path,
                priority,
                sequence,
                decode,
            });
        }
        self.shared.signal.notify_one();
    }

    /// Takes the uploads queued so far, at most `max` of them.
    ///
    /// Uploads queued after this call wait for the next one.
    pub(crate) fn take_uploads(&self, max: Option<usize>) -> VecDeque<UploadFn> {
        let mut state = self.shared.lock();
        match max {
            Some(max) if max < state.uploads.len() => state.uploads.drain(..max).collect(),
            _ => std::mem::take(&mut state.uploads),
        }
    }

    /// Requests queued or being decoded.
    pub(crate) fn pending_decodes(&self) -> usize {
        let state = self.shared.lock();
        state.tasks.len() + state.decoding
    }

    /// Decoded requests waiting for their upload.
    pub(crate) fn pending_uploads(&self) -> usize {
        self.shared.lock().uploads.len()
    }

    /// Stops and joins the worker.
    ///
    /// Queued decodes and undrained uploads are dropped, which cancels their futures.
    pub(crate) fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let (tasks, uploads) = {
            let mut state = self.shared.lock();
            state.running = false;
            (
                std::mem::take(&mut state.tasks),
                std::mem::take(&mut state.uploads),
            )
        };
        self.shared.signal.notify_all();

        if worker.join().is_err() {
            log::error!("ResourceCache: decode worker terminated abnormally");
        }

        // The worker may have pushed one last upload while stopping.
        let leftover = std::mem::take(&mut self.shared.lock().uploads);
        let dropped = tasks.len() + uploads.len() + leftover.len();
        if dropped > 0 {
            log::info!("ResourceCache: cancelled {} pending async load(s)", dropped);
        }
    }
}

impl Drop for AsyncPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut state = shared.lock();
            while state.running && state.tasks.is_empty() {
                state = shared
                    .signal
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if !state.running {
                break;
            }
            match state.tasks.pop() {
                Some(task) => {
                    state.decoding += 1;
                    task
                }
                None => continue,
            }
        };

        let LoadTask { path, decode, .. } = task;
        log::trace!("ResourceCache: decoding '{}'", path);
        let upload = panic::catch_unwind(AssertUnwindSafe(decode));

        let mut state = shared.lock();
        state.decoding -= 1;
        match upload {
            Ok(upload) => state.uploads.push_back(upload),
            Err(payload) => log::error!(
                "ResourceCache: decode of '{}' panicked: {}",
                path,
                panic_message(payload.as_ref())
            ),
        }
    }
    log::debug!("ResourceCache: decode worker stopped");
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::{Duration, Instant};

    fn noop_decode(order: Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> DecodeFn {
        Box::new(move || {
            order.lock().unwrap().push(name);
            let upload: UploadFn = Box::new(|_core: &CacheCore| {});
            upload
        })
    }

    fn wait_for_uploads(pipeline: &AsyncPipeline, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while pipeline.pending_uploads() < count {
            assert!(Instant::now() < deadline, "timed out waiting for decodes");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn tasks_order_by_priority_then_submission() {
        let make = |priority, sequence| LoadTask {
            path: String::new(),
            priority,
            sequence,
            decode: Box::new(|| Box::new(|_core: &CacheCore| {}) as UploadFn),
        };
        let mut heap = BinaryHeap::new();
        heap.push(make(LoadPriority::Low, 0));
        heap.push(make(LoadPriority::Normal, 1));
        heap.push(make(LoadPriority::High, 2));
        heap.push(make(LoadPriority::Normal, 3));
        let order: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|task| (task.priority, task.sequence))
            .collect();
        assert_eq!(
            order,
            vec![
                (LoadPriority::High, 2),
                (LoadPriority::Normal, 1),
                (LoadPriority::Normal, 3),
                (LoadPriority::Low, 0),
            ]
        );
    }

    #[test]
    fn worker_decodes_into_upload_queue() {
        let pipeline = AsyncPipeline::spawn("test-decode").unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        pipeline.submit("a".into(), LoadPriority::Normal, noop_decode(order.clone(), "a"));
        pipeline.submit("b".into(), LoadPriority::Normal, noop_decode(order.clone(), "b"));
        wait_for_uploads(&pipeline, 2);
        assert_eq!(pipeline.pending_decodes(), 0);
        assert_eq!(pipeline.take_uploads(None).len(), 2);
        assert_eq!(pipeline.pending_uploads(), 0);
        assert_eq!(order.lock().unwrap().len(), 2);
    }

    #[test]
    fn take_uploads_respects_the_cap() {
        let pipeline = AsyncPipeline::spawn("test-decode-cap").unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            pipeline.submit(name.into(), LoadPriority::Low, noop_decode(order.clone(), name));
        }
        wait_for_uploads(&pipeline, 3);
        assert_eq!(pipeline.take_uploads(Some(2)).len(), 2);
        assert_eq!(pipeline.take_uploads(Some(2)).len(), 1);
    }

    #[test]
    fn panicking_decode_keeps_the_worker_alive() {
        let pipeline = AsyncPipeline::spawn("test-decode-panic").unwrap();
        pipeline.submit(
            "boom".into(),
            LoadPriority::High,
            Box::new(|| -> UploadFn { panic!("decoder exploded") }),
        );
        let order = Arc::new(Mutex::new(Vec::new()));
        pipeline.submit("ok".into(), LoadPriority::Low, noop_decode(order.clone(), "ok"));
        wait_for_uploads(&pipeline, 1);
        assert_eq!(*order.lock().unwrap(), vec!["ok"]);
    }

    #[test]
    fn shutdown_drops_queued_work() {
        let mut pipeline = AsyncPipeline::spawn("test-decode-stop").unwrap();
        let dropped = Arc::new(AtomicUsize::new(0));

        struct Guard(Arc<AtomicUsize>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.fetch_add(1, AtomicOrdering::SeqCst);
            }
        }

        pipeline.shutdown();
        let guard = Guard(dropped.clone());
        pipeline.submit(
            "late".into(),
            LoadPriority::Normal,
            Box::new(move || -> UploadFn {
                let _guard = guard;
                Box::new(|_core: &CacheCore| {})
            }),
        );
        assert_eq!(dropped.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(pipeline.pending_decodes(), 0);
    }

    #[test]
    fn panic_messages() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
