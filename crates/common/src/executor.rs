//! Serial executor — one named worker thread per stateful component.
//!
//! Every mutable piece of engine state (layer map, consumer set,
//! encoder context) is owned by exactly one worker. Other threads talk
//! to it by queueing closures; the closures run in submission order and
//! atomically with respect to the owned state. Between executors the
//! system is parallel.
//!
//! A task receives the state and a handle to its own executor, so a
//! periodic task can re-arm itself (the producer device tick does
//! this). `begin_invoke` returns a [`TaskFuture`] backed by a
//! single-slot channel; `wait_timeout` is the teardown budget used to
//! keep a wedged sink from deadlocking shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::error;

use crate::error::{EngineError, EngineResult};

type Job<S> = Box<dyn FnOnce(&mut S, &ExecutorHandle<S>) + Send + 'static>;

/// How long the worker sleeps between queue polls while checking the
/// shutdown flag.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Cloneable submission side of an [`Executor`].
pub struct ExecutorHandle<S> {
    tx: Sender<Job<S>>,
    running: Arc<AtomicBool>,
    capacity: Option<usize>,
}

impl<S> Clone for ExecutorHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            running: Arc::clone(&self.running),
            capacity: self.capacity,
        }
    }
}

impl<S: Send + 'static> ExecutorHandle<S> {
    /// Queue a task, fire-and-forget.
    ///
    /// On a bounded executor a full queue rejects the task and returns
    /// `false` (drop semantics); an unbounded executor always accepts
    /// while the worker is alive.
    pub fn spawn(&self, f: impl FnOnce(&mut S, &ExecutorHandle<S>) + Send + 'static) -> bool {
        if !self.is_running() {
            return false;
        }
        match self.capacity {
            Some(_) => self.tx.try_send(Box::new(f)).is_ok(),
            None => self.tx.send(Box::new(f)).is_ok(),
        }
    }

    /// Queue a task, blocking until the queue has room.
    ///
    /// This is the pacing primitive: a bounded executor at capacity
    /// holds the caller back until the worker catches up.
    pub fn spawn_blocking(
        &self,
        f: impl FnOnce(&mut S, &ExecutorHandle<S>) + Send + 'static,
    ) -> bool {
        if !self.is_running() {
            return false;
        }
        self.tx.send(Box::new(f)).is_ok()
    }

    /// Queue a task and return a future for its result.
    ///
    /// If the task is rejected (full bounded queue) or the worker dies,
    /// waiting on the future yields [`EngineError::WorkerGone`].
    pub fn begin_invoke<R: Send + 'static>(
        &self,
        f: impl FnOnce(&mut S, &ExecutorHandle<S>) -> R + Send + 'static,
    ) -> TaskFuture<R> {
        let (tx, rx) = channel::bounded(1);
        self.spawn(move |state, handle| {
            let _ = tx.send(f(state, handle));
        });
        TaskFuture { rx }
    }

    /// Queue a task and block for its result.
    pub fn invoke<R: Send + 'static>(
        &self,
        f: impl FnOnce(&mut S, &ExecutorHandle<S>) -> R + Send + 'static,
    ) -> EngineResult<R> {
        self.begin_invoke(f).wait()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Queue capacity, if bounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Whether the executor is still accepting work. Periodic tasks
    /// check this before re-arming themselves.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// A serial executor owning state `S` on a dedicated worker thread.
///
/// Dropping the executor stops the worker after draining the queued
/// tasks. [`abandon`](Executor::abandon) detaches instead, for the
/// forcible-release teardown path.
pub struct Executor<S: Send + 'static> {
    handle: ExecutorHandle<S>,
    worker: Option<JoinHandle<()>>,
    name: String,
}

impl<S: Send + 'static> Executor<S> {
    /// Unbounded executor.
    pub fn new(name: &str, state: S) -> Self {
        Self::with_channel(name, state, channel::unbounded(), None)
    }

    /// Bounded executor with drop-on-full `spawn` semantics.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn bounded(name: &str, state: S, capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self::with_channel(name, state, channel::bounded(capacity), Some(capacity))
    }

    fn with_channel(
        name: &str,
        mut state: S,
        (tx, rx): (Sender<Job<S>>, Receiver<Job<S>>),
        capacity: Option<usize>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let handle = ExecutorHandle {
            tx,
            running,
            capacity,
        };
        let worker_handle = handle.clone();
        let worker = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match rx.recv_timeout(IDLE_POLL) {
                    Ok(job) => job(&mut state, &worker_handle),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                if !worker_handle.is_running() && rx.is_empty() {
                    break;
                }
            })
            .expect("failed to spawn executor worker");
        Self {
            handle,
            worker: Some(worker),
            name: name.to_string(),
        }
    }

    pub fn handle(&self) -> ExecutorHandle<S> {
        self.handle.clone()
    }

    pub fn spawn(&self, f: impl FnOnce(&mut S, &ExecutorHandle<S>) + Send + 'static) -> bool {
        self.handle.spawn(f)
    }

    pub fn begin_invoke<R: Send + 'static>(
        &self,
        f: impl FnOnce(&mut S, &ExecutorHandle<S>) -> R + Send + 'static,
    ) -> TaskFuture<R> {
        self.handle.begin_invoke(f)
    }

    pub fn invoke<R: Send + 'static>(
        &self,
        f: impl FnOnce(&mut S, &ExecutorHandle<S>) -> R + Send + 'static,
    ) -> EngineResult<R> {
        self.handle.invoke(f)
    }

    pub fn len(&self) -> usize {
        self.handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handle.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Detach the worker without joining. Used when a teardown budget
    /// expires and the worker must be released forcibly; queued tasks
    /// may still run but nothing waits for them.
    pub fn abandon(&mut self) {
        self.handle.running.store(false, Ordering::Release);
        if self.worker.take().is_some() {
            error!(executor = %self.name, "abandoning wedged executor worker");
        }
    }
}

impl<S: Send + 'static> Drop for Executor<S> {
    fn drop(&mut self) {
        self.handle.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Future for a task submitted with `begin_invoke`.
pub struct TaskFuture<R> {
    rx: Receiver<R>,
}

impl<R> TaskFuture<R> {
    /// An already-resolved future.
    pub fn ready(value: R) -> Self {
        let (tx, rx) = channel::bounded(1);
        let _ = tx.send(value);
        Self { rx }
    }

    /// Block until the task completes.
    pub fn wait(self) -> EngineResult<R> {
        self.rx.recv().map_err(|_| EngineError::WorkerGone)
    }

    /// Block up to `timeout` for the task to complete.
    pub fn wait_timeout(self, timeout: Duration) -> EngineResult<R> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => EngineError::Timeout(timeout),
            RecvTimeoutError::Disconnected => EngineError::WorkerGone,
        })
    }

    /// Non-blocking poll.
    pub fn try_ready(&mut self) -> Option<R> {
        self.rx.try_recv().ok()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
