//! OS-thread task pools.
//!
//! Three variants share the same submission and shutdown surface:
//!
//! - [`BasicPool`]: one FIFO queue behind a mutex and condvar.
//! - [`PriorityPool`]: a priority heap with a counting semaphore signalling work.
//! - [`WorkStealingPool`]: per-worker queues, idle workers steal from peers.
//!
//! A panic inside a callable given to `submit` is captured into its
//! [`TaskHandle`](crate::handle::TaskHandle) as [`SpawnError::Panic`]. A panic inside a
//! raw [`Job`] given to [`Scheduler::schedule`] is caught at the worker boundary and
//! logged. Workers never die because of a task.

mod basic;
mod priority;
mod work_stealing;

pub use basic::BasicPool;
pub use priority::PriorityPool;
pub use work_stealing::WorkStealingPool;

use super::{
    errors::{PoolError, SpawnError},
    handle::{Job, TaskHandle},
    model::PoolMetrics,
};
use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};
use log::{debug, error, warn};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;


/// Pool configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub num_threads: usize,
    /// Prefix for worker thread names; the worker index is appended.
    pub thread_name: String,
    /// Upper bound on how long an idle work-stealing worker parks before
    /// scanning its peers again.
    pub steal_wait: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
            thread_name: "atomkit-worker".to_owned(),
            steal_wait: Duration::from_millis(2),
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        Self::default()
    }

    pub fn io_bound() -> Self {
        Self {
            num_threads: num_cpus::get() * 2,
            ..Default::default()
        }
    }

    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads,
            ..Default::default()
        }
    }

    pub fn named(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    pub fn with_steal_wait(mut self, steal_wait: Duration) -> Self {
        self.steal_wait = steal_wait;
        self
    }

    fn validate(&self) -> Result<(), PoolError> {
        if self.num_threads == 0 {
            return Err(PoolError::ZeroThreads);
        }
        Ok(())
    }
}


/// Anything that can run type-erased jobs on background threads.
///
/// This is the seam the coroutine layer is injected with.
pub trait Scheduler: Send + Sync {
    /// Queues `job`. A panic inside the job is caught and logged by the worker.
    ///
    /// Returns the job back when the pool is already stopped. A job accepted just
    /// before a `shutdown_now` may still be dropped without running.
    fn schedule(&self, job: Job) -> Result<(), Job>;

    fn name(&self) -> &str {
        "scheduler"
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn schedule(&self, job: Job) -> Result<(), Job> {
        (**self).schedule(job)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}


pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}


/// Counters, stop token and idle notification shared by a pool and its jobs.
pub(crate) struct PoolState {
    name: String,
    cancellation_token: CancellationToken,
    active_tasks: AtomicUsize,
    idle_workers: AtomicUsize,
    queued_tasks: AtomicUsize,
    total_spawned: AtomicUsize,
    completed_tasks: AtomicUsize,
    failed_tasks: AtomicUsize,
    // submitted but not yet finished or discarded
    pending: AtomicUsize,
    idle_lock: Mutex<()>,
    all_done: Condvar,
}

impl PoolState {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            cancellation_token: CancellationToken::new(),
            active_tasks: AtomicUsize::new(0),
            idle_workers: AtomicUsize::new(0),
            queued_tasks: AtomicUsize::new(0),
            total_spawned: AtomicUsize::new(0),
            completed_tasks: AtomicUsize::new(0),
            failed_tasks: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            idle_lock: Mutex::new(()),
            all_done: Condvar::new(),
        })
    }

    #[inline]
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn is_stopped(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub(crate) fn stop(&self) {
        self.cancellation_token.cancel();
    }

    fn admit(&self) {
        self.total_spawned.fetch_add(1, Ordering::Relaxed);
        self.queued_tasks.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Wraps a callable so that its result or panic lands in a [`TaskHandle`].
    pub(crate) fn package<F, R>(self: &Arc<Self>, f: F) -> (Job, TaskHandle<R>)
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let cancel_token = CancellationToken::new();
        let cancel_clone = cancel_token.clone();
        let state = Arc::clone(self);
        self.admit();

        let job: Job = Box::new(move || {
            let result = if cancel_clone.is_cancelled() {
                Err(SpawnError::Cancelled)
            } else {
                panic::catch_unwind(AssertUnwindSafe(f)).map_err(SpawnError::from_panic)
            };

            match &result {
                Ok(_) => {
                    state.completed_tasks.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    if let SpawnError::Panic(msg) = err {
                        debug!("{}: submitted task panicked: {}", state.name, msg);
                    }
                    state.failed_tasks.fetch_add(1, Ordering::Relaxed);
                }
            }

            let _ = tx.send(result);
        });

        (job, TaskHandle::new(cancel_token, rx))
    }

    /// Wraps a raw job so that a panic is logged instead of unwinding the worker.
    pub(crate) fn guard(self: &Arc<Self>, job: Job) -> Job {
        let state = Arc::clone(self);
        self.admit();

        Box::new(move || match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(()) => {
                state.completed_tasks.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                state.failed_tasks.fetch_add(1, Ordering::Relaxed);
                error!(
                    "{}: scheduled job panicked: {}",
                    state.name,
                    crate::errors::panic_message(payload.as_ref())
                );
            }
        })
    }

    /// Runs a dequeued job on the current worker.
    pub(crate) fn run(&self, job: Job) {
        self.queued_tasks.fetch_sub(1, Ordering::Relaxed);
        self.active_tasks.fetch_add(1, Ordering::Relaxed);
        job();
        self.active_tasks.fetch_sub(1, Ordering::Relaxed);
        self.finish(1);
    }

    /// Accounts for queued jobs that were dropped without running.
    pub(crate) fn discard(&self, jobs: Vec<Job>) {
        let count = jobs.len();
        if count == 0 {
            return;
        }
        warn!("{}: dropping {} queued task(s) on shutdown", self.name, count);
        self.queued_tasks.fetch_sub(count, Ordering::Relaxed);
        drop(jobs);
        self.finish(count);
    }

    fn finish(&self, count: usize) {
        if self.pending.fetch_sub(count, Ordering::AcqRel) == count {
            let _guard = lock(&self.idle_lock);
            self.all_done.notify_all();
        }
    }

    #[inline]
    pub(crate) fn enter_idle(&self) {
        self.idle_workers.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn leave_idle(&self) {
        self.idle_workers.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn idle_workers(&self) -> usize {
        self.idle_workers.load(Ordering::Relaxed)
    }

    pub(crate) fn wait_idle(&self) {
        let mut guard = lock(&self.idle_lock);
        while self.pending.load(Ordering::Acquire) > 0 {
            guard = self.all_done.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = lock(&self.idle_lock);
        while self.pending.load(Ordering::Acquire) > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .all_done
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    pub(crate) fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            idle_workers: self.idle_workers.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            total_spawned: self.total_spawned.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
        }
    }
}


/// Join handles of a pool's worker threads.
pub(crate) struct Workers {
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl Workers {
    pub(crate) fn new() -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn spawn<F>(&self, config: &Config, index: usize, body: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("{}-{}", config.thread_name, index))
            .spawn(body)?;
        lock(&self.handles).push(handle);
        Ok(())
    }

    /// Joins every worker except the calling thread, which is detached instead
    /// (a pool dropped from inside one of its own tasks).
    pub(crate) fn join(&self) {
        let handles = std::mem::take(&mut *lock(&self.handles));
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            let name = handle.thread().name().unwrap_or("worker").to_owned();
            if handle.join().is_err() {
                error!("{}: worker thread panicked", name);
            }
        }
    }
}
