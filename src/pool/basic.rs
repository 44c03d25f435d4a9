use super::{lock, Config, PoolState, Scheduler, Workers};
use crate::{
    errors::{PoolError, SpawnError},
    handle::{Job, TaskHandle},
    model::PoolMetrics,
};
use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, PoisonError},
    time::Duration,
};
use log::{debug, warn};


struct Shared {
    queue: Mutex<VecDeque<Job>>,
    available: Condvar,
    state: Arc<PoolState>,
}

impl Shared {
    fn push(&self, job: Job) -> Result<(), Job> {
        {
            let mut queue = lock(&self.queue);
            if self.state.is_stopped() {
                return Err(job);
            }
            queue.push_back(job);
        }
        self.available.notify_one();
        Ok(())
    }

    fn stop(&self) {
        {
            let _queue = lock(&self.queue);
            self.state.stop();
        }
        self.available.notify_all();
    }

    fn worker_loop(&self, index: usize) {
        debug!("{}: worker {} started", self.state.name(), index);

        loop {
            let next = {
                let mut queue = lock(&self.queue);
                loop {
                    if self.state.is_stopped() {
                        break None;
                    }
                    if let Some(job) = queue.pop_front() {
                        break Some(job);
                    }
                    self.state.enter_idle();
                    queue = self
                        .available
                        .wait(queue)
                        .unwrap_or_else(PoisonError::into_inner);
                    self.state.leave_idle();
                }
            };

            match next {
                Some(job) => self.state.run(job),
                None => break,
            }
        }

        debug!("{}: worker {} stopped", self.state.name(), index);
    }
}


/// Fixed set of workers draining one shared FIFO queue.
pub struct BasicPool {
    shared: Arc<Shared>,
    workers: Workers,
    config: Config,
}

impl BasicPool {
    pub fn new(num_threads: usize) -> Result<Self, PoolError> {
        Self::with_config(Config::with_threads(num_threads))
    }

    pub fn with_config(config: Config) -> Result<Self, PoolError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            state: PoolState::new(&config.thread_name),
        });
        let workers = Workers::new();

        for index in 0..config.num_threads {
            let shared_clone = Arc::clone(&shared);
            if let Err(err) = workers.spawn(&config, index, move || shared_clone.worker_loop(index)) {
                shared.stop();
                workers.join();
                return Err(err.into());
            }
        }

        debug!("{}: basic pool started with {} workers", config.thread_name, config.num_threads);
        Ok(Self { shared, workers, config })
    }

    /// Queues `f` and returns a handle to its result.
    pub fn submit<F, R>(&self, f: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.shared.state.is_stopped() {
            return TaskHandle::failed(SpawnError::PoolClosed);
        }
        let (job, handle) = self.shared.state.package(f);
        if let Err(job) = self.shared.push(job) {
            self.shared.state.discard(vec![job]);
        }
        handle
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.config.num_threads
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        self.shared.state.metrics()
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.is_stopped()
    }

    /// Blocks until every submitted task has finished. Must not be called from
    /// one of this pool's own tasks.
    pub fn wait_idle(&self) {
        self.shared.state.wait_idle();
    }

    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        self.shared.state.wait_idle_timeout(timeout)
    }

    /// Waits for queued work to finish, then stops and joins the workers.
    pub fn shutdown(&self) {
        self.wait_idle();
        self.shutdown_now();
    }

    /// Stops dequeuing, joins the workers and drops whatever is still queued.
    pub fn shutdown_now(&self) {
        self.shared.stop();
        self.workers.join();
        let leftover: Vec<Job> = lock(&self.shared.queue).drain(..).collect();
        self.shared.state.discard(leftover);
    }
}

impl Scheduler for BasicPool {
    fn schedule(&self, job: Job) -> Result<(), Job> {
        if self.shared.state.is_stopped() {
            warn!("{}: job scheduled after shutdown was rejected", self.name());
            return Err(job);
        }
        let job = self.shared.state.guard(job);
        if let Err(job) = self.shared.push(job) {
            self.shared.state.discard(vec![job]);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        self.shared.state.name()
    }
}

impl Drop for BasicPool {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}
