use super::{lock, Config, PoolState, Scheduler, Workers};
use crate::{
    errors::{PoolError, SpawnError},
    handle::{Job, TaskHandle},
    model::{PoolMetrics, Priority},
};
use std::{
    cmp::Ordering as CmpOrdering,
    collections::BinaryHeap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use log::{debug, warn};
use tokio::sync::Semaphore;


/// Heap entry: higher priority first, then lower submission sequence first.
struct PriorityJob {
    priority: Priority,
    seq: u64,
    job: Job,
}

impl PartialEq for PriorityJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PriorityJob {}

impl PartialOrd for PriorityJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityJob {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}


struct Shared {
    heap: Mutex<BinaryHeap<PriorityJob>>,
    // one permit per queued job
    available: Semaphore,
    next_seq: AtomicU64,
    state: Arc<PoolState>,
}

impl Shared {
    fn push(&self, priority: Priority, job: Job) -> Result<(), Job> {
        {
            let mut heap = lock(&self.heap);
            if self.state.is_stopped() {
                return Err(job);
            }
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            heap.push(PriorityJob { priority, seq, job });
        }
        self.available.add_permits(1);
        Ok(())
    }

    fn stop(&self) {
        {
            let _heap = lock(&self.heap);
            self.state.stop();
        }
        self.available.close();
    }

    fn worker_loop(&self, index: usize) {
        debug!("{}: worker {} started", self.state.name(), index);

        loop {
            self.state.enter_idle();
            let acquired = futures::executor::block_on(self.available.acquire());
            self.state.leave_idle();

            match acquired {
                Ok(permit) => permit.forget(),
                // closed on shutdown
                Err(_) => break,
            }
            if self.state.is_stopped() {
                break;
            }

            let next = lock(&self.heap).pop();
            if let Some(entry) = next {
                self.state.run(entry.job);
            }
        }

        debug!("{}: worker {} stopped", self.state.name(), index);
    }
}


/// Workers draining a priority heap; equal priorities run in submission order.
pub struct PriorityPool {
    shared: Arc<Shared>,
    workers: Workers,
    config: Config,
}

impl PriorityPool {
    pub fn new(num_threads: usize) -> Result<Self, PoolError> {
        Self::with_config(Config::with_threads(num_threads))
    }

    pub fn with_config(config: Config) -> Result<Self, PoolError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            heap: Mutex::new(BinaryHeap::new()),
            available: Semaphore::new(0),
            next_seq: AtomicU64::new(0),
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

        debug!("{}: priority pool started with {} workers", config.thread_name, config.num_threads);
        Ok(Self { shared, workers, config })
    }

    /// Queues `f` at [`Priority::Normal`].
    pub fn submit<F, R>(&self, f: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit_with_priority(Priority::Normal, f)
    }

    pub fn submit_with_priority<F, R>(&self, priority: Priority, f: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.shared.state.is_stopped() {
            return TaskHandle::failed(SpawnError::PoolClosed);
        }
        let (job, handle) = self.shared.state.package(f);
        if let Err(job) = self.shared.push(priority, job) {
            self.shared.state.discard(vec![job]);
        }
        handle
    }

    /// Queues a raw job at the given priority; hands it back once the pool is stopped.
    pub fn schedule_with_priority(&self, priority: Priority, job: Job) -> Result<(), Job> {
        if self.shared.state.is_stopped() {
            warn!("{}: job scheduled after shutdown was rejected", self.name());
            return Err(job);
        }
        let job = self.shared.state.guard(job);
        if let Err(job) = self.shared.push(priority, job) {
            self.shared.state.discard(vec![job]);
        }
        Ok(())
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

    pub fn wait_idle(&self) {
        self.shared.state.wait_idle();
    }

    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        self.shared.state.wait_idle_timeout(timeout)
    }

    pub fn shutdown(&self) {
        self.wait_idle();
        self.shutdown_now();
    }

    pub fn shutdown_now(&self) {
        self.shared.stop();
        self.workers.join();
        let leftover: Vec<Job> = lock(&self.shared.heap)
            .drain()
            .map(|entry| entry.job)
            .collect();
        self.shared.state.discard(leftover);
    }
}

impl Scheduler for PriorityPool {
    fn schedule(&self, job: Job) -> Result<(), Job> {
        self.schedule_with_priority(Priority::Normal, job)
    }

    fn name(&self) -> &str {
        self.shared.state.name()
    }
}

impl Drop for PriorityPool {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}
