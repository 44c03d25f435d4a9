use super::{lock, Config, PoolState, Scheduler, Workers};
use crate::{
    errors::{PoolError, SpawnError},
    handle::{Job, TaskHandle},
    model::PoolMetrics,
};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, TryLockError,
    },
    time::Duration,
};
use crossbeam::{
    sync::{Parker, Unparker},
    utils::CachePadded,
};
use log::{debug, trace, warn};


/// A worker's private queue. The owner pops from the front, thieves take from the back.
struct Slot {
    queue: Mutex<VecDeque<Job>>,
    // queued plus running on this worker
    load: CachePadded<AtomicUsize>,
    unparker: Unparker,
}

struct Shared {
    slots: Box<[Slot]>,
    // rotates the scan start so equal loads spread across workers
    next_start: AtomicUsize,
    steal_wait: Duration,
    state: Arc<PoolState>,
}

impl Shared {
    fn least_loaded(&self) -> usize {
        let n = self.slots.len();
        let start = self.next_start.fetch_add(1, Ordering::Relaxed) % n;
        (0..n)
            .map(|k| (start + k) % n)
            .min_by_key(|&i| self.slots[i].load.load(Ordering::Relaxed))
            .unwrap_or(start)
    }

    fn push(&self, job: Job) -> Result<(), Job> {
        let target = self.least_loaded();
        let slot = &self.slots[target];
        let load = {
            let mut queue = lock(&slot.queue);
            if self.state.is_stopped() {
                return Err(job);
            }
            queue.push_back(job);
            slot.load.fetch_add(1, Ordering::AcqRel) + 1
        };
        slot.unparker.unpark();

        // target is busy: nudge a neighbour so it can steal without waiting out its park
        if load > 1 && self.state.idle_workers() > 0 {
            let neighbour = (target + 1) % self.slots.len();
            self.slots[neighbour].unparker.unpark();
        }
        Ok(())
    }

    fn steal(&self, thief: usize) -> Option<Job> {
        let n = self.slots.len();
        for k in 1..n {
            let victim = (thief + k) % n;
            let slot = &self.slots[victim];
            let stolen = match slot.queue.try_lock() {
                Ok(mut queue) => queue.pop_back(),
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().pop_back(),
                Err(TryLockError::WouldBlock) => None,
            };
            if let Some(job) = stolen {
                slot.load.fetch_sub(1, Ordering::AcqRel);
                trace!("{}: worker {} stole from worker {}", self.state.name(), thief, victim);
                return Some(job);
            }
        }
        None
    }

    fn stop(&self) {
        self.state.stop();
        for slot in self.slots.iter() {
            // a push holding this lock either finished before the stop or will observe it
            drop(lock(&slot.queue));
            slot.unparker.unpark();
        }
    }

    fn worker_loop(&self, index: usize, parker: Parker) {
        debug!("{}: worker {} started", self.state.name(), index);
        let me = &self.slots[index];

        while !self.state.is_stopped() {
            let local = lock(&me.queue).pop_front();
            let next = local.or_else(|| {
                self.steal(index).inspect(|_| {
                    me.load.fetch_add(1, Ordering::AcqRel);
                })
            });

            match next {
                Some(job) => {
                    self.state.run(job);
                    me.load.fetch_sub(1, Ordering::AcqRel);
                }
                None => {
                    self.state.enter_idle();
                    parker.park_timeout(self.steal_wait);
                    self.state.leave_idle();
                }
            }
        }

        debug!("{}: worker {} stopped", self.state.name(), index);
    }
}


/// Workers with private queues; idle workers steal from their peers.
///
/// Completion order is unrelated to submission order.
pub struct WorkStealingPool {
    shared: Arc<Shared>,
    workers: Workers,
    config: Config,
}

impl WorkStealingPool {
    pub fn new(num_threads: usize) -> Result<Self, PoolError> {
        Self::with_config(Config::with_threads(num_threads))
    }

    pub fn with_config(config: Config) -> Result<Self, PoolError> {
        config.validate()?;

        let parkers: Vec<Parker> = (0..config.num_threads).map(|_| Parker::new()).collect();
        let slots = parkers
            .iter()
            .map(|parker| Slot {
                queue: Mutex::new(VecDeque::new()),
                load: CachePadded::new(AtomicUsize::new(0)),
                unparker: parker.unparker().clone(),
            })
            .collect();

        let shared = Arc::new(Shared {
            slots,
            next_start: AtomicUsize::new(0),
            steal_wait: config.steal_wait,
            state: PoolState::new(&config.thread_name),
        });
        let workers = Workers::new();

        for (index, parker) in parkers.into_iter().enumerate() {
            let shared_clone = Arc::clone(&shared);
            let spawned = workers.spawn(&config, index, move || {
                shared_clone.worker_loop(index, parker)
            });
            if let Err(err) = spawned {
                shared.stop();
                workers.join();
                return Err(err.into());
            }
        }

        debug!("{}: work-stealing pool started with {} workers", config.thread_name, config.num_threads);
        Ok(Self { shared, workers, config })
    }

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

    /// Per-worker load snapshot (queued plus running).
    pub fn loads(&self) -> Vec<usize> {
        self.shared
            .slots
            .iter()
            .map(|slot| slot.load.load(Ordering::Relaxed))
            .collect()
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
        let leftover: Vec<Job> = self
            .shared
            .slots
            .iter()
            .flat_map(|slot| {
                let drained: Vec<Job> = lock(&slot.queue).drain(..).collect();
                slot.load.store(0, Ordering::Relaxed);
                drained
            })
            .collect();
        self.shared.state.discard(leftover);
    }
}

impl Scheduler for WorkStealingPool {
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

impl Drop for WorkStealingPool {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}
