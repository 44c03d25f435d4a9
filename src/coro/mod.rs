//! Stackless tasks and generators scheduled on an injected pool.
//!
//! There is no process-wide scheduler: a [`SchedulerHandle`] is passed in explicitly and
//! every [`Task`] keeps the handle it was launched on. Wake-ups re-schedule polling onto
//! that pool, so a task body only ever suspends at an `.await`.

mod generator;
mod task;

pub use generator::{Co, Generator, Yield};
pub use task::Task;

use crate::{
    handle::Job,
    pool::{lock, Scheduler},
};
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, Waker},
    thread,
    time::{Duration, Instant},
};
use log::{debug, error};


/// Shared handle to the scheduler coroutines run on.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<dyn Scheduler>,
}

impl SchedulerHandle {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self { inner: scheduler }
    }

    pub fn from_pool<S: Scheduler + 'static>(pool: S) -> Self {
        Self::new(Arc::new(pool))
    }

    /// Queues a raw job; the job comes back when the pool is stopped.
    #[inline]
    pub fn schedule(&self, job: Job) -> Result<(), Job> {
        self.inner.schedule(job)
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Starts `future` as a [`Task`] on this scheduler.
    pub fn spawn<F>(&self, future: F) -> Task<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        Task::spawn(self, future)
    }

    /// Resumes the awaiting task on a pool worker.
    pub fn switch_to_background(&self) -> SwitchToBackground {
        SwitchToBackground {
            scheduler: self.clone(),
            scheduled: false,
        }
    }

    /// Resumes the awaiting task on the pool once `duration` has elapsed.
    pub fn delay(&self, duration: Duration) -> Delay {
        Delay {
            deadline: Instant::now() + duration,
            scheduler: self.clone(),
            waker: None,
        }
    }

    /// Wakes `waker` from a pool worker. If the pool drops the job instead, the
    /// waker still fires so the task can observe the closed pool.
    fn wake_on_pool(&self, waker: Waker) {
        let wake = WakeOnDrop(waker);
        if let Err(job) = self.schedule(Box::new(move || drop(wake))) {
            debug!("{}: wake-up rejected by a stopped pool", self.name());
            drop(job);
        }
    }
}

struct WakeOnDrop(Waker);

impl Drop for WakeOnDrop {
    fn drop(&mut self) {
        self.0.wake_by_ref();
    }
}

impl<S: Scheduler + 'static> From<Arc<S>> for SchedulerHandle {
    fn from(scheduler: Arc<S>) -> Self {
        Self::new(scheduler)
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SchedulerHandle").field(&self.name()).finish()
    }
}


/// Future returned by [`SchedulerHandle::switch_to_background`].
#[must_use = "futures do nothing unless awaited"]
pub struct SwitchToBackground {
    scheduler: SchedulerHandle,
    scheduled: bool,
}

impl Future for SwitchToBackground {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.scheduled {
            return Poll::Ready(());
        }
        self.scheduled = true;
        self.scheduler.wake_on_pool(cx.waker().clone());
        Poll::Pending
    }
}


/// Future returned by [`SchedulerHandle::delay`].
#[must_use = "futures do nothing unless awaited"]
pub struct Delay {
    deadline: Instant,
    scheduler: SchedulerHandle,
    // shared with the timer thread once armed
    waker: Option<Arc<Mutex<Option<Waker>>>>,
}

impl Delay {
    fn arm(&mut self, waker: &Waker) {
        let slot = Arc::new(Mutex::new(Some(waker.clone())));
        let timer_slot = Arc::clone(&slot);
        let scheduler = self.scheduler.clone();
        let remaining = self.deadline.saturating_duration_since(Instant::now());

        let spawned = thread::Builder::new()
            .name(format!("{}-timer", scheduler.name()))
            .spawn(move || {
                thread::sleep(remaining);
                let waker = lock(&timer_slot).take();
                if let Some(waker) = waker {
                    scheduler.wake_on_pool(waker);
                }
            });

        match spawned {
            Ok(_) => self.waker = Some(slot),
            Err(err) => {
                // poll again later and retry arming
                error!("failed to spawn delay timer thread: {}", err);
                self.scheduler.wake_on_pool(waker.clone());
            }
        }
    }
}

impl Future for Delay {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if Instant::now() >= this.deadline {
            return Poll::Ready(());
        }
        match &this.waker {
            Some(slot) => {
                *lock(slot) = Some(cx.waker().clone());
            }
            None => this.arm(cx.waker()),
        }
        Poll::Pending
    }
}
