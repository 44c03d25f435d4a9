use super::SchedulerHandle;
use crate::{
    errors::{SpawnError, SpawnResult},
    handle::TaskHandle,
    pool::lock,
};
use std::{
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    thread,
};
use futures::{
    future::BoxFuture,
    task::{waker_ref, ArcWake},
    FutureExt,
};
use log::debug;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;


type Body<T> = BoxFuture<'static, thread::Result<T>>;

/// The polled half of a [`Task`], shared with its wakers.
///
/// The body and the result sender sit behind separate locks: a task can be
/// resolved (pool closed) while another thread, or the same thread, is polling.
struct RawTask<T> {
    body: Mutex<Option<Body<T>>>,
    result_tx: Mutex<Option<oneshot::Sender<SpawnResult<T>>>>,
    scheduler: SchedulerHandle,
    cancel_token: CancellationToken,
}

impl<T: Send + 'static> RawTask<T> {
    /// Sends the result once; later calls are no-ops.
    fn resolve(&self, result: SpawnResult<T>) {
        if let Some(tx) = lock(&self.result_tx).take() {
            let _ = tx.send(result);
        }
    }

    fn is_resolved(&self) -> bool {
        lock(&self.result_tx).is_none()
    }

    /// Resolves a task whose continuation can no longer run.
    fn abandon(&self) {
        if self.cancel_token.is_cancelled() {
            self.resolve(Err(SpawnError::Cancelled));
        } else {
            debug!("{}: task dropped by a stopped pool", self.scheduler.name());
            self.resolve(Err(SpawnError::PoolClosed));
        }
    }

    /// Polls the body once on the current thread.
    ///
    /// A wake-up that arrives mid-poll queues another poll on the pool, which waits
    /// for this one to release the body.
    fn poll(self: &Arc<Self>) {
        let mut body = lock(&self.body);
        if body.is_none() {
            return;
        }
        if self.is_resolved() {
            *body = None;
            return;
        }
        if self.cancel_token.is_cancelled() {
            *body = None;
            self.resolve(Err(SpawnError::Cancelled));
            return;
        }

        let waker = waker_ref(self);
        let mut cx = Context::from_waker(&waker);
        let polled = match body.as_mut() {
            Some(fut) => fut.as_mut().poll(&mut cx),
            None => return,
        };

        match polled {
            Poll::Ready(outcome) => {
                *body = None;
                let result = outcome.map_err(SpawnError::from_panic);
                if let Err(SpawnError::Panic(msg)) = &result {
                    debug!("{}: task panicked: {}", self.scheduler.name(), msg);
                }
                self.resolve(result);
            }
            // abandoned while suspending
            Poll::Pending if self.is_resolved() => *body = None,
            Poll::Pending => {}
        }
    }
}

/// A queued poll of a [`RawTask`]. Dropping it unrun abandons the task.
struct Resume<T: Send + 'static>(Option<Arc<RawTask<T>>>);

impl<T: Send + 'static> Resume<T> {
    fn run(mut self) {
        if let Some(task) = self.0.take() {
            task.poll();
        }
    }
}

impl<T: Send + 'static> Drop for Resume<T> {
    fn drop(&mut self) {
        if let Some(task) = self.0.take() {
            task.abandon();
        }
    }
}

impl<T: Send + 'static> ArcWake for RawTask<T> {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let resume = Resume(Some(Arc::clone(arc_self)));
        if let Err(job) = arc_self.scheduler.schedule(Box::new(move || resume.run())) {
            drop(job);
        }
    }
}


/// A coroutine started eagerly and resumed on its scheduler's workers.
///
/// The first poll runs on the spawning thread up to the first suspension point.
/// Await the task (once) or [`join`](Task::join) it from a plain thread.
pub struct Task<T> {
    handle: TaskHandle<T>,
    raw: Arc<RawTask<T>>,
}

impl<T: Send + 'static> Task<T> {
    pub fn spawn<F>(scheduler: &SchedulerHandle, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let cancel_token = CancellationToken::new();

        let raw = Arc::new(RawTask {
            body: Mutex::new(Some(AssertUnwindSafe(future).catch_unwind().boxed())),
            result_tx: Mutex::new(Some(tx)),
            scheduler: scheduler.clone(),
            cancel_token: cancel_token.clone(),
        });
        raw.poll();

        Self {
            handle: TaskHandle::new(cancel_token, rx),
            raw,
        }
    }

    /// Stops the task at its next resumption; it then resolves to
    /// [`SpawnError::Cancelled`]. A task whose pool has shut down resolves to
    /// [`SpawnError::PoolClosed`] instead of waiting forever.
    pub fn cancel(&self) {
        self.handle.cancel();
        ArcWake::wake_by_ref(&self.raw);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// True once the result is available (or the task was abandoned).
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.raw.is_resolved()
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.raw.scheduler
    }

    /// Blocks until the task completes.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async runtime; await the task there.
    pub fn join(self) -> SpawnResult<T> {
        self.handle.join()
    }
}

impl<T> Future for Task<T> {
    type Output = SpawnResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}
