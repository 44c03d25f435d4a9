use crate::pool::lock;
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};
use futures::{executor, future::BoxFuture, FutureExt};


type YieldSlot<T> = Arc<Mutex<Option<T>>>;

/// Yielding side of a [`Generator`], passed into its body.
pub struct Co<T> {
    slot: YieldSlot<T>,
}

impl<T> Co<T> {
    /// Hands `value` to the consumer and suspends until the next `next()` call.
    pub fn yield_(&self, value: T) -> Yield<T> {
        Yield {
            slot: Arc::clone(&self.slot),
            value: Some(value),
        }
    }
}

/// Future returned by [`Co::yield_`].
#[must_use = "a value is only yielded when awaited"]
pub struct Yield<T> {
    slot: YieldSlot<T>,
    value: Option<T>,
}

// `value` is moved out, never pinned.
impl<T> Unpin for Yield<T> {}

impl<T> Future for Yield<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match this.value.take() {
            Some(value) => {
                *lock(&this.slot) = Some(value);
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}


/// Lazy pull-based sequence driven by an async body.
///
/// Neither the producer closure nor its body runs until the first
/// [`next`](Iterator::next), and each call resumes it only up to its next
/// `co.yield_(..).await` or its end. A generator is single-pass;
/// build a new one to restart the sequence. Awaiting anything other than a yield blocks
/// the consuming thread until that future is woken.
///
/// ```
/// use atomkit::coro::Generator;
///
/// let evens: Vec<u32> = Generator::new(|co| async move {
///     for i in 0..4 {
///         co.yield_(i * 2).await;
///     }
/// })
/// .collect();
/// assert_eq!(evens, vec![0, 2, 4, 6]);
/// ```
pub struct Generator<T> {
    slot: YieldSlot<T>,
    // called on the first `next()`
    start: Option<Producer<T>>,
    body: Option<BoxFuture<'static, ()>>,
}

type Producer<T> = Box<dyn FnOnce(Co<T>) -> BoxFuture<'static, ()> + Send>;

impl<T: Send + 'static> Generator<T> {
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(Co<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(None)),
            start: Some(Box::new(move |co| producer(co).boxed())),
            body: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.start.is_none() && self.body.is_none()
    }
}

impl<T: Send + 'static> Iterator for Generator<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if let Some(start) = self.start.take() {
            self.body = Some(start(Co { slot: Arc::clone(&self.slot) }));
        }
        let body = self.body.as_mut()?;
        let slot = &self.slot;

        let finished = executor::block_on(futures::future::poll_fn(|cx| {
            match body.as_mut().poll(cx) {
                Poll::Ready(()) => Poll::Ready(true),
                Poll::Pending if lock(slot).is_some() => Poll::Ready(false),
                Poll::Pending => Poll::Pending,
            }
        }));

        if finished {
            self.body = None;
        }
        lock(&self.slot).take()
    }
}

impl<T> fmt::Debug for Generator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("started", &self.start.is_none())
            .field("finished", &(self.start.is_none() && self.body.is_none()))
            .finish()
    }
}
