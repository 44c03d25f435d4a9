use super::errors::{SpawnError, SpawnResult};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    sync::oneshot::{self, error::TryRecvError},
    time::Duration,
};
use tokio_util::sync::CancellationToken;


/// Type-erased unit of work executed by a pool worker.
pub type Job = Box<dyn FnOnce() + Send + 'static>;


/// Handle to a submitted task: result, cancellation and timeout.
///
/// The handle can be awaited from async code or joined from a plain thread.
pub struct TaskHandle<T> {
    cancel_token: CancellationToken,
    receiver: oneshot::Receiver<SpawnResult<T>>,
}

impl<T> TaskHandle<T> {

    pub(crate) fn new
    (
        cancel_token: CancellationToken,
        receiver: oneshot::Receiver<SpawnResult<T>>,
    ) -> Self {
        Self {
            cancel_token,
            receiver
        }
    }

    /// A handle that is already resolved with `err`.
    pub(crate) fn failed(err: SpawnError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self::new(CancellationToken::new(), rx)
    }

    /// Requests cancellation. A task that has not started yet is skipped and
    /// resolves to [`SpawnError::Cancelled`]; a running task is not interrupted.
    #[inline]
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Blocks the current thread until the task finishes.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async runtime; await the handle there.
    pub fn join(self) -> SpawnResult<T> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(SpawnError::ChannelClosed))
    }

    /// Returns the result if the task already finished.
    pub fn try_join(&mut self) -> Option<SpawnResult<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(SpawnError::ChannelClosed)),
        }
    }

    pub async fn await_timeout(self, timeout: Duration) -> SpawnResult<T> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SpawnError::ChannelClosed),
            Err(_) => Err(SpawnError::Timeout),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = SpawnResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(res) => Poll::Ready(res.unwrap_or(Err(SpawnError::ChannelClosed))),
            Poll::Pending => Poll::Pending,
        }
    }
}
