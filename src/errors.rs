use std::{any::Any, io};

/// Outcome of a task that did not produce a value.
#[derive(Debug, PartialEq, PartialOrd, Eq, Ord, Clone, thiserror::Error)]
pub enum SpawnError {
    #[error("task panicked: {0}")]
    Panic(String),
    #[error("result channel closed before the task completed")]
    ChannelClosed,
    #[error("pool is shut down")]
    PoolClosed,
    #[error("timed out waiting for the task")]
    Timeout,
    #[error("task was cancelled")]
    Cancelled,
}

impl SpawnError {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        SpawnError::Panic(panic_message(payload.as_ref()))
    }
}

pub type SpawnResult<T> = Result<T, SpawnError>;

/// Errors raised while building a pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("a pool needs at least one worker thread")]
    ZeroThreads,
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
