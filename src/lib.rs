//! In-process concurrency toolkit: lock-free containers, thread pools and
//! pool-scheduled coroutines.
//!
//! # Features
//! - Treiber stack, Michael & Scott queue and chained hash map with epoch-based reclamation
//! - Bounded SPSC ring buffer with split producer/consumer ends
//! - Atomically reference-counted handle
//! - Basic, priority and work-stealing thread pools with cooperative shutdown
//! - Panics captured into task handles instead of killing workers
//! - Eager tasks, background switches, delays and generators on an injected scheduler

pub mod coro;
pub mod errors;
pub mod handle;
pub mod lockfree;
pub mod model;
pub mod pool;

pub use coro::{Generator, SchedulerHandle, Task};
pub use errors::{PoolError, SpawnError, SpawnResult};
pub use handle::{Job, TaskHandle};
pub use lockfree::{
    AtomicRefCounted, LockFreeHashMap, LockFreeQueue, LockFreeStack, SpscRingBuffer,
};
pub use model::{PoolMetrics, Priority};
pub use pool::{BasicPool, Config, PriorityPool, Scheduler, WorkStealingPool};
