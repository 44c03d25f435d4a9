//! Lock-free containers.
//!
//! The stack, queue and hash map reclaim unlinked nodes through `crossbeam::epoch`,
//! so no node is freed while another thread may still be reading it.

pub mod hash_map;
pub mod queue;
pub mod rc;
pub mod ring;
pub mod stack;

pub use hash_map::LockFreeHashMap;
pub use queue::LockFreeQueue;
pub use rc::AtomicRefCounted;
pub use ring::{Consumer, Producer, SpscRingBuffer};
pub use stack::LockFreeStack;
