//! Michael & Scott FIFO queue.
//!
//! The head always points at a dummy node whose value slot is empty; the first real
//! value sits in `head.next`. Enqueue swaps the new node in as the tail and then links
//! the previous tail to it, so for a moment `tail` is ahead of the chain. Dequeuers that
//! see a null `next` while `tail` has moved wait for that link instead of reporting empty.
//!
//! Whoever wins the CAS that advances `head` owns the value in the new dummy and retires
//! the old one through the epoch collector.

use std::{fmt, mem::MaybeUninit, ptr, sync::atomic::Ordering};
use crossbeam::{
    epoch::{self, Atomic, Guard, Owned, Shared},
    utils::{Backoff, CachePadded},
};

struct Node<T> {
    value: MaybeUninit<T>,
    next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn dummy() -> Owned<Self> {
        Owned::new(Node {
            value: MaybeUninit::uninit(),
            next: Atomic::null(),
        })
    }
}

pub struct LockFreeQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
}

// Values are only ever moved in and out, never shared by reference.
unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> LockFreeQueue<T> {
    pub fn new() -> Self {
        let queue = Self {
            head: CachePadded::new(Atomic::null()),
            tail: CachePadded::new(Atomic::null()),
        };
        // SAFETY: the queue is not shared yet.
        unsafe {
            let dummy = Node::dummy().into_shared(epoch::unprotected());
            queue.head.store(dummy, Ordering::Relaxed);
            queue.tail.store(dummy, Ordering::Relaxed);
        }
        queue
    }

    pub fn enqueue(&self, value: T) {
        let node = Owned::new(Node {
            value: MaybeUninit::new(value),
            next: Atomic::null(),
        });
        let guard = epoch::pin();
        let node = node.into_shared(&guard);

        let prev = self.tail.swap(node, Ordering::AcqRel, &guard);
        // SAFETY: `prev.next` is still null, so no dequeuer can move `head` past `prev`
        // and it cannot have been retired.
        unsafe { prev.deref() }.next.store(node, Ordering::Release);
    }

    /// Removes the oldest value, or `None` when the queue is empty.
    pub fn dequeue(&self) -> Option<T> {
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            // SAFETY: `head` is never null and is not freed while we are pinned.
            let next = unsafe { head.deref() }.next.load(Ordering::Acquire, &guard);

            if next.is_null() {
                if self.tail.load(Ordering::Acquire, &guard) == head {
                    return None;
                }
                // an enqueue swapped the tail but has not linked it yet
                backoff.snooze();
                continue;
            }

            if self
                .head
                .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, &guard)
                .is_ok()
            {
                // SAFETY: winning the CAS makes `next` the new dummy and hands us its value;
                // the old dummy is unreachable and freed once current pins are gone.
                unsafe {
                    let value = ptr::read(next.deref().value.as_ptr());
                    guard.defer_destroy(head);
                    return Some(value);
                }
            }
            backoff.spin();
        }
    }

    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.peek_next(&guard).is_null()
    }

    fn peek_next<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<T>> {
        let head = self.head.load(Ordering::Acquire, guard);
        // SAFETY: `head` is never null and is not freed while pinned.
        unsafe { head.deref() }.next.load(Ordering::Acquire, guard)
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        while self.dequeue().is_some() {}
        // SAFETY: `&mut self` means no other thread can reach the dummy.
        unsafe {
            let guard = epoch::unprotected();
            let dummy = self.head.load(Ordering::Relaxed, guard);
            drop(dummy.into_owned());
        }
    }
}

impl<T> fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeQueue")
            .field("is_empty", &self.is_empty())
            .finish()
    }
}
