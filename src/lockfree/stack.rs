//! Treiber stack.
//!
//! `push` and `pop` are `compare_exchange_weak` retry loops on the head pointer.
//! Popped nodes are retired through the epoch collector and freed only after every
//! thread that could still be reading them has unpinned, which also rules out ABA on
//! the head CAS: a node address cannot be reused while someone holds it.

use std::{fmt, mem::ManuallyDrop, ptr, sync::atomic::Ordering};
use crossbeam::{
    epoch::{self, Atomic, Owned, Shared},
    utils::Backoff,
};

struct Node<T> {
    value: ManuallyDrop<T>,
    next: Atomic<Node<T>>,
}

pub struct LockFreeStack<T> {
    head: Atomic<Node<T>>,
}

// Values are only ever moved in and out, never shared by reference.
unsafe impl<T: Send> Send for LockFreeStack<T> {}
unsafe impl<T: Send> Sync for LockFreeStack<T> {}

impl<T> LockFreeStack<T> {
    pub fn new() -> Self {
        Self {
            head: Atomic::null(),
        }
    }

    pub fn push(&self, value: T) {
        let mut node = Owned::new(Node {
            value: ManuallyDrop::new(value),
            next: Atomic::null(),
        });
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Relaxed, &guard);
            node.next.store(head, Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                node,
                Ordering::Release,
                Ordering::Relaxed,
                &guard,
            ) {
                Ok(_) => return,
                Err(err) => {
                    node = err.new;
                    backoff.spin();
                }
            }
        }
    }

    /// Pops the most recently pushed value, or `None` when the stack is empty.
    pub fn pop(&self) -> Option<T> {
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            // SAFETY: nodes reachable from `head` are retired, never freed, while we are pinned.
            let node = unsafe { head.as_ref() }?;
            let next = node.next.load(Ordering::Relaxed, &guard);

            if self
                .head
                .compare_exchange_weak(head, next, Ordering::Relaxed, Ordering::Relaxed, &guard)
                .is_ok()
            {
                // SAFETY: winning the CAS unlinked the node; we are the only owner of its
                // value and the node memory is freed after all current pins are gone.
                unsafe {
                    guard.defer_destroy(head);
                    return Some(ManuallyDrop::into_inner(ptr::read(&node.value)));
                }
            }
            backoff.spin();
        }
    }

    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.head.load(Ordering::Acquire, &guard).is_null()
    }
}

impl<T> Default for LockFreeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeStack<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can reach the nodes.
        unsafe {
            let guard = epoch::unprotected();
            let mut current: Shared<'_, Node<T>> = self.head.load(Ordering::Relaxed, guard);
            while !current.is_null() {
                let mut node = current.into_owned();
                current = node.next.load(Ordering::Relaxed, guard);
                ManuallyDrop::drop(&mut node.value);
            }
        }
    }
}

impl<T> fmt::Debug for LockFreeStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeStack")
            .field("is_empty", &self.is_empty())
            .finish()
    }
}
