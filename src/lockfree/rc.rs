//! Atomically reference-counted owning handle.
//!
//! The count lives next to the payload in one heap block. Increments are relaxed;
//! decrements are release, and the thread that takes the count from 1 to 0 issues an
//! acquire fence before destroying the payload, so every write made through any handle
//! happens-before the destructor.

use std::{
    fmt,
    marker::PhantomData,
    ops::Deref,
    process,
    ptr::NonNull,
    sync::atomic::{self, AtomicUsize, Ordering},
};

const MAX_REFCOUNT: usize = isize::MAX as usize;

struct ControlBlock<T> {
    count: AtomicUsize,
    value: T,
}

pub struct AtomicRefCounted<T> {
    block: NonNull<ControlBlock<T>>,
    _owns: PhantomData<ControlBlock<T>>,
}

// Handles hand out `&T` on any thread and the last one drops `T` on any thread.
unsafe impl<T: Send + Sync> Send for AtomicRefCounted<T> {}
unsafe impl<T: Send + Sync> Sync for AtomicRefCounted<T> {}

impl<T> AtomicRefCounted<T> {
    pub fn new(value: T) -> Self {
        let block = Box::new(ControlBlock {
            count: AtomicUsize::new(1),
            value,
        });
        Self {
            block: NonNull::from(Box::leak(block)),
            _owns: PhantomData,
        }
    }

    #[inline]
    fn block(&self) -> &ControlBlock<T> {
        // SAFETY: the block stays allocated while this handle holds a count.
        unsafe { self.block.as_ref() }
    }

    /// Number of live handles. Advisory: other threads may change it at any moment.
    #[inline]
    pub fn use_count(&self) -> usize {
        self.block().count.load(Ordering::Acquire)
    }

    /// Whether both handles share one payload.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.block == other.block
    }

    /// Mutable access when this is the only handle.
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        if this.block().count.load(Ordering::Acquire) == 1 {
            // SAFETY: count 1 and `&mut self` means no other handle can observe the payload.
            Some(unsafe { &mut this.block.as_mut().value })
        } else {
            None
        }
    }

    /// Takes the payload back when this is the only handle.
    pub fn try_unwrap(this: Self) -> Result<T, Self> {
        if this
            .block()
            .count
            .compare_exchange(1, 0, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(this);
        }
        let block = this.block;
        std::mem::forget(this);
        // SAFETY: we moved the count to 0, so no other handle exists and the block
        // was allocated by `Box` in `new`.
        let block = *unsafe { Box::from_raw(block.as_ptr()) };
        Ok(block.value)
    }
}

impl<T> Clone for AtomicRefCounted<T> {
    fn clone(&self) -> Self {
        let old = self.block().count.fetch_add(1, Ordering::Relaxed);
        if old > MAX_REFCOUNT {
            process::abort();
        }
        Self {
            block: self.block,
            _owns: PhantomData,
        }
    }
}

impl<T> Drop for AtomicRefCounted<T> {
    fn drop(&mut self) {
        if self.block().count.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        atomic::fence(Ordering::Acquire);
        // SAFETY: this was the last handle.
        drop(unsafe { Box::from_raw(self.block.as_ptr()) });
    }
}

impl<T> Deref for AtomicRefCounted<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.block().value
    }
}

impl<T> AsRef<T> for AtomicRefCounted<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T> From<T> for AtomicRefCounted<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T> From<Box<T>> for AtomicRefCounted<T> {
    fn from(value: Box<T>) -> Self {
        Self::new(*value)
    }
}

impl<T: fmt::Debug> fmt::Debug for AtomicRefCounted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicRefCounted")
            .field("value", &**self)
            .field("use_count", &self.use_count())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{atomic::AtomicBool, Arc};

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            assert!(!self.0.swap(true, Ordering::SeqCst), "payload dropped twice");
        }
    }

    #[test]
    fn payload_dropped_once_by_last_handle() {
        let dropped = Arc::new(AtomicBool::new(false));
        let first = AtomicRefCounted::new(DropFlag(dropped.clone()));
        let second = first.clone();
        assert_eq!(first.use_count(), 2);

        drop(first);
        assert!(!dropped.load(Ordering::SeqCst));
        assert_eq!(second.use_count(), 1);

        drop(second);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn try_unwrap_requires_unique_handle() {
        let a = AtomicRefCounted::new(String::from("payload"));
        let b = a.clone();
        let a = AtomicRefCounted::try_unwrap(a).unwrap_err();
        drop(b);
        assert_eq!(AtomicRefCounted::try_unwrap(a).unwrap(), "payload");
    }

    #[test]
    fn get_mut_only_when_unique() {
        let mut a = AtomicRefCounted::new(1);
        *AtomicRefCounted::get_mut(&mut a).unwrap() += 1;
        let b = a.clone();
        assert!(AtomicRefCounted::get_mut(&mut a).is_none());
        assert!(AtomicRefCounted::ptr_eq(&a, &b));
        assert_eq!(*b, 2);
    }
}
