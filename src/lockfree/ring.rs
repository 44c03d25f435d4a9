//! Bounded single-producer single-consumer ring buffer.
//!
//! `write_pos` is written only by the [`Producer`] and `read_pos` only by the
//! [`Consumer`]; an acquire load of the other side's index paired with a release store
//! of one's own is the whole synchronisation. One slot is always left empty so that
//! `read_pos == write_pos` means empty, which caps the usable capacity at `N - 1`.

use std::{
    cell::UnsafeCell,
    fmt,
    mem::MaybeUninit,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use crossbeam::utils::CachePadded;

pub struct SpscRingBuffer<T, const N: usize> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    write_pos: CachePadded<AtomicUsize>,
    read_pos: CachePadded<AtomicUsize>,
}

// Each slot is touched by exactly one side at a time, handed over by the index stores.
unsafe impl<T: Send, const N: usize> Send for SpscRingBuffer<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for SpscRingBuffer<T, N> {}

impl<T, const N: usize> SpscRingBuffer<T, N> {
    const MASK: usize = {
        assert!(
            N >= 2 && N.is_power_of_two(),
            "ring buffer size must be a power of two of at least 2"
        );
        N - 1
    };

    pub fn new() -> Self {
        // evaluating MASK rejects a bad `N` at compile time
        let _ = Self::MASK;
        let slots = (0..N)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Self {
            slots,
            write_pos: CachePadded::new(AtomicUsize::new(0)),
            read_pos: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Splits the buffer into its two ends.
    pub fn split(self) -> (Producer<T, N>, Consumer<T, N>) {
        let ring = Arc::new(self);
        (
            Producer { ring: Arc::clone(&ring) },
            Consumer { ring },
        )
    }

    /// Usable slots.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    #[inline]
    fn len(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) & Self::MASK
    }
}

impl<T, const N: usize> Default for SpscRingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for SpscRingBuffer<T, N> {
    fn drop(&mut self) {
        let write = *self.write_pos.get_mut();
        let mut read = *self.read_pos.get_mut();
        while read != write {
            // SAFETY: slots in `read..write` hold initialised values no one else can reach.
            unsafe { self.slots[read].get_mut().assume_init_drop() };
            read = (read + 1) & Self::MASK;
        }
    }
}

impl<T, const N: usize> fmt::Debug for SpscRingBuffer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpscRingBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}


/// Writing end of a [`SpscRingBuffer`].
pub struct Producer<T, const N: usize> {
    ring: Arc<SpscRingBuffer<T, N>>,
}

impl<T, const N: usize> Producer<T, N> {
    /// Appends `item`, or hands it back when the buffer is full. Never overwrites.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        let ring = &*self.ring;
        let write = ring.write_pos.load(Ordering::Relaxed);
        let next = (write + 1) & SpscRingBuffer::<T, N>::MASK;
        if next == ring.read_pos.load(Ordering::Acquire) {
            return Err(item);
        }
        // SAFETY: the consumer does not touch `write` until we publish `next`.
        unsafe { (*ring.slots[write].get()).write(item) };
        ring.write_pos.store(next, Ordering::Release);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.ring.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// Reading end of a [`SpscRingBuffer`].
pub struct Consumer<T, const N: usize> {
    ring: Arc<SpscRingBuffer<T, N>>,
}

impl<T, const N: usize> Consumer<T, N> {
    /// Takes the oldest item, or `None` immediately when the buffer is empty.
    pub fn pop(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let read = ring.read_pos.load(Ordering::Relaxed);
        if read == ring.write_pos.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the producer published this slot and will not reuse it until we
        // advance `read_pos`.
        let item = unsafe { (*ring.slots[read].get()).assume_init_read() };
        ring.read_pos
            .store((read + 1) & SpscRingBuffer::<T, N>::MASK, Ordering::Release);
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.ring.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_wrap_around() {
        let (mut tx, mut rx) = SpscRingBuffer::<u32, 4>::new().split();
        for round in 0..10 {
            assert!(tx.push(round).is_ok());
            assert!(tx.push(round + 100).is_ok());
            assert_eq!(tx.len(), 2);
            assert_eq!(rx.pop(), Some(round));
            assert_eq!(rx.pop(), Some(round + 100));
            assert!(rx.is_empty());
        }
    }

    #[test]
    fn unread_items_dropped_with_buffer() {
        let marker = Arc::new(());
        let (mut tx, rx) = SpscRingBuffer::<Arc<()>, 8>::new().split();
        for _ in 0..5 {
            tx.push(Arc::clone(&marker)).unwrap();
        }
        assert_eq!(Arc::strong_count(&marker), 6);
        drop(tx);
        drop(rx);
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
