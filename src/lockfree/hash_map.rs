//! Fixed-size chained hash map with lock-free insert, lookup and logical delete.
//!
//! Each bucket is the head of a singly linked chain. New entries are only ever
//! appended with a CAS on a null link, and `erase` only flips an entry's tombstone,
//! so chains never lose nodes while the map is shared. Tombstoned entries are
//! unlinked and freed by [`LockFreeHashMap::purge_tombstones`], which needs `&mut self`.
//!
//! Values live in [`AtomicRefCounted`] handles, so a reader can keep a value alive
//! past a purge without cloning it.

use super::rc::AtomicRefCounted;
use std::{
    borrow::Borrow,
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};

pub const DEFAULT_BUCKETS: usize = 64;

struct Entry<K, V> {
    key: K,
    value: AtomicRefCounted<V>,
    deleted: AtomicBool,
    next: Atomic<Entry<K, V>>,
}

impl<K, V> Entry<K, V> {
    #[inline]
    fn is_live(&self) -> bool {
        !self.deleted.load(Ordering::Acquire)
    }
}

pub struct LockFreeHashMap<K, V, S = RandomState> {
    buckets: Box<[Atomic<Entry<K, V>>]>,
    hasher: S,
    len: AtomicUsize,
    tombstones: AtomicUsize,
}

impl<K, V> LockFreeHashMap<K, V, RandomState>
where
    K: Hash + Eq,
{
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    /// A map with `buckets` chains (at least one). The count never changes.
    pub fn with_buckets(buckets: usize) -> Self {
        Self::with_buckets_and_hasher(buckets, RandomState::new())
    }
}

impl<K, V, S> LockFreeHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    pub fn with_buckets_and_hasher(buckets: usize, hasher: S) -> Self {
        let buckets = (0..buckets.max(1)).map(|_| Atomic::null()).collect();
        Self {
            buckets,
            hasher,
            len: AtomicUsize::new(0),
            tombstones: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn bucket<Q>(&self, key: &Q) -> &Atomic<Entry<K, V>>
    where
        Q: Hash + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        &self.buckets[(hash % self.buckets.len() as u64) as usize]
    }

    fn find_entry<'g, Q>(&self, key: &Q, guard: &'g Guard) -> Option<&'g Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut current = self.bucket(key).load(Ordering::Acquire, guard);
        // SAFETY: entries are freed only under `&mut self` or on drop.
        while let Some(entry) = unsafe { current.as_ref() } {
            if entry.key.borrow() == key && entry.is_live() {
                return Some(entry);
            }
            current = entry.next.load(Ordering::Acquire, guard);
        }
        None
    }

    /// Inserts `key` unless a live entry with an equal key exists.
    ///
    /// Returns `false` when the key is already present. Concurrent inserts of one key
    /// race on the chain's tail link; exactly one wins.
    pub fn insert(&self, key: K, value: V) -> bool {
        let guard = epoch::pin();
        let mut new = Owned::new(Entry {
            key,
            value: AtomicRefCounted::new(value),
            deleted: AtomicBool::new(false),
            next: Atomic::null(),
        });
        let mut link = self.bucket(&new.key);

        loop {
            let current = link.load(Ordering::Acquire, &guard);
            // SAFETY: see `find_entry`.
            match unsafe { current.as_ref() } {
                Some(entry) => {
                    if entry.key == new.key && entry.is_live() {
                        return false;
                    }
                    link = &entry.next;
                }
                None => match link.compare_exchange(
                    Shared::null(),
                    new,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                ) {
                    Ok(_) => {
                        self.len.fetch_add(1, Ordering::Relaxed);
                        return true;
                    }
                    // somebody appended first; re-read this link and keep walking
                    Err(err) => new = err.new,
                },
            }
        }
    }

    /// Clones the value of the live entry for `key`.
    pub fn find<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let guard = epoch::pin();
        self.find_entry(key, &guard).map(|entry| (*entry.value).clone())
    }

    /// A shared handle to the value of the live entry for `key`.
    pub fn find_shared<Q>(&self, key: &Q) -> Option<AtomicRefCounted<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = epoch::pin();
        self.find_entry(key, &guard).map(|entry| entry.value.clone())
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = epoch::pin();
        self.find_entry(key, &guard).is_some()
    }

    /// Tombstones the live entry for `key`. The entry stays linked until a purge.
    pub fn erase<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = epoch::pin();
        let mut current = self.bucket(key).load(Ordering::Acquire, &guard);

        // SAFETY: see `find_entry`.
        while let Some(entry) = unsafe { current.as_ref() } {
            if entry.key.borrow() == key
                && entry
                    .deleted
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                self.len.fetch_sub(1, Ordering::Relaxed);
                self.tombstones.fetch_add(1, Ordering::Relaxed);
                return true;
            }
            current = entry.next.load(Ordering::Acquire, &guard);
        }
        false
    }

    /// Unlinks and frees every tombstoned entry, returning how many were removed.
    pub fn purge_tombstones(&mut self) -> usize {
        let mut removed = 0;
        // SAFETY: `&mut self` means no other thread is inside the map.
        let guard = unsafe { epoch::unprotected() };

        for bucket in self.buckets.iter() {
            let mut link = bucket;
            loop {
                let current = link.load(Ordering::Relaxed, guard);
                // SAFETY: exclusive access, entries are valid until we free them here.
                let Some(entry) = (unsafe { current.as_ref() }) else {
                    break;
                };
                if entry.is_live() {
                    link = &entry.next;
                    continue;
                }
                let next = entry.next.load(Ordering::Relaxed, guard);
                link.store(next, Ordering::Relaxed);
                // SAFETY: the entry is unlinked and nobody else can reach it.
                drop(unsafe { current.into_owned() });
                removed += 1;
            }
        }

        self.tombstones.fetch_sub(removed, Ordering::Relaxed);
        removed
    }
}

impl<K, V, S> LockFreeHashMap<K, V, S> {
    /// Live entries. Advisory under concurrent updates.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Erased entries still linked into their chains.
    pub fn tombstones(&self) -> usize {
        self.tombstones.load(Ordering::Relaxed)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl<K, V> Default for LockFreeHashMap<K, V, RandomState>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Drop for LockFreeHashMap<K, V, S> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can reach the entries.
        unsafe {
            let guard = epoch::unprotected();
            for bucket in self.buckets.iter() {
                let mut current = bucket.load(Ordering::Relaxed, guard);
                while !current.is_null() {
                    let entry = current.into_owned();
                    current = entry.next.load(Ordering::Relaxed, guard);
                }
            }
        }
    }
}

impl<K, V, S> fmt::Debug for LockFreeHashMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeHashMap")
            .field("len", &self.len())
            .field("tombstones", &self.tombstones())
            .field("buckets", &self.bucket_count())
            .finish()
    }
}
