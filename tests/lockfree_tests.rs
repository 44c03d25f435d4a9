#[cfg(test)]
mod tests {
    use atomkit::lockfree::{
        AtomicRefCounted, LockFreeHashMap, LockFreeQueue, LockFreeStack, SpscRingBuffer,
    };
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc, Barrier,
        },
        thread,
    };

    const THREADS: u64 = 4;
    const PER_THREAD: u64 = 10_000;

    fn tag(producer: u64, seq: u64) -> u64 {
        (producer << 32) | seq
    }

    #[test]
    fn test_stack_lifo_and_empty() {
        println!("\n=== TEST: stack basics ===");
        let stack = LockFreeStack::new();
        assert!(stack.is_empty());
        assert_eq!(stack.pop(), None);

        for i in 1..=3 {
            stack.push(i);
        }
        assert!(!stack.is_empty());
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.pop(), None);
        println!("  ✓ LIFO, drained stack keeps returning None");
    }

    #[test]
    fn test_stack_concurrent_push_pop() {
        println!("\n=== TEST: stack under contention ===");
        let stack = Arc::new(LockFreeStack::new());
        let producers_done = Arc::new(AtomicBool::new(false));
        let barrier = Arc::new(Barrier::new((THREADS * 2) as usize));

        let producers: Vec<_> = (0..THREADS)
            .map(|p| {
                let stack = Arc::clone(&stack);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for seq in 0..PER_THREAD {
                        stack.push(tag(p, seq));
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..THREADS)
            .map(|_| {
                let stack = Arc::clone(&stack);
                let barrier = Arc::clone(&barrier);
                let done = Arc::clone(&producers_done);
                thread::spawn(move || {
                    barrier.wait();
                    let mut taken = Vec::new();
                    loop {
                        // read the flag first so an empty pop after it is final
                        let finished = done.load(Ordering::Acquire);
                        match stack.pop() {
                            Some(v) => taken.push(v),
                            None if finished => break,
                            None => thread::yield_now(),
                        }
                    }
                    taken
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        producers_done.store(true, Ordering::Release);

        let mut seen = HashSet::new();
        for consumer in consumers {
            for v in consumer.join().unwrap() {
                assert!(seen.insert(v), "value {:#x} popped twice", v);
            }
        }
        assert_eq!(seen.len() as u64, THREADS * PER_THREAD);
        assert!(stack.is_empty());
        println!("  ✓ {} values, each popped once", seen.len());
    }

    #[test]
    fn test_queue_fifo_single_thread() {
        println!("\n=== TEST: queue basics ===");
        let queue = LockFreeQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);

        for word in ["a", "b", "c"] {
            queue.enqueue(word.to_owned());
        }
        assert_eq!(queue.dequeue().as_deref(), Some("a"));
        queue.enqueue("d".to_owned());
        let rest: Vec<_> = std::iter::from_fn(|| queue.dequeue()).collect();
        assert_eq!(rest, vec!["b", "c", "d"]);
        assert!(queue.is_empty());
        println!("  ✓ FIFO");
    }

    #[test]
    fn test_queue_spsc_order() {
        println!("\n=== TEST: queue SPSC order ===");
        let queue = Arc::new(LockFreeQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    queue.enqueue(i);
                }
            })
        };

        let mut expected = 0;
        while expected < PER_THREAD {
            if let Some(v) = queue.dequeue() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }
        producer.join().unwrap();
        assert_eq!(queue.dequeue(), None);
        println!("  ✓ {} values in order", expected);
    }

    #[test]
    fn test_queue_mpmc_per_producer_order() {
        println!("\n=== TEST: queue MPMC ===");
        let queue = Arc::new(LockFreeQueue::new());
        let remaining = Arc::new(AtomicUsize::new((THREADS * PER_THREAD) as usize));

        let producers: Vec<_> = (0..THREADS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for seq in 0..PER_THREAD {
                        queue.enqueue(tag(p, seq));
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..THREADS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let remaining = Arc::clone(&remaining);
                thread::spawn(move || {
                    let mut taken = Vec::new();
                    while remaining.load(Ordering::Acquire) > 0 {
                        if let Some(v) = queue.dequeue() {
                            remaining.fetch_sub(1, Ordering::AcqRel);
                            taken.push(v);
                        }
                    }
                    taken
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }

        let mut seen = HashSet::new();
        for consumer in consumers {
            let taken = consumer.join().unwrap();
            // one consumer sees each producer's values in enqueue order
            let mut last = vec![None; THREADS as usize];
            for v in taken {
                let (p, seq) = ((v >> 32) as usize, v & 0xffff_ffff);
                assert!(last[p].map_or(true, |prev| prev < seq));
                last[p] = Some(seq);
                assert!(seen.insert(v));
            }
        }
        assert_eq!(seen.len() as u64, THREADS * PER_THREAD);
        println!("  ✓ no loss, no duplicates, per-producer order kept");
    }

    #[test]
    fn test_containers_drop_remaining_items() {
        println!("\n=== TEST: drop releases items ===");
        let token = Arc::new(());
        {
            let stack = LockFreeStack::new();
            let queue = LockFreeQueue::new();
            for _ in 0..10 {
                stack.push(Arc::clone(&token));
                queue.enqueue(Arc::clone(&token));
            }
            drop(stack.pop());
            drop(queue.dequeue());
            assert_eq!(Arc::strong_count(&token), 19);
        }
        assert_eq!(Arc::strong_count(&token), 1);
        println!("  ✓ no leaks");
    }

    #[test]
    fn test_ring_boundaries() {
        println!("\n=== TEST: ring boundaries ===");
        let (mut producer, mut consumer) = SpscRingBuffer::<u32, 4>::new().split();
        assert_eq!(producer.capacity(), 3);
        assert_eq!(consumer.pop(), None);

        for i in 0..3 {
            assert_eq!(producer.push(i), Ok(()));
        }
        assert!(producer.is_full());
        assert_eq!(producer.push(99), Err(99));

        assert_eq!(consumer.pop(), Some(0));
        assert_eq!(producer.push(3), Ok(()));
        assert_eq!(consumer.len(), 3);

        let drained: Vec<_> = std::iter::from_fn(|| consumer.pop()).collect();
        assert_eq!(drained, vec![1, 2, 3]);
        assert!(consumer.is_empty());
        println!("  ✓ N - 1 usable slots");
    }

    #[test]
    fn test_ring_cross_thread() {
        println!("\n=== TEST: ring SPSC ===");
        let (mut producer, mut consumer) = SpscRingBuffer::<u64, 64>::new().split();
        let writer = thread::spawn(move || {
            for i in 0..PER_THREAD * 10 {
                let mut item = i;
                while let Err(back) = producer.push(item) {
                    item = back;
                    std::hint::spin_loop();
                }
            }
        });

        let mut expected = 0;
        while expected < PER_THREAD * 10 {
            if let Some(v) = consumer.pop() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }
        writer.join().unwrap();
        assert_eq!(consumer.pop(), None);
        println!("  ✓ {} values in order", expected);
    }

    #[test]
    fn test_hash_map_basics() {
        println!("\n=== TEST: hash map basics ===");
        let map = LockFreeHashMap::new();
        assert!(map.is_empty());
        assert!(map.insert("one".to_owned(), 1));
        assert!(!map.insert("one".to_owned(), 100));
        assert_eq!(map.find("one"), Some(1));
        assert_eq!(map.find("two"), None);
        assert!(map.contains_key("one"));

        assert!(map.erase("one"));
        assert!(!map.erase("one"));
        assert_eq!(map.find("one"), None);
        assert_eq!(map.tombstones(), 1);

        // a tombstoned key can be inserted again
        assert!(map.insert("one".to_owned(), 11));
        assert_eq!(map.find("one"), Some(11));
        assert_eq!(map.len(), 1);
        println!("  ✓ insert, find, erase, reinsert");
    }

    #[test]
    fn test_hash_map_shared_value_outlives_erase() {
        println!("\n=== TEST: shared values ===");
        let mut map = LockFreeHashMap::with_buckets(4);
        map.insert(7u32, vec![1, 2, 3]);
        let shared = map.find_shared(&7).unwrap();
        assert_eq!(shared.use_count(), 2);

        assert!(map.erase(&7));
        assert_eq!(map.purge_tombstones(), 1);
        assert_eq!(map.tombstones(), 0);
        assert_eq!(*shared, vec![1, 2, 3]);
        assert_eq!(AtomicRefCounted::try_unwrap(shared).ok(), Some(vec![1, 2, 3]));
        println!("  ✓ value kept alive by its handle");
    }

    #[test]
    fn test_hash_map_concurrent_insert_single_winner() {
        println!("\n=== TEST: hash map insert race ===");
        let map = Arc::new(LockFreeHashMap::with_buckets(16));
        let barrier = Arc::new(Barrier::new(THREADS as usize));

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let map = Arc::clone(&map);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..1_000u64).filter(|&k| map.insert(k, t)).count()
                })
            })
            .collect();

        let wins: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(wins, 1_000);
        assert_eq!(map.len(), 1_000);
        for k in 0..1_000u64 {
            assert!(map.find(&k).unwrap() < THREADS);
        }
        println!("  ✓ exactly one insert won per key");
    }

    #[test]
    fn test_hash_map_concurrent_erase_single_winner() {
        println!("\n=== TEST: hash map erase race ===");
        let map = Arc::new(LockFreeHashMap::new());
        for k in 0..1_000u64 {
            map.insert(k, k * 10);
        }

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let map = Arc::clone(&map);
                thread::spawn(move || (0..1_000u64).filter(|k| map.erase(k)).count())
            })
            .collect();

        let erased: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(erased, 1_000);
        assert!(map.is_empty());
        assert_eq!(map.tombstones(), 1_000);
        println!("  ✓ exactly one erase won per key");
    }

    #[test]
    fn test_hash_map_readers_see_complete_values() {
        println!("\n=== TEST: hash map readers ===");
        let map = Arc::new(LockFreeHashMap::with_buckets(8));
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let map = Arc::clone(&map);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for k in 0..5_000u64 {
                    map.insert(k, format!("value-{}", k));
                    if k % 3 == 0 {
                        map.erase(&k);
                    }
                }
                done.store(true, Ordering::Release);
            })
        };

        let readers: Vec<_> = (0..THREADS)
            .map(|_| {
                let map = Arc::clone(&map);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        for k in (0..5_000u64).step_by(97) {
                            if let Some(v) = map.find(&k) {
                                assert_eq!(v, format!("value-{}", k));
                            }
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(map.len(), 5_000 - 1_667);
        println!("  ✓ readers never saw a partial value");
    }

    #[test]
    fn test_hash_map_interleaved_ops_on_shared_keys() {
        println!("\n=== TEST: hash map insert/find/erase on shared keys ===");
        const KEYS: u64 = 3;
        const ROUNDS: u64 = 2_000;
        // one bucket, so every key shares a chain
        let map = Arc::new(LockFreeHashMap::with_buckets(1));
        let barrier = Arc::new(Barrier::new(THREADS as usize));

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let map = Arc::clone(&map);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut inserted = Vec::new();
                    let mut found = Vec::new();
                    let mut erased = vec![0u64; KEYS as usize];
                    barrier.wait();
                    for i in 0..ROUNDS {
                        let key = i % KEYS;
                        let value = tag(t, i);
                        if map.insert(key, value) {
                            inserted.push((key, value));
                        }
                        if let Some(v) = map.find(&key) {
                            found.push((key, v));
                        }
                        // leave some keys live at the end
                        if (i + t) % 2 == 0 && map.erase(&key) {
                            erased[key as usize] += 1;
                        }
                    }
                    (inserted, found, erased)
                })
            })
            .collect();

        let mut inserted = HashSet::new();
        let mut found = Vec::new();
        let mut inserts_per_key = vec![0u64; KEYS as usize];
        let mut erases_per_key = vec![0u64; KEYS as usize];
        for worker in workers {
            let (ins, fnd, ers) = worker.join().unwrap();
            for (key, value) in ins {
                inserts_per_key[key as usize] += 1;
                assert!(inserted.insert((key, value)));
            }
            found.extend(fnd);
            for (key, n) in ers.into_iter().enumerate() {
                erases_per_key[key] += n;
            }
        }

        for (key, value) in &found {
            assert!(inserted.contains(&(*key, *value)), "found {:#x} that nobody inserted", value);
        }

        let mut live = 0;
        for key in 0..KEYS {
            let k = key as usize;
            // inserts and erases alternate per key
            let balance = inserts_per_key[k] - erases_per_key[k];
            assert!(balance <= 1, "key {} has {} inserts, {} erases", key, inserts_per_key[k], erases_per_key[k]);
            assert_eq!(map.contains_key(&key), balance == 1);
            live += balance as usize;
        }
        assert_eq!(map.len(), live);
        println!("  ✓ {} finds, all of inserted values; {} key(s) live", found.len(), live);
    }

    #[test]
    fn test_ref_counted_across_threads() {
        println!("\n=== TEST: ref-counted handle ===");
        struct Tracked(Arc<AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let shared = AtomicRefCounted::new(Tracked(Arc::clone(&drops)));

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let handle = shared.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        let copy = handle.clone();
                        assert!(AtomicRefCounted::ptr_eq(&copy, &handle));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(shared.use_count(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(shared);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        println!("  ✓ released exactly once");
    }
}
