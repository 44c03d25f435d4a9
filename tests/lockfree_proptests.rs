// Single-threaded model checks for the lock-free containers.
//
// Each property drives a container and a std collection with the same random
// operation sequence and compares every observable result:
//  - stack vs Vec (push/pop at the end)
//  - queue vs VecDeque (push_back/pop_front)
//  - hash map vs HashMap, with insert refusing duplicates and erase tombstoning
//  - SPSC ring vs VecDeque bounded to N - 1
use atomkit::lockfree::{LockFreeHashMap, LockFreeQueue, LockFreeStack, SpscRingBuffer};
use proptest::prelude::*;
use std::collections::{HashMap, VecDeque};

proptest! {
    #[test]
    fn prop_stack_matches_vec(ops in proptest::collection::vec(proptest::option::of(any::<i32>()), 1..200)) {
        let stack = LockFreeStack::new();
        let mut model = Vec::new();

        for op in ops {
            match op {
                Some(v) => {
                    stack.push(v);
                    model.push(v);
                }
                None => prop_assert_eq!(stack.pop(), model.pop()),
            }
            prop_assert_eq!(stack.is_empty(), model.is_empty());
        }
    }

    #[test]
    fn prop_queue_matches_vecdeque(ops in proptest::collection::vec(proptest::option::of(any::<i32>()), 1..200)) {
        let queue = LockFreeQueue::new();
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                Some(v) => {
                    queue.enqueue(v);
                    model.push_back(v);
                }
                None => prop_assert_eq!(queue.dequeue(), model.pop_front()),
            }
            prop_assert_eq!(queue.is_empty(), model.is_empty());
        }
    }

    #[test]
    fn prop_hash_map_matches_hashmap(
        buckets in 1usize..=8,
        ops in proptest::collection::vec((0u8..=3u8, 0u16..32u16, any::<u32>()), 1..200),
    ) {
        let mut map = LockFreeHashMap::with_buckets(buckets);
        let mut model: HashMap<u16, u32> = HashMap::new();

        for (op, key, value) in ops {
            match op {
                // insert keeps the first value for a live key
                0 => {
                    let fresh = !model.contains_key(&key);
                    if fresh {
                        model.insert(key, value);
                    }
                    prop_assert_eq!(map.insert(key, value), fresh);
                }
                1 => prop_assert_eq!(map.find(&key), model.get(&key).copied()),
                2 => prop_assert_eq!(map.erase(&key), model.remove(&key).is_some()),
                // compaction must not change what is visible
                3 => {
                    let tombstones = map.tombstones();
                    prop_assert_eq!(map.purge_tombstones(), tombstones);
                    prop_assert_eq!(map.tombstones(), 0);
                }
                _ => unreachable!(),
            }
            prop_assert_eq!(map.len(), model.len());
            prop_assert_eq!(map.contains_key(&key), model.contains_key(&key));
        }

        for (key, value) in &model {
            prop_assert_eq!(map.find(key), Some(*value));
        }
    }

    #[test]
    fn prop_ring_matches_bounded_vecdeque(ops in proptest::collection::vec(proptest::option::of(any::<u8>()), 1..300)) {
        let (mut producer, mut consumer) = SpscRingBuffer::<u8, 8>::new().split();
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                Some(v) => {
                    let result = producer.push(v);
                    if model.len() < 7 {
                        model.push_back(v);
                        prop_assert_eq!(result, Ok(()));
                    } else {
                        prop_assert_eq!(result, Err(v));
                    }
                }
                None => prop_assert_eq!(consumer.pop(), model.pop_front()),
            }
            prop_assert_eq!(consumer.len(), model.len());
            prop_assert_eq!(producer.is_full(), model.len() == 7);
        }
    }
}
