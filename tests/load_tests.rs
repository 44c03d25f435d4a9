#[cfg(test)]
mod tests {
    use atomkit::{
        coro::SchedulerHandle,
        lockfree::{LockFreeHashMap, LockFreeQueue, LockFreeStack},
        pool::{BasicPool, Config, PriorityPool, WorkStealingPool},
        Priority,
    };
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::{Duration, Instant},
    };


    fn measure<F, T>(name: &str, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        println!("✓ {}: {:?}", name, elapsed);
        result
    }

    #[test]
    fn load_test_1_small_fast_tasks() {
        println!("\n=== LOAD TEST 1: 10k fast tasks on every pool ===");
        let basic = BasicPool::with_config(Config::cpu_bound()).unwrap();
        let priority = PriorityPool::with_config(Config::cpu_bound()).unwrap();
        let stealing = WorkStealingPool::with_config(Config::cpu_bound()).unwrap();

        let sum: u64 = measure("basic: 10k tasks", || {
            let handles: Vec<_> = (0..10_000u64).map(|i| basic.submit(move || i * 2)).collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(sum, 2 * (0..10_000u64).sum::<u64>());

        let sum: u64 = measure("priority: 10k tasks", || {
            let handles: Vec<_> = (0..10_000u64)
                .map(|i| {
                    let level = [Priority::Low, Priority::Normal, Priority::High][(i % 3) as usize];
                    priority.submit_with_priority(level, move || i * 2)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(sum, 2 * (0..10_000u64).sum::<u64>());

        let sum: u64 = measure("work-stealing: 10k tasks", || {
            let handles: Vec<_> = (0..10_000u64).map(|i| stealing.submit(move || i * 2)).collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(sum, 2 * (0..10_000u64).sum::<u64>());

        for metrics in [basic.metrics(), priority.metrics(), stealing.metrics()] {
            assert_eq!(metrics.completed_tasks, 10_000);
            println!("  Success rate: {:.1}%", metrics.success_rate() * 100.0);
        }
    }

    #[test]
    fn load_test_2_uneven_blocking_tasks() {
        println!("\n=== LOAD TEST 2: 400 uneven blocking tasks ===");
        let pool = WorkStealingPool::with_config(Config::with_threads(4)).unwrap();

        let results: Vec<u64> = measure("400 tasks @ 0-4ms", || {
            let handles: Vec<_> = (0..400u64)
                .map(|i| {
                    pool.submit(move || {
                        thread::sleep(Duration::from_millis(i % 5));
                        i * i
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.len(), 400);
        pool.wait_idle();
        let metrics = pool.metrics();
        println!("  Completed: {}/{}", metrics.completed_tasks, results.len());
        println!("  Utilization: {:.1}%", metrics.utilization() * 100.0);
    }

    #[test]
    fn load_test_3_containers_from_pool() {
        println!("\n=== LOAD TEST 3: containers fed from a pool ===");
        let pool = BasicPool::with_config(Config::io_bound()).unwrap();
        let stack = Arc::new(LockFreeStack::new());
        let queue = Arc::new(LockFreeQueue::new());
        let map = Arc::new(LockFreeHashMap::with_buckets(256));

        measure("50k pushes, enqueues and inserts", || {
            let handles: Vec<_> = (0..50u64)
                .map(|chunk| {
                    let stack = Arc::clone(&stack);
                    let queue = Arc::clone(&queue);
                    let map = Arc::clone(&map);
                    pool.submit(move || {
                        for i in chunk * 1_000..(chunk + 1) * 1_000 {
                            stack.push(i);
                            queue.enqueue(i);
                            map.insert(i, i);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        });

        assert_eq!(map.len(), 50_000);
        let mut popped: Vec<u64> = std::iter::from_fn(|| stack.pop()).collect();
        let mut dequeued: Vec<u64> = std::iter::from_fn(|| queue.dequeue()).collect();
        popped.sort_unstable();
        dequeued.sort_unstable();
        assert_eq!(popped, (0..50_000).collect::<Vec<_>>());
        assert_eq!(popped, dequeued);
    }

    #[test]
    fn load_test_4_many_coroutines() {
        println!("\n=== LOAD TEST 4: 2k coroutines with delays ===");
        let scheduler = SchedulerHandle::from_pool(WorkStealingPool::new(4).unwrap());
        let resumed = Arc::new(AtomicUsize::new(0));

        let total: usize = measure("2k tasks @ 1ms delay", || {
            let tasks: Vec<_> = (0..2_000usize)
                .map(|i| {
                    let bg = scheduler.clone();
                    let resumed = Arc::clone(&resumed);
                    scheduler.spawn(async move {
                        bg.switch_to_background().await;
                        if i % 10 == 0 {
                            bg.delay(Duration::from_millis(1)).await;
                        }
                        resumed.fetch_add(1, Ordering::Relaxed);
                        i
                    })
                })
                .collect();
            tasks.into_iter().map(|t| t.join().unwrap()).sum()
        });

        assert_eq!(total, (0..2_000).sum::<usize>());
        assert_eq!(resumed.load(Ordering::Relaxed), 2_000);
    }
}
