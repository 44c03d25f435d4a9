use atomkit::{
    coro::{Generator, SchedulerHandle},
    BasicPool, Config, LockFreeHashMap, LockFreeQueue, LockFreeStack, PoolError, Priority,
    PriorityPool, SpscRingBuffer, WorkStealingPool,
};
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};


fn main() -> Result<(), PoolError> {
    env_logger::init();

    let now = Instant::now();
    let pool = WorkStealingPool::with_config(Config::cpu_bound())?;
    let stack = Arc::new(LockFreeStack::new());
    let queue = Arc::new(LockFreeQueue::new());
    let handles: Vec<_> = (0..100_000u64)
        .map(|i| {
            let stack = Arc::clone(&stack);
            let queue = Arc::clone(&queue);
            pool.submit(move || {
                stack.push(i);
                queue.enqueue(i);
            })
        })
        .collect();
    for handle in handles {
        let _ = handle.join();
    }
    let mut drained = 0;
    while stack.pop().is_some() && queue.dequeue().is_some() {
        drained += 1;
    }
    println!("work-stealing: {} items through stack and queue in {:?}", drained, now.elapsed());
    println!("  {}", pool.metrics());
    pool.shutdown();

    let map = LockFreeHashMap::new();
    for word in ["alpha", "beta", "gamma", "beta"] {
        println!("insert {:<6} -> {}", word, map.insert(word, word.len()));
    }
    map.erase("alpha");
    println!("map: {:?}, find(beta) = {:?}", map, map.find("beta"));

    let (mut producer, mut consumer) = SpscRingBuffer::<u32, 8>::new().split();
    let writer = thread::spawn(move || {
        for i in 0..32 {
            while producer.push(i).is_err() {
                thread::yield_now();
            }
        }
    });
    let mut received = Vec::new();
    while received.len() < 32 {
        match consumer.pop() {
            Some(v) => received.push(v),
            None => thread::yield_now(),
        }
    }
    let _ = writer.join();
    println!("ring: received {:?}", received);

    let priority = PriorityPool::new(1)?;
    let order: Vec<_> = [Priority::Low, Priority::High, Priority::Normal]
        .into_iter()
        .map(|p| priority.submit_with_priority(p, move || p))
        .collect();
    for handle in order {
        println!("priority task finished: {:?}", handle.join());
    }

    let scheduler = SchedulerHandle::from_pool(BasicPool::new(2)?);
    let bg = scheduler.clone();
    let task = scheduler.spawn(async move {
        let caller = thread::current().name().map(str::to_owned);
        bg.switch_to_background().await;
        bg.delay(Duration::from_millis(20)).await;
        (caller, thread::current().name().map(str::to_owned))
    });
    println!("task moved threads: {:?}", task.join());

    let squares: Vec<u64> = Generator::new(|co| async move {
        for i in 1..=5u64 {
            co.yield_(i * i).await;
        }
    })
    .collect();
    println!("generator: {:?}", squares);

    Ok(())
}
