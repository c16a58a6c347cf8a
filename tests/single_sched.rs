//! Deterministic scheduling tests on a single scheduler.
//!
//! Every test pins the runtime to one scheduler before anything can boot
//! it, so dispatch order and mutex hand-off order are exact.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Poll `cond` until it holds or `timeout` elapses.
fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Must run before anything boots the runtime; every test in this file
/// starts with it, so whichever runs first pins the count.
fn use_one_scheduler() {
    weft::config().set_schedulers(1);
}

#[test]
fn test_everything_runs_on_the_only_scheduler() {
    use_one_scheduler();
    let distinct = Arc::new(Mutex::new(Vec::new()));
    let started = Arc::new(AtomicUsize::new(0));

    for _ in 0..8 {
        let distinct = Arc::clone(&distinct);
        let started = Arc::clone(&started);
        weft::go(move || {
            distinct.lock().unwrap().push(weft::sched_id());
            started.fetch_add(1, Ordering::SeqCst);
        });
    }

    assert!(wait_until(Duration::from_secs(5), || {
        started.load(Ordering::SeqCst) == 8
    }));
    assert_eq!(weft::max_sched_num(), 1);
    assert!(distinct.lock().unwrap().iter().all(|&id| id == 0));
}

#[test]
fn test_dispatch_interleaves_at_suspension_points() {
    use_one_scheduler();
    let order = Arc::new(Mutex::new(Vec::new()));

    let trace = Arc::clone(&order);
    weft::go(move || {
        trace.lock().unwrap().push("a1");
        weft::sleep_ms(30);
        trace.lock().unwrap().push("a2");
    });
    let trace = Arc::clone(&order);
    weft::go(move || {
        trace.lock().unwrap().push("b1");
        weft::sleep_ms(60);
        trace.lock().unwrap().push("b2");
    });

    assert!(wait_until(Duration::from_secs(5), || {
        order.lock().unwrap().len() == 4
    }));
    assert_eq!(*order.lock().unwrap(), vec!["a1", "b1", "a2", "b2"]);
}

#[test]
fn test_mutex_handoff_order_is_exact() {
    use_one_scheduler();
    let mutex = weft::Mutex::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let holder = mutex.clone();
    let trace = Arc::clone(&order);
    weft::go(move || {
        holder.lock();
        trace.lock().unwrap().push("first");
        weft::sleep_ms(300);
        holder.unlock();
    });

    // One scheduler dispatches in spawn order, so the contenders arrive
    // at the lock in exactly this order while the holder sleeps.
    for name in ["second", "third", "fourth"] {
        let contender = mutex.clone();
        let trace = Arc::clone(&order);
        weft::go(move || {
            contender.lock();
            trace.lock().unwrap().push(name);
            contender.unlock();
        });
    }

    assert!(wait_until(Duration::from_secs(10), || {
        order.lock().unwrap().len() == 4
    }));
    assert_eq!(
        *order.lock().unwrap(),
        vec!["first", "second", "third", "fourth"]
    );
}

#[test]
fn test_pool_hands_back_the_cached_element() {
    use_one_scheduler();
    let created = Arc::new(AtomicUsize::new(0));
    let tally = Arc::clone(&created);
    let pool = weft::Pool::builder()
        .create(move || tally.fetch_add(1, Ordering::SeqCst) + 1)
        .build();

    // -1 pending, 1 pass
    let outcome = Arc::new(AtomicI32::new(-1));
    let slot = Arc::clone(&outcome);
    let counter = Arc::clone(&created);
    weft::go(move || {
        let first = pool.pop();
        pool.push(first.unwrap());
        let second = pool.pop();
        let reused = second == Some(1) && counter.load(Ordering::SeqCst) == 1;
        slot.store(i32::from(reused), Ordering::SeqCst);
    });

    assert!(wait_until(Duration::from_secs(5), || {
        outcome.load(Ordering::SeqCst) != -1
    }));
    assert_eq!(outcome.load(Ordering::SeqCst), 1);
}

#[test]
fn test_pool_capacity_destroys_the_overflow() {
    use_one_scheduler();
    let destroyed = Arc::new(AtomicUsize::new(0));
    let tally = Arc::clone(&destroyed);
    let pool = weft::Pool::<String>::builder()
        .destroy(move |_item| {
            tally.fetch_add(1, Ordering::SeqCst);
        })
        .capacity(1)
        .build();

    let finished = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&finished);
    let shared = pool.clone();
    weft::go(move || {
        shared.push("kept".to_string());
        shared.push("overflow".to_string());
        shared.push("overflow too".to_string());
        flag.store(1, Ordering::SeqCst);
    });

    assert!(wait_until(Duration::from_secs(5), || {
        finished.load(Ordering::SeqCst) == 1
    }));
    assert_eq!(destroyed.load(Ordering::SeqCst), 2);

    // The one cached element survives; popping it leaves the pool empty.
    let drained = Arc::new(AtomicI32::new(-1));
    let slot = Arc::clone(&drained);
    weft::go(move || {
        let cached = pool.pop();
        let emptied = cached.as_deref() == Some("kept") && pool.pop().is_none();
        slot.store(i32::from(emptied), Ordering::SeqCst);
    });
    assert!(wait_until(Duration::from_secs(5), || {
        drained.load(Ordering::SeqCst) != -1
    }));
    assert_eq!(drained.load(Ordering::SeqCst), 1);
}
