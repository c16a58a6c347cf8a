//! Shutdown is final for the whole process, so this file holds exactly
//! one test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
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

#[test]
fn test_stop_joins_workers_and_rejects_new_work() {
    let ran = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&ran);
    weft::go(move || {
        flag.store(1, Ordering::SeqCst);
    });
    assert!(wait_until(Duration::from_secs(5), || {
        ran.load(Ordering::SeqCst) == 1
    }));

    // Park a few coroutines deep in sleeps; stop abandons them.
    let abandoned = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let abandoned = Arc::clone(&abandoned);
        weft::go(move || {
            weft::sleep(Duration::from_secs(600));
            abandoned.fetch_add(1, Ordering::SeqCst);
        });
    }
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    weft::stop();
    assert!(started.elapsed() < Duration::from_secs(3));

    // A second stop returns right away.
    weft::stop();

    match weft::try_go(|| {}) {
        Err(weft::SpawnError::Stopped) => {}
        other => panic!("expected the stopped error, got {other:?}"),
    }

    // The logging variant drops the closure on the floor.
    let after_stop = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&after_stop);
    weft::go(move || {
        flag.store(1, Ordering::SeqCst);
    });
    thread::sleep(Duration::from_millis(100));
    assert_eq!(after_stop.load(Ordering::SeqCst), 0);

    // The sleepers never finished.
    assert_eq!(abandoned.load(Ordering::SeqCst), 0);
}
