//! One scheduler owns one worker thread and the coroutines pinned to it

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::queue::SegQueue;
use parking_lot::{Condvar, Mutex};

use crate::sched::coroutine::Coroutine;
use crate::sched::worker;

/// Shared half of one scheduler: the inbox other threads push ready
/// coroutines into and the parking state its worker sleeps on.
///
/// `enqueue` sets the pending flag under the lock and notifies after
/// releasing it; `park_until` consumes the flag under the same lock
/// before sleeping, so a wake can never be lost between the two.
pub(crate) struct Scheduler {
    /// Index of this scheduler in the runtime's table
    id: usize,
    /// Coroutines handed to this scheduler from any thread
    inbox: SegQueue<Arc<Coroutine>>,
    /// True while the inbox may hold work the worker has not seen
    pending: Mutex<bool>,
    /// Signalled whenever `pending` is set
    wakeup: Condvar,
    /// Set once by `begin_shutdown`
    shutdown: AtomicBool,
    /// Worker thread handle, taken on join
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub(crate) fn new(id: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            inbox: SegQueue::new(),
            pending: Mutex::new(false),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
            handle: Mutex::new(None),
        })
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Spawn the worker thread that drives this scheduler.
    pub(crate) fn start(self: &Arc<Self>) -> std::io::Result<()> {
        let sched = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("weft-sched-{}", self.id))
            .spawn(move || worker::run(sched))?;
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Hand a ready coroutine to this scheduler. Callable from any thread.
    pub(crate) fn enqueue(&self, co: Arc<Coroutine>) {
        self.inbox.push(co);
        let mut pending = self.pending.lock();
        *pending = true;
        drop(pending);
        self.wakeup.notify_one();
    }

    /// Next coroutine from the inbox, if any
    pub(crate) fn drain(&self) -> Option<Arc<Coroutine>> {
        self.inbox.pop()
    }

    /// Block the worker until new work arrives, the deadline passes, or
    /// shutdown begins. Consumes the pending flag so a wake that raced
    /// ahead of the park is seen instead of lost.
    pub(crate) fn park_until(&self, deadline: Option<Instant>) {
        let mut pending = self.pending.lock();
        if *pending {
            *pending = false;
            return;
        }
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }
        match deadline {
            Some(deadline) => {
                self.wakeup.wait_until(&mut pending, deadline);
            }
            None => self.wakeup.wait(&mut pending),
        }
        *pending = false;
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Ask the worker to exit. The pending flag doubles as the unpark
    /// signal so a worker sleeping in `park_until` notices immediately.
    pub(crate) fn begin_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let mut pending = self.pending.lock();
        *pending = true;
        drop(pending);
        self.wakeup.notify_one();
    }

    /// Wait for the worker thread to exit, giving up after `grace`.
    pub(crate) fn join(&self, grace: Duration) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let deadline = Instant::now() + grace;
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    log::warn!(
                        "scheduler {} did not stop within {:?}, detaching its worker",
                        self.id,
                        grace
                    );
                    return;
                }
                thread::sleep(Duration::from_millis(5));
            }
            if handle.join().is_err() {
                log::error!("scheduler {} worker thread panicked", self.id);
            }
        }
    }
}
