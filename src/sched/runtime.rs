//! Process-wide runtime: the scheduler table and the operations behind
//! the crate facade

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;

use crate::config;
use crate::sched::coroutine::{Coroutine, WakeReason, WakeToken};
use crate::sched::scheduler::Scheduler;
use crate::sched::worker;

/// How long `stop` waits for each worker thread before detaching it
const STOP_GRACE: Duration = Duration::from_secs(2);

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Error returned by [`try_go`](crate::try_go) when a coroutine cannot
/// be started.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The runtime has been stopped and accepts no new coroutines
    #[error("scheduler runtime is stopped")]
    Stopped,
    /// A scheduler worker thread could not be spawned
    #[error("failed to spawn scheduler thread: {0}")]
    Thread(#[from] std::io::Error),
}

struct Runtime {
    scheds: Vec<Arc<Scheduler>>,
    /// Round-robin cursor for assigning new coroutines
    next: AtomicUsize,
    stopped: AtomicBool,
}

impl Runtime {
    fn boot() -> std::io::Result<Self> {
        let count = config::config().schedulers();
        let scheds: Vec<_> = (0..count).map(Scheduler::new).collect();
        for sched in &scheds {
            if let Err(err) = sched.start() {
                // A failed boot leaves no workers behind.
                log::error!("scheduler {} failed to start: {err}", sched.id());
                for sched in &scheds {
                    sched.begin_shutdown();
                }
                for sched in &scheds {
                    sched.join(STOP_GRACE);
                }
                return Err(err);
            }
        }
        log::debug!("runtime started with {} scheduler(s)", count);
        Ok(Self {
            scheds,
            next: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        })
    }

    fn pick(&self) -> &Arc<Scheduler> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.scheds.len();
        &self.scheds[index]
    }
}

fn runtime() -> Result<&'static Runtime, SpawnError> {
    let rt = RUNTIME.get_or_try_init(Runtime::boot)?;
    Ok(rt)
}

/// Start `f` as a coroutine, reporting failure to the caller.
pub(crate) fn try_go<F>(f: F) -> Result<(), SpawnError>
where
    F: FnOnce() + Send + 'static,
{
    let rt = runtime()?;
    if rt.stopped.load(Ordering::Acquire) {
        return Err(SpawnError::Stopped);
    }
    let sched = rt.pick();
    let co = Coroutine::spawn(sched.id(), f);
    log::trace!("spawned {} on scheduler {}", co.id(), sched.id());
    sched.enqueue(co);
    Ok(())
}

/// Start `f` as a coroutine. Failures are logged and the closure dropped.
pub(crate) fn go<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    if let Err(err) = try_go(f) {
        log::warn!("coroutine not started: {err}");
    }
}

/// Hand a woken coroutine back to its home scheduler. After `stop` the
/// inboxes are never drained again, so the coroutine is simply abandoned
/// along with the rest of the pending work.
pub(crate) fn requeue(co: Arc<Coroutine>) {
    if let Some(rt) = RUNTIME.get() {
        rt.scheds[co.home()].enqueue(co);
    }
}

/// Suspend the calling coroutine for `dur`. On a non-worker thread this
/// degrades to a plain thread sleep.
pub(crate) fn sleep(dur: Duration) {
    if worker::in_coroutine() {
        let deadline = Instant::now() + dur;
        worker::suspend_current(|token| {
            worker::register_timer(deadline, token);
            true
        });
    } else {
        std::thread::sleep(dur);
    }
}

/// Stop all schedulers, abandoning coroutines that have not finished.
pub(crate) fn stop() {
    let rt = match RUNTIME.get() {
        Some(rt) => rt,
        None => return,
    };
    if rt.stopped.swap(true, Ordering::AcqRel) {
        return;
    }
    log::debug!("stopping {} scheduler(s)", rt.scheds.len());
    for sched in &rt.scheds {
        sched.begin_shutdown();
    }
    let own = worker::current_scheduler_id();
    for sched in &rt.scheds {
        if Some(sched.id()) == own {
            // Called from a coroutine: its own worker exits once this
            // call returns and the coroutine yields or finishes.
            continue;
        }
        sched.join(STOP_GRACE);
    }
}

pub(crate) fn sched_id() -> i32 {
    match worker::current_scheduler_id() {
        Some(id) => id as i32,
        None => -1,
    }
}

pub(crate) fn coroutine_id() -> i64 {
    match worker::current_coroutine() {
        Some(co) => co.id().as_i64(),
        None => -1,
    }
}

/// Number of schedulers. Boots the runtime so the answer stays stable
/// for the lifetime of the process; pool slot tables are sized off it.
pub(crate) fn max_sched_num() -> usize {
    match runtime() {
        Ok(rt) => rt.scheds.len(),
        Err(_) => config::config().schedulers(),
    }
}

/// Handle for waking a parked coroutine, cloneable and usable from any
/// thread. Handed out by [`park`](crate::park).
#[derive(Clone, Debug)]
pub struct Waker {
    token: WakeToken,
}

impl Waker {
    /// Wake the parked coroutine.
    ///
    /// Returns `true` when this call performed the wake. A duplicate
    /// wake, a wake racing a clone, or a wake after the coroutine has
    /// moved on returns `false` and does nothing.
    pub fn wake(&self) -> bool {
        self.token.wake(WakeReason::Woken)
    }
}

/// Suspend the calling coroutine until a [`Waker`] handed to `register`
/// is invoked.
///
/// `register` runs before the suspension takes effect, so a wake
/// delivered while it is still executing is not lost.
///
/// # Panics
///
/// Panics when called outside a coroutine.
pub(crate) fn park<F>(register: F)
where
    F: FnOnce(Waker),
{
    if !worker::in_coroutine() {
        panic!("park() may only be called from inside a coroutine");
    }
    worker::suspend_current(|token| {
        register(Waker { token });
        true
    });
}
