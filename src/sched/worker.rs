//! Dispatch loop and thread-local context of a worker thread

use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::time::Instant;

use crate::sched::coroutine::{CoState, Coroutine, WakeReason, WakeToken};
use crate::sched::scheduler::Scheduler;
use crate::sched::timer::{TimerEntry, TimerQueue};

/// Per-thread dispatch state. Only worker threads ever hold a scheduler;
/// on every other thread the context stays empty.
#[derive(Default)]
struct WorkerContext {
    sched: Option<Arc<Scheduler>>,
    current: Option<Arc<Coroutine>>,
    timers: TimerQueue,
}

thread_local! {
    static CONTEXT: RefCell<WorkerContext> = RefCell::new(WorkerContext::default());
}

/// Worker thread main: drive `sched` until shutdown.
pub(crate) fn run(sched: Arc<Scheduler>) {
    CONTEXT.with(|ctx| ctx.borrow_mut().sched = Some(Arc::clone(&sched)));
    let mut ready: VecDeque<Arc<Coroutine>> = VecDeque::new();

    while !sched.is_shutdown() {
        while let Some(co) = sched.drain() {
            ready.push_back(co);
        }
        fire_due_timers(&mut ready);

        match ready.pop_front() {
            Some(co) => run_one(co),
            None => {
                let deadline = CONTEXT.with(|ctx| ctx.borrow().timers.next_deadline());
                sched.park_until(deadline);
            }
        }
    }
    teardown(ready);
}

fn run_one(co: Arc<Coroutine>) {
    co.set_state(CoState::Running);
    CONTEXT.with(|ctx| ctx.borrow_mut().current = Some(Arc::clone(&co)));
    let done = co.run_slice();
    CONTEXT.with(|ctx| ctx.borrow_mut().current = None);
    if done {
        co.set_state(CoState::Done);
    }
}

fn fire_due_timers(ready: &mut VecDeque<Arc<Coroutine>>) {
    loop {
        // Redeem outside the borrow: waking is shared-state work, the
        // context borrow is only for the heap itself.
        let due = CONTEXT.with(|ctx| ctx.borrow_mut().timers.pop_due(Instant::now()));
        match due {
            Some(token) => {
                if let Some(co) = token.redeem(WakeReason::TimedOut) {
                    ready.push_back(co);
                }
            }
            None => break,
        }
    }
}

/// Drop abandoned work with the context borrow released. Tearing down a
/// suspended coroutine cancels its generator, and the unwind can run drop
/// glue that reads this same thread-local.
fn teardown(ready: VecDeque<Arc<Coroutine>>) {
    let timers = CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        ctx.current = None;
        ctx.sched = None;
        mem::take(&mut ctx.timers)
    });
    if !timers.is_empty() || !ready.is_empty() {
        log::debug!(
            "worker exiting with {} timer(s) and {} coroutine(s) pending",
            timers.len(),
            ready.len()
        );
    }
    drop(timers);
    drop(ready);
}

/// True when called from inside a coroutine
pub(crate) fn in_coroutine() -> bool {
    CONTEXT.with(|ctx| ctx.borrow().current.is_some())
}

pub(crate) fn current_coroutine() -> Option<Arc<Coroutine>> {
    CONTEXT.with(|ctx| ctx.borrow().current.clone())
}

pub(crate) fn current_scheduler_id() -> Option<usize> {
    CONTEXT.with(|ctx| ctx.borrow().sched.as_ref().map(|sched| sched.id()))
}

/// Suspend the running coroutine until one of its wake tokens is redeemed.
///
/// `register` runs before the yield, while the coroutine still occupies
/// the worker; it hands the token to whoever will perform the wake. A
/// token redeemed during registration only enqueues the coroutine on this
/// scheduler's inbox, so the slot is picked up after the yield, never
/// re-entered. Returning `false` from `register` rolls the suspension
/// back without yielding, for the path where the awaited condition was
/// already satisfied.
///
/// # Panics
///
/// Panics when no coroutine is running on this thread.
pub(crate) fn suspend_current<F>(register: F) -> WakeReason
where
    F: FnOnce(WakeToken) -> bool,
{
    let co = match current_coroutine() {
        Some(co) => co,
        None => panic!("coroutine suspension outside a scheduler thread"),
    };
    let ticket = co.begin_suspend();
    let token = WakeToken::new(Arc::clone(&co), ticket);
    if !register(token) {
        co.cancel_suspend();
        return WakeReason::Woken;
    }
    // The plain yield targets the innermost generator, which on a worker
    // is always the running coroutine itself. Scoped yields cannot
    // suspend from arbitrary call depth.
    #[allow(deprecated)]
    generator::yield_with(());
    co.wake_reason()
}

/// Arm a timer on this worker for the suspension `token` belongs to.
pub(crate) fn register_timer(deadline: Instant, token: WakeToken) {
    CONTEXT.with(|ctx| ctx.borrow_mut().timers.push(TimerEntry::new(deadline, token)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_threads_have_no_coroutine_context() {
        assert!(!in_coroutine());
        assert!(current_coroutine().is_none());
        assert!(current_scheduler_id().is_none());
    }

    #[test]
    #[should_panic(expected = "outside a scheduler thread")]
    fn test_suspending_outside_a_worker_panics() {
        suspend_current(|_token| true);
    }
}
