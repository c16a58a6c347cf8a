//! Coroutine identity, state, and the wake-ticket protocol

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use generator::{Generator, Gn};
use parking_lot::Mutex;

use crate::config;
use crate::sched::runtime;

/// Unique identifier for a coroutine
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CoId(u64);

static NEXT_CO_ID: AtomicU64 = AtomicU64::new(1);

impl CoId {
    /// Generate a new unique id
    pub(crate) fn new() -> Self {
        CoId(NEXT_CO_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value as surfaced by `coroutine_id()`
    pub(crate) fn as_i64(self) -> i64 {
        self.0 as i64
    }
}

impl fmt::Display for CoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "co-{}", self.0)
    }
}

/// State of a coroutine
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CoState {
    /// Queued on its scheduler, not running
    Ready,
    /// Executing on its owning worker thread
    Running,
    /// Off-CPU, reachable only through wake tokens
    Suspended,
    /// Closure returned; terminal
    Done,
}

/// What ended a suspension
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum WakeReason {
    /// An explicit wake: event signal, mutex hand-off, or waker
    Woken,
    /// The timer entry registered for this suspension fired
    TimedOut,
}

/// A lightweight coroutine pinned to one scheduler.
///
/// The user closure runs inside a stackful generator; suspending yields
/// back to the dispatch loop, resuming re-enters the generator. Only the
/// owning scheduler's worker thread ever calls [`run_slice`](Self::run_slice).
pub(crate) struct Coroutine {
    /// Unique identifier
    id: CoId,
    /// Index of the owning scheduler; never changes
    home: usize,
    /// Current state
    state: AtomicCell<CoState>,
    /// Wake ticket counter, incremented once per consumed suspension
    wake_seq: AtomicU64,
    /// Why the last suspension ended
    wake_reason: AtomicCell<WakeReason>,
    /// The generator running the user closure; released on Done
    gen: Mutex<Option<Generator<'static, (), ()>>>,
}

impl Coroutine {
    /// Build a coroutine around `f`, pinned to scheduler `home`.
    pub(crate) fn spawn<F>(home: usize, f: F) -> Arc<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = CoId::new();
        let stack_words = config::config().stack_size();
        let gen: Generator<'static, (), ()> = Gn::new_opt(stack_words, move || {
            if let Err(cause) = panic::catch_unwind(AssertUnwindSafe(f)) {
                if cause.downcast_ref::<generator::Error>().is_some() {
                    // cancellation unwind from a dropped generator, keep it going
                    panic::resume_unwind(cause);
                }
                log::error!("coroutine {} panicked: {}", id, panic_message(cause.as_ref()));
            }
        });
        Arc::new(Self {
            id,
            home,
            state: AtomicCell::new(CoState::Ready),
            wake_seq: AtomicU64::new(0),
            wake_reason: AtomicCell::new(WakeReason::Woken),
            gen: Mutex::new(Some(gen)),
        })
    }

    pub(crate) fn id(&self) -> CoId {
        self.id
    }

    pub(crate) fn home(&self) -> usize {
        self.home
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> CoState {
        self.state.load()
    }

    pub(crate) fn set_state(&self, state: CoState) {
        self.state.store(state);
    }

    pub(crate) fn wake_reason(&self) -> WakeReason {
        self.wake_reason.load()
    }

    /// Resume until the next yield. Returns `true` when the closure has
    /// returned; the generator (and its stack) is released right away.
    pub(crate) fn run_slice(&self) -> bool {
        let mut slot = self.gen.lock();
        let done = match slot.as_mut() {
            Some(gen) => {
                gen.resume();
                gen.is_done()
            }
            None => true,
        };
        if done {
            *slot = None;
        }
        done
    }

    /// Mark the coroutine suspended and snapshot the ticket that exactly
    /// one waker may consume.
    pub(crate) fn begin_suspend(&self) -> u64 {
        self.state.store(CoState::Suspended);
        self.wake_seq.load(Ordering::Acquire)
    }

    /// Roll back a suspension that never yielded, invalidating any token
    /// minted for it.
    pub(crate) fn cancel_suspend(&self) {
        self.wake_seq.fetch_add(1, Ordering::AcqRel);
        self.state.store(CoState::Running);
    }

    fn consume_ticket(&self, ticket: u64) -> bool {
        self.wake_seq
            .compare_exchange(ticket, ticket.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &self.id)
            .field("home", &self.home)
            .field("state", &self.state.load())
            .finish()
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    if let Some(message) = cause.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// One-shot claim on waking a suspended coroutine.
///
/// Clones share the same ticket: across all of them, at most one redeem
/// succeeds per suspension. A token left over from an earlier suspension
/// can never wake a later one.
#[derive(Clone)]
pub(crate) struct WakeToken {
    co: Arc<Coroutine>,
    ticket: u64,
}

impl WakeToken {
    pub(crate) fn new(co: Arc<Coroutine>, ticket: u64) -> Self {
        Self { co, ticket }
    }

    pub(crate) fn co_id(&self) -> CoId {
        self.co.id
    }

    /// Claim the wake. Returns the coroutine marked Ready, or `None` when
    /// another waker got there first or the coroutine has moved on.
    pub(crate) fn redeem(&self, reason: WakeReason) -> Option<Arc<Coroutine>> {
        if self.co.consume_ticket(self.ticket) {
            self.co.wake_reason.store(reason);
            self.co.set_state(CoState::Ready);
            Some(Arc::clone(&self.co))
        } else {
            None
        }
    }

    /// Claim the wake and hand the coroutine back to its home scheduler.
    /// Returns `false` when the claim was already consumed.
    pub(crate) fn wake(&self, reason: WakeReason) -> bool {
        match self.redeem(reason) {
            Some(co) => {
                runtime::requeue(co);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for WakeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WakeToken")
            .field("coroutine", &self.co.id)
            .field("ticket", &self.ticket)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let a = CoId::new();
        let b = CoId::new();
        assert_ne!(a, b);
        assert!(b.as_i64() > a.as_i64());
    }

    #[test]
    fn test_run_slice_completes_a_plain_closure() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let co = Coroutine::spawn(0, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(co.state(), CoState::Ready);
        assert!(co.run_slice());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        // the generator slot is empty once the closure returned
        assert!(co.run_slice());
    }

    #[test]
    fn test_tickets_allow_exactly_one_wake() {
        let co = Coroutine::spawn(0, || {});
        let ticket = co.begin_suspend();
        let first = WakeToken::new(Arc::clone(&co), ticket);
        let second = first.clone();

        assert!(first.redeem(WakeReason::Woken).is_some());
        assert!(second.redeem(WakeReason::TimedOut).is_none());
        assert_eq!(co.state(), CoState::Ready);
        assert_eq!(co.wake_reason(), WakeReason::Woken);
    }

    #[test]
    fn test_stale_ticket_cannot_wake_a_later_suspension() {
        let co = Coroutine::spawn(0, || {});
        let stale = WakeToken::new(Arc::clone(&co), co.begin_suspend());
        assert!(stale.redeem(WakeReason::Woken).is_some());

        let fresh = WakeToken::new(Arc::clone(&co), co.begin_suspend());
        assert!(stale.redeem(WakeReason::TimedOut).is_none());
        assert!(fresh.redeem(WakeReason::Woken).is_some());
    }

    #[test]
    fn test_cancelled_suspension_invalidates_its_token() {
        let co = Coroutine::spawn(0, || {});
        let token = WakeToken::new(Arc::clone(&co), co.begin_suspend());
        co.cancel_suspend();
        assert_eq!(co.state(), CoState::Running);
        assert!(token.redeem(WakeReason::Woken).is_none());
    }

    #[test]
    fn test_panicking_closure_still_finishes() {
        let co = Coroutine::spawn(0, || panic!("boom"));
        assert!(co.run_slice());
    }
}
