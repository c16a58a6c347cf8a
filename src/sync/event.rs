//! Event: a transient broadcast signal for coroutines

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::sched::coroutine::{WakeReason, WakeToken};
use crate::sched::worker;

#[derive(Default)]
struct EventState {
    /// Coroutines blocked in `wait`/`wait_timeout`, arrival order
    waiters: VecDeque<WakeToken>,
}

/// A broadcast wake-up signal.
///
/// [`signal`](Self::signal) wakes every coroutine waiting at that moment
/// and may be called from any thread. The signal itself is not stored: a
/// wait that starts after a signal blocks until the next one.
///
/// Clones share the same event.
#[derive(Clone, Default)]
pub struct Event {
    state: Arc<parking_lot::Mutex<EventState>>,
}

impl Event {
    /// Create an event with no waiters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block the calling coroutine until the next [`signal`](Self::signal).
    ///
    /// # Panics
    ///
    /// Panics when called outside a coroutine.
    pub fn wait(&self) {
        if !worker::in_coroutine() {
            panic!("Event::wait() may only be called from inside a coroutine");
        }
        worker::suspend_current(|token| {
            self.state.lock().waiters.push_back(token);
            true
        });
    }

    /// Block the calling coroutine until the next signal or until `dur`
    /// elapses. Returns `true` when signaled, `false` on timeout.
    ///
    /// # Panics
    ///
    /// Panics when called outside a coroutine.
    pub fn wait_timeout(&self, dur: Duration) -> bool {
        let co = match worker::current_coroutine() {
            Some(co) => co,
            None => panic!("Event::wait_timeout() may only be called from inside a coroutine"),
        };
        let deadline = Instant::now() + dur;
        let reason = worker::suspend_current(|token| {
            self.state.lock().waiters.push_back(token.clone());
            worker::register_timer(deadline, token);
            true
        });
        match reason {
            WakeReason::Woken => true,
            WakeReason::TimedOut => {
                // A signal may have drained the list already; removing by
                // id is then a no-op. The coroutine cannot be waiting
                // anywhere else while it runs this line.
                let mut state = self.state.lock();
                state.waiters.retain(|token| token.co_id() != co.id());
                false
            }
        }
    }

    /// Wake every coroutine currently waiting. Callable from any thread,
    /// never blocks, does nothing when nobody waits.
    pub fn signal(&self) {
        let mut state = self.state.lock();
        while let Some(token) = state.waiters.pop_front() {
            token.wake(WakeReason::Woken);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signalling_with_no_waiters_is_a_no_op() {
        let event = Event::new();
        event.signal();
        event.signal();
    }

    #[test]
    #[should_panic(expected = "inside a coroutine")]
    fn test_waiting_outside_a_coroutine_panics() {
        Event::new().wait();
    }

    #[test]
    #[should_panic(expected = "inside a coroutine")]
    fn test_timed_wait_outside_a_coroutine_panics() {
        Event::new().wait_timeout(Duration::from_millis(1));
    }
}
