//! Coroutine mutex with FIFO hand-off

use std::collections::VecDeque;
use std::sync::Arc;

use crate::sched::coroutine::{WakeReason, WakeToken};
use crate::sched::worker;
use crate::sync::guard::MutexGuard;

#[derive(Default)]
struct MutexState {
    /// Whether some coroutine currently owns the mutex
    held: bool,
    /// Coroutines blocked in `lock`, arrival order
    waiters: VecDeque<WakeToken>,
}

/// A mutual-exclusion lock for coroutines.
///
/// Only [`lock`](Self::lock) suspends; [`try_lock`](Self::try_lock) and
/// [`unlock`](Self::unlock) may be called from any thread. An unlock with
/// waiters present hands ownership directly to the longest-waiting
/// coroutine, so acquisition order equals call order.
///
/// Clones share the same mutex.
#[derive(Clone, Default)]
pub struct Mutex {
    state: Arc<parking_lot::Mutex<MutexState>>,
}

impl Mutex {
    /// Create an unheld mutex.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the mutex, suspending the calling coroutine until it is
    /// available.
    ///
    /// # Panics
    ///
    /// Panics when called outside a coroutine.
    pub fn lock(&self) {
        if !worker::in_coroutine() {
            panic!("Mutex::lock() may only be called from inside a coroutine");
        }
        worker::suspend_current(|token| {
            // Re-check under the list lock: an unlock racing with this
            // call either sees the queued token or leaves the mutex free
            // for the test below, never neither.
            let mut state = self.state.lock();
            if !state.held {
                state.held = true;
                return false;
            }
            state.waiters.push_back(token);
            true
        });
    }

    /// Release the mutex. With waiters present, ownership passes directly
    /// to the longest-waiting coroutine and the mutex stays held.
    /// Callable from any thread.
    ///
    /// Unlocking a mutex that is not held is logged and ignored.
    pub fn unlock(&self) {
        let mut state = self.state.lock();
        if !state.held {
            log::warn!("unlock of a mutex that is not held");
            return;
        }
        if let Some(token) = state.waiters.pop_front() {
            // Ownership transfers without clearing `held`.
            token.wake(WakeReason::Woken);
        } else {
            state.held = false;
        }
    }

    /// Acquire without suspending. Returns `true` on success. Callable
    /// from any thread.
    pub fn try_lock(&self) -> bool {
        let mut state = self.state.lock();
        if state.held {
            false
        } else {
            state.held = true;
            true
        }
    }

    /// Acquire like [`lock`](Self::lock) and return a guard that unlocks
    /// on drop.
    ///
    /// # Panics
    ///
    /// Panics when called outside a coroutine.
    pub fn lock_guard(&self) -> MutexGuard<'_> {
        self.lock();
        MutexGuard::new(self)
    }
}
