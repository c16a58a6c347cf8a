//! Stackful coroutines pinned to per-CPU schedulers.
//!
//! This crate provides:
//! - [`go`]: start a coroutine on one of the scheduler threads
//! - [`Event`] and [`Mutex`]: synchronization that suspends coroutines
//!   instead of blocking threads
//! - [`Pool`]: reusable elements cached per scheduler
//! - [`sleep`], [`park`] and [`Waker`]: timed and externally driven
//!   suspension
//!
//! Coroutines are cooperatively scheduled: each one runs on the worker
//! thread it was assigned to until it suspends or finishes, and it is
//! woken back onto that same worker.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//!
//! let done = weft::Event::new();
//! let worker = done.clone();
//! weft::go(move || {
//!     weft::sleep(Duration::from_millis(10));
//!     worker.signal();
//! });
//! weft::go(move || {
//!     done.wait();
//!     println!("signaled on scheduler {}", weft::sched_id());
//! });
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

use std::time::Duration;

mod config;
mod pool;
mod sched;
mod sync;

pub use config::{config, Config, DEFAULT_STACK_WORDS, MIN_STACK_WORDS};
pub use pool::{Pool, PoolBuilder, PoolGuard};
pub use sched::runtime::{SpawnError, Waker};
pub use sync::{Event, Mutex, MutexGuard};

/// Start `f` as a coroutine on one of the schedulers.
///
/// The runtime boots on first use; the coroutine is pinned to the
/// scheduler it lands on and never migrates. After [`stop`] the closure
/// is dropped and a warning logged; use [`try_go`] to observe failures.
pub fn go<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    sched::runtime::go(f)
}

/// Like [`go`], but reports failure to the caller instead of logging it.
pub fn try_go<F>(f: F) -> Result<(), SpawnError>
where
    F: FnOnce() + Send + 'static,
{
    sched::runtime::try_go(f)
}

/// Suspend the calling coroutine for `dur`.
///
/// On a thread that is not running a coroutine this is a plain
/// [`std::thread::sleep`].
pub fn sleep(dur: Duration) {
    sched::runtime::sleep(dur)
}

/// [`sleep`] taking milliseconds.
pub fn sleep_ms(ms: u64) {
    sleep(Duration::from_millis(ms))
}

/// Stop all schedulers, waiting briefly for their threads to exit.
///
/// Coroutines that have not finished are abandoned: suspended ones are
/// dropped along with the structures holding their wake tokens, queued
/// ones are never dispatched. Subsequent [`go`] calls are rejected.
/// Calling `stop` more than once is harmless.
pub fn stop() {
    sched::runtime::stop()
}

/// Id of the scheduler owning the current thread, or -1 when the calling
/// thread is not a scheduler worker.
pub fn sched_id() -> i32 {
    sched::runtime::sched_id()
}

/// Id of the calling coroutine, or -1 outside any coroutine.
pub fn coroutine_id() -> i64 {
    sched::runtime::coroutine_id()
}

/// Number of schedulers the runtime uses. Constant once the runtime has
/// booted, always at least 1.
pub fn max_sched_num() -> usize {
    sched::runtime::max_sched_num()
}

/// Suspend the calling coroutine until the [`Waker`] handed to `register`
/// is invoked.
///
/// The waker may be cloned and fired from any thread; the first call
/// wins and the rest do nothing. `register` runs before the suspension
/// is visible to anyone else, so an early wake cannot be lost.
///
/// # Panics
///
/// Panics when called outside a coroutine.
pub fn park<F>(register: F)
where
    F: FnOnce(Waker),
{
    sched::runtime::park(register)
}
