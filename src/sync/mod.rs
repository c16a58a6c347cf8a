//! Coroutine-aware synchronization primitives

mod event;
mod guard;
mod mutex;

pub use event::Event;
pub use guard::MutexGuard;
pub use mutex::Mutex;
