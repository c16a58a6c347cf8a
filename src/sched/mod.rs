//! The scheduler engine
//!
//! One `Scheduler` per logical CPU, each driving its own dispatch loop on a
//! dedicated worker thread. Coroutines are pinned to the scheduler that
//! spawned them; every wake re-enqueues onto that scheduler, so a coroutine
//! stack is only ever resumed by one thread.

pub(crate) mod coroutine;
pub(crate) mod runtime;
pub(crate) mod scheduler;
pub(crate) mod timer;
pub(crate) mod worker;
