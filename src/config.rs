//! Process-global runtime configuration

use std::sync::atomic::{AtomicUsize, Ordering};

/// Default coroutine stack size, in machine words (32 KiB on 64-bit).
pub const DEFAULT_STACK_WORDS: usize = 0x1000;

/// Smallest accepted coroutine stack size, in machine words (16 KiB on
/// 64-bit). Panic and unwind machinery needs room even in tiny coroutines.
pub const MIN_STACK_WORDS: usize = 0x800;

/// Runtime tunables, read by the scheduler pool at boot and on every spawn.
///
/// Obtained through [`config()`]; setters chain:
///
/// ```rust,ignore
/// weft::config().set_schedulers(4).set_stack_size(0x2000);
/// ```
pub struct Config {
    /// Scheduler thread count; 0 selects one per logical CPU
    schedulers: AtomicUsize,
    /// Coroutine stack size in machine words
    stack_words: AtomicUsize,
}

static CONFIG: Config = Config {
    schedulers: AtomicUsize::new(0),
    stack_words: AtomicUsize::new(DEFAULT_STACK_WORDS),
};

/// Access the global configuration.
pub fn config() -> &'static Config {
    &CONFIG
}

impl Config {
    /// Set the number of scheduler threads. `0` selects one per logical
    /// CPU. Only takes effect before the runtime boots, which happens on
    /// the first spawn, the first `max_sched_num()` call, or pool
    /// construction.
    pub fn set_schedulers(&self, n: usize) -> &Self {
        self.schedulers.store(n, Ordering::SeqCst);
        self
    }

    /// Resolved scheduler count, at least 1.
    pub fn schedulers(&self) -> usize {
        match self.schedulers.load(Ordering::SeqCst) {
            0 => num_cpus::get(),
            n => n,
        }
    }

    /// Set the stack size for subsequently spawned coroutines, in machine
    /// words. Values below [`MIN_STACK_WORDS`] are clamped.
    pub fn set_stack_size(&self, words: usize) -> &Self {
        let words = if words < MIN_STACK_WORDS {
            log::warn!(
                "stack size of {} words is below the minimum, clamping to {}",
                words,
                MIN_STACK_WORDS
            );
            MIN_STACK_WORDS
        } else {
            words
        };
        self.stack_words.store(words, Ordering::SeqCst);
        self
    }

    /// Stack size applied to new coroutines, in machine words.
    pub fn stack_size(&self) -> usize {
        self.stack_words.load(Ordering::SeqCst)
    }
}
