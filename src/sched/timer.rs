//! Per-worker timer heap for sleeps and bounded waits

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::sched::coroutine::WakeToken;

/// Entry in the timer heap
pub(crate) struct TimerEntry {
    /// Absolute wake deadline
    deadline: Instant,
    /// Claim on the suspended coroutine
    token: WakeToken,
}

impl TimerEntry {
    pub(crate) fn new(deadline: Instant, token: WakeToken) -> Self {
        Self { deadline, token }
    }
}

// Reverse ordering for min-heap (earliest deadline first)
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for min-heap
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.token.co_id() == other.token.co_id()
    }
}

impl Eq for TimerEntry {}

/// Pending timer entries for one worker thread, earliest deadline first.
///
/// Lives in the worker's thread-local context; entries are pushed by the
/// suspension primitives while their coroutine still occupies the worker
/// and popped by the dispatch loop.
#[derive(Default)]
pub(crate) struct TimerQueue {
    pending: BinaryHeap<TimerEntry>,
}

impl TimerQueue {
    pub(crate) fn push(&mut self, entry: TimerEntry) {
        self.pending.push(entry);
    }

    /// Earliest deadline, if any entry is pending
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.pending.peek().map(|entry| entry.deadline)
    }

    /// Pop one entry whose deadline has passed
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<WakeToken> {
        match self.pending.peek() {
            Some(entry) if entry.deadline <= now => self.pending.pop().map(|entry| entry.token),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
