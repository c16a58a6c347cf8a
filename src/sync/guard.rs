//! RAII guard for the coroutine mutex

use crate::sync::mutex::Mutex;

/// Releases the mutex when dropped.
///
/// Returned by [`Mutex::lock_guard`]; the lock is already held while the
/// guard exists. [`unlock`](Self::unlock) releases it early.
#[must_use = "the mutex unlocks as soon as the guard is dropped"]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
    unlocked: bool,
}

impl<'a> MutexGuard<'a> {
    pub(crate) fn new(mutex: &'a Mutex) -> Self {
        Self {
            mutex,
            unlocked: false,
        }
    }

    /// Release the lock now instead of at end of scope.
    pub fn unlock(mut self) {
        self.mutex.unlock();
        self.unlocked = true;
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        if !self.unlocked {
            self.mutex.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropping_the_guard_unlocks() {
        let mutex = Mutex::new();
        {
            assert!(mutex.try_lock());
            let _guard = MutexGuard::new(&mutex);
        }
        assert!(mutex.try_lock());
        mutex.unlock();
    }

    #[test]
    fn test_explicit_unlock_releases_exactly_once() {
        let mutex = Mutex::new();
        assert!(mutex.try_lock());
        let guard = MutexGuard::new(&mutex);
        guard.unlock();
        assert!(mutex.try_lock());
        mutex.unlock();
    }
}
