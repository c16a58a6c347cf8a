//! Per-scheduler object pool

use std::sync::Arc;

use crate::sched::runtime;
use crate::sched::worker;

type CreateFn<T> = Box<dyn Fn() -> T + Send + Sync>;
type DestroyFn<T> = Box<dyn Fn(T) + Send + Sync>;

struct PoolInner<T> {
    /// One free list per scheduler, indexed by scheduler id. Touched only
    /// from the owning worker thread; the lock exists so the pool itself
    /// can be shared across threads.
    slots: Box<[parking_lot::Mutex<Vec<T>>]>,
    create: Option<CreateFn<T>>,
    destroy: Option<DestroyFn<T>>,
    /// Per-scheduler cache bound, enforced only together with `destroy`
    capacity: Option<usize>,
}

impl<T> Drop for PoolInner<T> {
    fn drop(&mut self) {
        if let Some(destroy) = self.destroy.take() {
            for slot in self.slots.iter() {
                for item in slot.lock().drain(..) {
                    destroy(item);
                }
            }
        }
    }
}

/// A pool of reusable elements with one free list per scheduler.
///
/// A coroutine pops from and pushes to the list of the scheduler it is
/// pinned to, so pooled elements never migrate between workers. Outside
/// a coroutine there is no list to use: `pop` falls back to the create
/// callback and `push` destroys the element on the spot.
///
/// Clones share the same pool.
pub struct Pool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Pool<T> {
    /// Create a pool with no callbacks and unbounded free lists.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a pool.
    pub fn builder() -> PoolBuilder<T> {
        PoolBuilder::default()
    }

    /// Take an element from the calling scheduler's free list, falling
    /// back to the create callback. `None` when both are empty.
    pub fn pop(&self) -> Option<T> {
        let cached = worker::current_scheduler_id()
            .and_then(|id| self.inner.slots.get(id))
            .and_then(|slot| slot.lock().pop());
        match cached {
            Some(item) => Some(item),
            None => self.inner.create.as_ref().map(|create| create()),
        }
    }

    /// Return an element to the calling scheduler's free list. A full
    /// list, or a caller outside any coroutine, destroys the element
    /// instead of caching it.
    pub fn push(&self, item: T) {
        match worker::current_scheduler_id().and_then(|id| self.inner.slots.get(id)) {
            Some(slot) => {
                let mut slot = slot.lock();
                let full = match (self.inner.capacity, self.inner.destroy.as_ref()) {
                    (Some(capacity), Some(_)) => slot.len() >= capacity,
                    _ => false,
                };
                if full {
                    drop(slot);
                    self.destroy_item(item);
                } else {
                    slot.push(item);
                }
            }
            None => self.destroy_item(item),
        }
    }

    fn destroy_item(&self, item: T) {
        match self.inner.destroy.as_ref() {
            Some(destroy) => destroy(item),
            None => drop(item),
        }
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Configures a [`Pool`]; obtained from [`Pool::builder`].
pub struct PoolBuilder<T> {
    create: Option<CreateFn<T>>,
    destroy: Option<DestroyFn<T>>,
    capacity: Option<usize>,
}

impl<T> Default for PoolBuilder<T> {
    fn default() -> Self {
        Self {
            create: None,
            destroy: None,
            capacity: None,
        }
    }
}

impl<T> PoolBuilder<T> {
    /// Callback that makes a fresh element when a free list is empty.
    pub fn create<F>(mut self, f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.create = Some(Box::new(f));
        self
    }

    /// Callback that disposes of an element the pool will not cache.
    pub fn destroy<F>(mut self, f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.destroy = Some(Box::new(f));
        self
    }

    /// Bound each scheduler's free list. Takes effect only together with
    /// a destroy callback; without one the lists stay unbounded.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Build the pool with one free list per scheduler.
    pub fn build(self) -> Pool<T> {
        let slots: Vec<_> = (0..runtime::max_sched_num())
            .map(|_| parking_lot::Mutex::new(Vec::new()))
            .collect();
        Pool {
            inner: Arc::new(PoolInner {
                slots: slots.into_boxed_slice(),
                create: self.create,
                destroy: self.destroy,
                capacity: self.capacity,
            }),
        }
    }
}

/// RAII loan of one pooled element.
///
/// Pops on construction and pushes whatever is still held back on drop.
pub struct PoolGuard<'a, T> {
    pool: &'a Pool<T>,
    item: Option<T>,
}

impl<'a, T> PoolGuard<'a, T> {
    /// Borrow an element from `pool`. The guard may be empty when the
    /// pool had no cached element and no create callback.
    pub fn new(pool: &'a Pool<T>) -> Self {
        Self {
            pool,
            item: pool.pop(),
        }
    }

    /// The loaned element, if any
    pub fn get(&self) -> Option<&T> {
        self.item.as_ref()
    }

    /// Mutable access to the loaned element, if any
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.item.as_mut()
    }

    /// Detach the element from the guard so it is not returned on drop.
    pub fn take(mut self) -> Option<T> {
        self.item.take()
    }
}

impl<T> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.push(item);
        }
    }
}
