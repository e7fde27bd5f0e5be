//! A thread-safe min-heap priority queue with TTL-based expiration.
//!
//! [`ExpiringQueue`] holds values keyed by an absolute expiry tick. A single [`parking_lot::Mutex`]
//! guards the whole heap; callers insert values with a time-to-live, and drive expiration by
//! periodically calling [`ExpiringQueue::expire`] with the current time, which fires a
//! caller-supplied callback for every item whose deadline has passed.
//!
//! Inserting returns a [`Handle`] that can later cancel ([`ExpiringQueue::remove`]) or reschedule
//! ([`ExpiringQueue::reschedule`]) the item in O(log n), without scanning the heap.

mod error;
mod heap;
mod stats;

#[cfg(test)]
mod tests;

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use slog::{debug, o, trace, Logger};

pub use crate::error::Error;
pub use crate::stats::StatsSnapshot;

use crate::heap::{remove_at, sift_up, Item, Slot};
use crate::stats::Stats;

const DEFAULT_CAPACITY: usize = 64;

/// A cloneable back-pointer a caller holds to cancel or reschedule an in-flight item.
///
/// A `Handle` outlives the item it refers to: once the item has fired or been removed, the
/// handle simply becomes inert — [`ExpiringQueue::remove`] and [`ExpiringQueue::reschedule`] both
/// treat that as a no-op rather than an error.
pub struct Handle<V> {
    slot: Arc<Slot>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for Handle<V> {
    fn clone(&self) -> Self {
        Handle {
            slot: Arc::clone(&self.slot),
            _value: PhantomData,
        }
    }
}

struct Inner<V> {
    items: Vec<Item<V>>,
    expire_cb: Box<dyn FnMut(V) + Send>,
}

/// A thread-safe min-heap priority queue with TTL-based expiration.
///
/// See the [module documentation](crate) for the high-level design.
pub struct ExpiringQueue<V> {
    inner: Mutex<Inner<V>>,
    stats: Stats,
    log: Logger,
}

impl<V> ExpiringQueue<V> {
    /// Create a queue with the default capacity (64).
    pub fn new(expire_cb: impl FnMut(V) + Send + 'static) -> Self {
        Self::with_capacity(0, expire_cb)
    }

    /// Create a queue with room for at least `capacity` items before its first growth. `0` falls
    /// back to the default.
    pub fn with_capacity(capacity: usize, expire_cb: impl FnMut(V) + Send + 'static) -> Self {
        Self::with_logger(capacity, expire_cb, Logger::root(slog::Discard, o!()))
    }

    /// Like [`with_capacity`](Self::with_capacity), additionally attaching a [`slog::Logger`].
    pub fn with_logger(capacity: usize, expire_cb: impl FnMut(V) + Send + 'static, log: Logger) -> Self {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        ExpiringQueue {
            inner: Mutex::new(Inner {
                items: Vec::with_capacity(capacity),
                expire_cb: Box::new(expire_cb),
            }),
            stats: Stats::default(),
            log,
        }
    }

    /// Insert `value`, expiring at `now.wrapping_add(ttl)`.
    ///
    /// Wraparound past `u64::MAX` is the caller's problem: the queue only ever compares expiries
    /// with `<=`, never with knowledge of "real" elapsed time.
    pub fn insert(&self, now: u64, value: V, ttl: u64) -> Result<Handle<V>, Error> {
        let expire = now.wrapping_add(ttl);
        let slot = Slot::new();

        let mut inner = self.inner.lock();
        if inner.items.len() == inner.items.capacity() {
            let additional = inner.items.capacity().max(1);
            inner
                .items
                .try_reserve(additional)
                .map_err(|_| Error::AllocationFailure)?;
            debug!(self.log, "grew heap capacity"; "capacity" => inner.items.capacity());
        }

        let index = inner.items.len();
        slot.set(index);
        inner.items.push(Item {
            expire,
            value,
            slot: Arc::clone(&slot),
        });
        sift_up(&mut inner.items, index);
        drop(inner);

        self.stats.insert();
        Ok(Handle {
            slot,
            _value: PhantomData,
        })
    }

    /// Fire the expiry callback for every item whose `expire <= now`, in non-decreasing `expire`
    /// order, stopping after `max_count` firings or once the root's `expire` exceeds `now`.
    ///
    /// Returns the number of items fired. Callbacks run with the queue's mutex held; they must
    /// not call back into this queue.
    pub fn expire(&self, now: u64, max_count: usize) -> usize {
        let mut inner = self.inner.lock();
        let mut fired = 0;
        while fired < max_count {
            match inner.items.first() {
                Some(item) if item.expire <= now => {}
                _ => break,
            }
            let removed = remove_at(&mut inner.items, 0);
            (inner.expire_cb)(removed.value);
            fired += 1;
            self.stats.expired();
        }
        if fired > 0 {
            trace!(self.log, "expired items"; "count" => fired);
        }
        fired
    }

    /// Equivalent to `expire(now, usize::MAX)`.
    pub fn expire_all(&self, now: u64) -> usize {
        self.expire(now, usize::MAX)
    }

    /// Remove the item `handle` refers to, if it is still live.
    ///
    /// Returns `None` if the item has already fired or already been removed.
    pub fn remove(&self, handle: &Handle<V>) -> Option<V> {
        let mut inner = self.inner.lock();
        let index = handle.slot.get()?;
        let removed = remove_at(&mut inner.items, index);
        drop(inner);
        self.stats.remove();
        Some(removed.value)
    }

    /// Remove and re-insert the item `handle` refers to with a new deadline
    /// `now.wrapping_add(new_ttl)`, reusing the same back-pointer so `handle` stays valid.
    ///
    /// A no-op returning `Ok(())` if the handle no longer refers to a live item. The whole
    /// operation runs under the single queue mutex, so another thread can never observe the item
    /// as physically absent from the heap.
    pub fn reschedule(&self, now: u64, handle: &Handle<V>, new_ttl: u64) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let index = match handle.slot.get() {
            Some(index) => index,
            None => return Ok(()),
        };

        let removed = remove_at(&mut inner.items, index);
        // The item just vacated one array slot, so the following push can never need to grow.
        let new_index = inner.items.len();
        handle.slot.set(new_index);
        inner.items.push(Item {
            expire: now.wrapping_add(new_ttl),
            value: removed.value,
            slot: Arc::clone(&handle.slot),
        });
        sift_up(&mut inner.items, new_index);
        drop(inner);

        self.stats.reschedule();
        Ok(())
    }

    /// The number of items currently in the queue.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A point-in-time snapshot of the advisory operation counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl<V> Drop for ExpiringQueue<V> {
    /// Fire every remaining item's callback, in heap order, before the backing array is freed.
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        while !inner.items.is_empty() {
            let removed = remove_at(&mut inner.items, 0);
            (inner.expire_cb)(removed.value);
        }
    }
}
