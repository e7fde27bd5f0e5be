//! A hashed timer wheel with per-slot locking.
//!
//! [`TimerWheel`] schedules fire-and-forget callbacks: [`TimerWheel::add`] is safe to call from
//! any thread, while [`TimerWheel::tick`] is meant to be driven by a single thread advancing wall
//! clock time. Timers further in the future than one revolution of the wheel are re-hashed into
//! their correct future slot as they are encountered ("multi-round" timers) rather than requiring
//! a per-slot generation counter.

mod error;
mod stats;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use slog::{debug, o, trace, Logger};

pub use crate::error::Error;
pub use crate::stats::StatsSnapshot;

use crate::stats::Stats;

const DEFAULT_SLOTS: usize = 256;
const DEFAULT_TICK_RESOLUTION_NS: u64 = 1_000_000;

/// One pending timer.
struct Node<V> {
    /// Absolute deadline, in nanoseconds, quantized to a multiple of `tick_resolution_ns`.
    expiry: u64,
    data: V,
}

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// A hashed timer wheel with per-slot locking.
///
/// See the [module documentation](crate) for the high-level design.
pub struct TimerWheel<V> {
    slots: Vec<Mutex<Vec<Node<V>>>>,
    mask: usize,
    tick_resolution_ns: u64,
    current_tick: AtomicU64,
    cb: Box<dyn Fn(V) + Send + Sync>,
    stats: Stats,
    log: Logger,
}

impl<V> TimerWheel<V> {
    /// Create a wheel with the default slot count (256) and tick resolution (1 ms).
    pub fn new(cb: impl Fn(V) + Send + Sync + 'static) -> Self {
        Self::with_config(0, 0, cb)
    }

    /// Create a wheel with `size` slots (rounded up to the next power of two; `0` → 256) and
    /// `tick_resolution_ns` nanoseconds per tick (`0` → 1,000,000).
    pub fn with_config(size: usize, tick_resolution_ns: u64, cb: impl Fn(V) + Send + Sync + 'static) -> Self {
        Self::with_logger(size, tick_resolution_ns, cb, Logger::root(slog::Discard, o!()))
    }

    /// Like [`with_config`](Self::with_config), additionally attaching a [`slog::Logger`].
    pub fn with_logger(
        size: usize,
        tick_resolution_ns: u64,
        cb: impl Fn(V) + Send + Sync + 'static,
        log: Logger,
    ) -> Self {
        let size = if size == 0 { DEFAULT_SLOTS } else { size }.next_power_of_two();
        let tick_resolution_ns = if tick_resolution_ns == 0 {
            DEFAULT_TICK_RESOLUTION_NS
        } else {
            tick_resolution_ns
        };
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, || Mutex::new(Vec::new()));
        TimerWheel {
            slots,
            mask: size - 1,
            tick_resolution_ns,
            current_tick: AtomicU64::new(0),
            cb: Box::new(cb),
            stats: Stats::default(),
            log,
        }
    }

    fn slot_for_tick(&self, tick: u64) -> usize {
        (tick as usize) & self.mask
    }

    /// Schedule `data` to fire after `delay_ns` nanoseconds, measured from the wheel's current
    /// tick.
    ///
    /// `delay_ns == 0` is a no-op: `data` is dropped without ever firing, matching the documented
    /// "doesn't fire, doesn't store" behavior for a zero delay.
    pub fn add(&self, delay_ns: u64, data: V) -> Result<(), Error> {
        if delay_ns == 0 {
            return Ok(());
        }

        let ticks_delay = ceil_div(delay_ns, self.tick_resolution_ns);
        let current = self.current_tick.load(Ordering::Acquire);
        let expiry_tick = current + ticks_delay;
        let slot_index = self.slot_for_tick(expiry_tick);

        let mut slot = self.slots[slot_index].lock();
        // `current_tick` may have advanced past `expiry_tick` between the load above and taking
        // this slot's lock; re-read it under the lock to detect that race.
        let current_after_lock = self.current_tick.load(Ordering::Acquire);
        if expiry_tick < current_after_lock {
            drop(slot);
            (self.cb)(data);
            self.stats.fired_immediately();
            trace!(self.log, "fired newly added timer immediately"; "expiry_tick" => expiry_tick, "current_tick" => current_after_lock);
            return Ok(());
        }

        if slot.len() == slot.capacity() {
            let additional = slot.capacity().max(1);
            slot.try_reserve(additional).map_err(|_| Error::AllocationFailure)?;
        }
        slot.push(Node {
            expiry: expiry_tick * self.tick_resolution_ns,
            data,
        });
        drop(slot);
        self.stats.added();
        Ok(())
    }

    /// Advance the wheel to `current_time_ns`, firing every node whose deadline has passed.
    ///
    /// Intended to be called from a single driving thread; `add` may be called concurrently from
    /// any thread while this runs. If `current_time_ns` implies a `target_tick` behind the
    /// wheel's current tick, this is a no-op returning `Ok(0)` — callers may have clock skew.
    pub fn tick(&self, current_time_ns: u64) -> Result<usize, Error> {
        let target_tick = current_time_ns / self.tick_resolution_ns;
        let mut fired = 0;

        loop {
            let current = self.current_tick.load(Ordering::Acquire);
            if current > target_tick {
                break;
            }

            let drained = std::mem::take(&mut *self.slots[self.slot_for_tick(current)].lock());
            for node in drained {
                if node.expiry <= current_time_ns {
                    (self.cb)(node.data);
                    fired += 1;
                    self.stats.fired();
                } else {
                    let new_index = ((node.expiry / self.tick_resolution_ns) as usize) & self.mask;
                    self.slots[new_index].lock().push(node);
                    self.stats.multi_round();
                }
            }
            self.current_tick.fetch_add(1, Ordering::AcqRel);
        }

        if fired > 0 {
            debug!(self.log, "ticked wheel"; "fired" => fired, "target_tick" => target_tick);
        }
        Ok(fired)
    }

    /// Consume the wheel, draining every slot. Returns the number of nodes seen — fired if
    /// `fire_pending` is set, otherwise simply dropped.
    pub fn shutdown(self, fire_pending: bool) -> usize {
        let mut count = 0;
        for slot in &self.slots {
            let drained = std::mem::take(&mut *slot.lock());
            for node in drained {
                if fire_pending {
                    (self.cb)(node.data);
                }
                count += 1;
            }
        }
        count
    }

    /// The wheel's current tick counter.
    pub fn current_tick(&self) -> u64 {
        self.current_tick.load(Ordering::Acquire)
    }

    /// The number of slots in the wheel (always a power of two).
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// A point-in-time snapshot of the advisory operation counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
