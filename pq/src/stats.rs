//! Advisory, best-effort counters.

use std::sync::atomic::{AtomicU64, Ordering};

const ORDERING: Ordering = Ordering::Relaxed;

/// A live set of counters, embedded in an [`ExpiringQueue`](crate::ExpiringQueue).
#[derive(Debug, Default)]
pub struct Stats {
    inserts: AtomicU64,
    expired: AtomicU64,
    removes: AtomicU64,
    reschedules: AtomicU64,
}

impl Stats {
    pub(crate) fn insert(&self) {
        self.inserts.fetch_add(1, ORDERING);
    }

    pub(crate) fn expired(&self) {
        self.expired.fetch_add(1, ORDERING);
    }

    pub(crate) fn remove(&self) {
        self.removes.fetch_add(1, ORDERING);
    }

    pub(crate) fn reschedule(&self) {
        self.reschedules.fetch_add(1, ORDERING);
    }

    /// Take a point-in-time snapshot of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            inserts: self.inserts.load(ORDERING),
            expired: self.expired.load(ORDERING),
            removes: self.removes.load(ORDERING),
            reschedules: self.reschedules.load(ORDERING),
        }
    }
}

/// A snapshot of [`Stats`] taken at some instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub inserts: u64,
    pub expired: u64,
    pub removes: u64,
    pub reschedules: u64,
}
