//! Advisory, best-effort counters.
//!
//! Every counter here is a relaxed atomic. None of them participate in any correctness
//! invariant — they exist purely to let an operator or a test peek at what the table has been
//! doing.

use std::sync::atomic::{AtomicU64, Ordering};

const ORDERING: Ordering = Ordering::Relaxed;

/// A live set of counters, embedded in a [`ShardedHashTable`](crate::ShardedHashTable).
#[derive(Debug, Default)]
pub struct Stats {
    inserts: AtomicU64,
    lookups: AtomicU64,
    lookup_inserts: AtomicU64,
    removes: AtomicU64,
    not_found: AtomicU64,
    resizes: AtomicU64,
    resize_declined: AtomicU64,
    allocation_failures: AtomicU64,
    gc_steps: AtomicU64,
}

impl Stats {
    pub(crate) fn insert(&self) {
        self.inserts.fetch_add(1, ORDERING);
    }

    pub(crate) fn lookup(&self) {
        self.lookups.fetch_add(1, ORDERING);
    }

    pub(crate) fn lookup_insert(&self) {
        self.lookup_inserts.fetch_add(1, ORDERING);
    }

    pub(crate) fn remove(&self) {
        self.removes.fetch_add(1, ORDERING);
    }

    pub(crate) fn not_found(&self) {
        self.not_found.fetch_add(1, ORDERING);
    }

    pub(crate) fn resize(&self) {
        self.resizes.fetch_add(1, ORDERING);
    }

    pub(crate) fn resize_declined(&self) {
        self.resize_declined.fetch_add(1, ORDERING);
    }

    pub(crate) fn allocation_failure(&self) {
        self.allocation_failures.fetch_add(1, ORDERING);
    }

    pub(crate) fn gc_steps(&self, n: u64) {
        self.gc_steps.fetch_add(n, ORDERING);
    }

    /// Take a point-in-time snapshot of every counter.
    ///
    /// The snapshot is not atomic across counters — under concurrent activity, two fields may
    /// reflect slightly different instants. This is fine for the advisory purpose these counters
    /// serve.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            inserts: self.inserts.load(ORDERING),
            lookups: self.lookups.load(ORDERING),
            lookup_inserts: self.lookup_inserts.load(ORDERING),
            removes: self.removes.load(ORDERING),
            not_found: self.not_found.load(ORDERING),
            resizes: self.resizes.load(ORDERING),
            resize_declined: self.resize_declined.load(ORDERING),
            allocation_failures: self.allocation_failures.load(ORDERING),
            gc_steps: self.gc_steps.load(ORDERING),
        }
    }
}

/// A snapshot of [`Stats`] taken at some instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub inserts: u64,
    pub lookups: u64,
    pub lookup_inserts: u64,
    pub removes: u64,
    pub not_found: u64,
    pub resizes: u64,
    pub resize_declined: u64,
    pub allocation_failures: u64,
    pub gc_steps: u64,
}
