//! Advisory, best-effort counters.

use std::sync::atomic::{AtomicU64, Ordering};

const ORDERING: Ordering = Ordering::Relaxed;

/// A live set of counters, embedded in a [`TimerWheel`](crate::TimerWheel).
#[derive(Debug, Default)]
pub struct Stats {
    added: AtomicU64,
    fired: AtomicU64,
    multi_round: AtomicU64,
    fired_immediately: AtomicU64,
}

impl Stats {
    pub(crate) fn added(&self) {
        self.added.fetch_add(1, ORDERING);
    }

    pub(crate) fn fired(&self) {
        self.fired.fetch_add(1, ORDERING);
    }

    pub(crate) fn multi_round(&self) {
        self.multi_round.fetch_add(1, ORDERING);
    }

    pub(crate) fn fired_immediately(&self) {
        self.fired_immediately.fetch_add(1, ORDERING);
    }

    /// Take a point-in-time snapshot of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            added: self.added.load(ORDERING),
            fired: self.fired.load(ORDERING),
            multi_round: self.multi_round.load(ORDERING),
            fired_immediately: self.fired_immediately.load(ORDERING),
        }
    }
}

/// A snapshot of [`Stats`] taken at some instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub added: u64,
    pub fired: u64,
    pub multi_round: u64,
    pub fired_immediately: u64,
}
