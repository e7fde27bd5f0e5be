//! A concurrent, sharded hash table with online incremental resize.
//!
//! [`ShardedHashTable`] is a key→value map built from independently-locked buckets: lookups take
//! a per-bucket read lock, inserts and removals take a per-bucket write lock, and a resize —
//! triggered when a bucket's chain grows past `⌊√size⌋` — swaps in a larger bucket array without
//! ever stopping the world. The table being resized away from is kept around as an "old"
//! generation and is cooperatively drained into the new one a few entries at a time, both by an
//! explicit [`ShardedHashTable::gc`] call and opportunistically inside every other operation.
//!
//! The table never inspects the values it stores beyond moving and dropping them — `V` is a
//! fully parametric, owned payload, and the keys it hashes are raw byte sequences, copied on
//! insert.

mod error;
mod stats;
mod table;


use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::mem;
use std::ops::Deref;
use std::sync::atomic::Ordering;

use owning_ref::{OwningHandle, OwningRef};
use parking_lot::{RwLock, RwLockReadGuard};
use slog::{debug, o, trace, warn, Logger};

pub use crate::error::Error;
pub use crate::stats::StatsSnapshot;

use crate::stats::Stats;
use crate::table::{BucketInner, OldTable, Table};

/// The default bucket count for a table created with [`ShardedHashTable::new`].
const DEFAULT_BUCKETS: usize = 100;
/// Entries migrated out of the old table per opportunistic GC pass.
const GC_STEPS_PER_OP: usize = 10;

/// Either just a `current` table, or a `current` table plus an `old` table still being drained.
struct TableState<V> {
    current: Table<V>,
    old: Option<OldTable<V>>,
}

/// A read guard borrowing directly into a matched entry's value.
///
/// Holding this guard keeps both the table's resize lock (read side) and the entry's bucket lock
/// (read side) held: a resize cannot proceed while any `ReadGuard` is alive, exactly as it
/// cannot while any bucket read lock is held. This is the same tradeoff this workspace's other
/// fine-grained-locking maps make, in exchange for a lookup that never has to clone `V`.
pub struct ReadGuard<'a, V> {
    inner: OwningRef<OwningHandle<RwLockReadGuard<'a, TableState<V>>, RwLockReadGuard<'a, BucketInner<V>>>, V>,
}

impl<'a, V> Deref for ReadGuard<'a, V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.inner
    }
}

/// A concurrent, sharded hash table with online incremental resize.
///
/// See the [module documentation](crate) for the high-level design.
pub struct ShardedHashTable<V, S = RandomState> {
    state: RwLock<TableState<V>>,
    build_hasher: S,
    stats: Stats,
    log: Logger,
}

impl<V> ShardedHashTable<V, RandomState> {
    /// Create a table with the default bucket count and the standard library's randomized
    /// hasher.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUCKETS)
    }

    /// Create a table with at least `size` buckets. `0` falls back to the default.
    pub fn with_capacity(size: usize) -> Self {
        Self::with_capacity_and_hasher(size, RandomState::new())
    }
}

impl<V> Default for ShardedHashTable<V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S: BuildHasher> ShardedHashTable<V, S> {
    /// Create a table with at least `size` buckets and a custom [`BuildHasher`].
    ///
    /// This is the idiomatic stand-in for the original's pluggable hash-function pointer: supply
    /// a `BuildHasher` that embeds whatever hashing algorithm you need.
    pub fn with_capacity_and_hasher(size: usize, build_hasher: S) -> Self {
        Self::with_logger(size, build_hasher, Logger::root(slog::Discard, o!()))
    }

    /// Like [`with_capacity_and_hasher`](Self::with_capacity_and_hasher), additionally attaching
    /// a [`slog::Logger`] for structured tracing of resize/GC activity.
    pub fn with_logger(size: usize, build_hasher: S, log: Logger) -> Self {
        let size = if size == 0 { DEFAULT_BUCKETS } else { size };
        ShardedHashTable {
            state: RwLock::new(TableState {
                current: Table::new(size),
                old: None,
            }),
            build_hasher,
            stats: Stats::default(),
            log,
        }
    }

    fn hash_key(&self, key: &[u8]) -> u64 {
        let mut hasher = self.build_hasher.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// Look up a key, returning a guard borrowing its value.
    ///
    /// The old table (if a resize is in progress) is consulted first, then the current table.
    /// Checking old before current matters for correctness, not just precedence: a reader that
    /// blocks taking an old bucket's read lock while GC is migrating that exact bucket only
    /// unblocks once the migrated entries already have a home in `current`, so the fallback
    /// current-table check that follows can never miss them.
    pub fn get(&self, key: &[u8]) -> Option<ReadGuard<'_, V>> {
        self.stats.lookup();
        let hash = self.hash_key(key);

        let state = self.state.read();
        let handle = OwningHandle::try_new(state, |ts| {
            // SAFETY: `ts` is the address of the `TableState` the `OwningHandle` keeps alive for
            // at least as long as the handle (and thus the bucket guard derived below) exists.
            let ts: &TableState<V> = unsafe { &*ts };
            if let Some(old) = &ts.old {
                if let Some(guard) = Self::locked_matching_bucket(&old.table, hash, key) {
                    return Ok(guard);
                }
            }
            if let Some(guard) = Self::locked_matching_bucket(&ts.current, hash, key) {
                return Ok(guard);
            }
            Err(())
        })
        .ok()?;

        let inner = OwningRef::new(handle)
            .try_map(|bucket: &BucketInner<V>| bucket.find_value(hash, key))
            .ok()?;
        Some(ReadGuard { inner })
    }

    fn locked_matching_bucket<'a>(
        table: &'a Table<V>,
        hash: u64,
        key: &[u8],
    ) -> Option<RwLockReadGuard<'a, BucketInner<V>>> {
        let guard = table.bucket(hash).raw().read();
        if guard.find(hash, key).is_some() {
            Some(guard)
        } else {
            None
        }
    }

    /// Does the table contain `key`, in either generation?
    pub fn contains_key(&self, key: &[u8]) -> bool {
        let hash = self.hash_key(key);
        let found = {
            let state = self.state.read();
            state
                .old
                .as_ref()
                .map_or(false, |old| old.table.bucket(hash).contains(hash, key))
                || state.current.bucket(hash).contains(hash, key)
        };
        self.opportunistic_gc();
        found
    }

    /// Insert a new entry, without deduplication.
    ///
    /// A later [`get`](Self::get) returns the most recently inserted matching entry — duplicate
    /// keys chain LIFO within their bucket.
    pub fn insert(&self, key: &[u8], value: V) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::InvalidKey);
        }
        self.stats.insert();
        let hash = self.hash_key(key);

        let (depth, max_depth) = {
            let state = self.state.read();
            let depth = state.current.bucket(hash).insert(hash, key.into(), value);
            (depth, state.current.max_depth)
        };

        self.opportunistic_gc();
        if depth > max_depth {
            self.try_resize();
        }
        Ok(())
    }

    /// Atomic get-or-insert: if `key` already maps to a value (in either generation), a clone of
    /// it is returned and nothing is inserted; otherwise `value` is inserted and a clone of it is
    /// returned.
    ///
    /// Concurrent callers racing on the same key never both succeed in inserting — exactly one
    /// winner's value survives and is what every caller observes.
    pub fn lookup_insert(&self, key: &[u8], value: V) -> Result<V, Error>
    where
        V: Clone,
    {
        if key.is_empty() {
            return Err(Error::InvalidKey);
        }
        self.stats.lookup_insert();
        let hash = self.hash_key(key);

        loop {
            let state = self.state.read();
            if let Some(old) = &state.old {
                if let Some(existing) = old.table.bucket(hash).get_cloned(hash, key) {
                    drop(state);
                    self.opportunistic_gc();
                    return Ok(existing);
                }
            }
            let bucket = state.current.bucket(hash);
            if let Some(existing) = bucket.get_cloned(hash, key) {
                drop(state);
                self.opportunistic_gc();
                return Ok(existing);
            }

            // Not found by either read-only pass. Insert unless a concurrent writer beat us to
            // it between that pass and taking the bucket's write lock; `insert_if_absent`
            // re-checks under the write lock, so at most one caller's value ever survives.
            match bucket.insert_if_absent(hash, key, value.clone()) {
                Some(depth) => {
                    let max_depth = state.current.max_depth;
                    drop(state);
                    self.opportunistic_gc();
                    if depth > max_depth {
                        self.try_resize();
                    }
                    return Ok(value);
                }
                None => {
                    drop(state);
                    // A concurrent winner inserted first; loop around and read their value.
                    continue;
                }
            }
        }
    }

    /// Remove the first matching entry, checking the old table before the current one (see
    /// [`get`](Self::get) for why that order matters while a resize is draining the old table).
    pub fn remove(&self, key: &[u8]) -> Result<V, Error> {
        self.stats.remove();
        let hash = self.hash_key(key);

        let found = {
            let state = self.state.read();
            state
                .old
                .as_ref()
                .and_then(|old| old.table.bucket(hash).remove(hash, key))
                .or_else(|| state.current.bucket(hash).remove(hash, key))
        };

        self.opportunistic_gc();
        match found {
            Some(value) => Ok(value),
            None => {
                self.stats.not_found();
                Err(Error::NotFound)
            }
        }
    }

    /// Manually drain up to `max_steps` entries from the old table into the current one.
    ///
    /// Returns the number of entries actually migrated. A no-op (returning `0`) if no resize is
    /// in progress.
    pub fn gc(&self, max_steps: usize) -> usize {
        let (migrated, should_retire) = {
            let state = self.state.read();
            match &state.old {
                Some(old) => {
                    let migrated = self.migrate_some(&state.current, old, max_steps);
                    (migrated, old.gc_index.load(Ordering::Acquire) >= old.table.len())
                }
                None => (0, false),
            }
        };
        if should_retire {
            self.try_retire();
        }
        migrated
    }

    /// The number of live entries, summed across both generations.
    ///
    /// This walks every bucket and takes its read lock, so unlike most of this API it is not
    /// constant-time; it exists for diagnostics and tests.
    pub fn len(&self) -> usize {
        let state = self.state.read();
        let mut n: usize = state.current.buckets.iter().map(|b| b.depth()).sum();
        if let Some(old) = &state.old {
            n += old.table.buckets.iter().map(|b| b.depth()).sum::<usize>();
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of buckets in the current generation.
    pub fn buckets(&self) -> usize {
        self.state.read().current.len()
    }

    /// Is a resize currently in progress (i.e. is there an old generation still being drained)?
    pub fn is_resizing(&self) -> bool {
        self.state.read().old.is_some()
    }

    /// A point-in-time snapshot of the advisory operation counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run up to [`GC_STEPS_PER_OP`] GC steps if a resize is in progress, retiring the old
    /// generation if this call happens to finish draining it.
    ///
    /// Called from every foreground operation, after releasing any lock it took on `self.state`.
    fn opportunistic_gc(&self) {
        let should_retire = {
            let state = self.state.read();
            match &state.old {
                Some(old) => {
                    self.migrate_some(&state.current, old, GC_STEPS_PER_OP);
                    old.gc_index.load(Ordering::Acquire) >= old.table.len()
                }
                None => false,
            }
        };
        if should_retire {
            self.try_retire();
        }
    }

    /// Migrate up to `max_steps` buckets' worth of entries from `old` into `current`, advancing
    /// `old.gc_index`. Does not retire `old` itself — the caller decides whether to do that once
    /// it has released whatever lock it is holding on `self.state`.
    ///
    /// Each bucket's write lock is held for the whole drain-then-reinsert span, not just the
    /// drain: every drained entry already has a home in `current` by the time the old bucket's
    /// lock is released. A reader blocked on that same old bucket (see `get`/`remove`, which
    /// check old before current) can therefore never observe the key missing from both
    /// generations. The reinsert itself is duplicate-safe — if a concurrent `insert`/
    /// `lookup_insert` already placed a fresher value for the same key in `current` while this
    /// bucket was being migrated, that value wins and the migrated one is simply dropped.
    fn migrate_some(&self, current: &Table<V>, old: &OldTable<V>, max_steps: usize) -> usize {
        let mut migrated = 0;
        for _ in 0..max_steps {
            let index = old.gc_index.load(Ordering::Acquire);
            if index >= old.table.len() {
                break;
            }
            let mut old_bucket = match old.table.buckets[index].raw().try_write() {
                Some(guard) => guard,
                // Another operation holds this bucket's write lock; skip it for this pass
                // rather than blocking.
                None => break,
            };
            let entries = old_bucket.drain();
            let n = entries.len();
            for (hash, key, value) in entries {
                current.bucket(hash).raw().write().insert_if_absent_raw(hash, key, value);
            }
            old.gc_index.store(index + 1, Ordering::Release);
            drop(old_bucket);
            migrated += n;
        }
        if migrated > 0 {
            self.stats.gc_steps(migrated as u64);
            trace!(self.log, "migrated entries from old table"; "count" => migrated);
        }
        migrated
    }

    /// Clear `state.old` if its generation has been fully drained.
    fn try_retire(&self) {
        let mut state = self.state.write();
        if let Some(old) = &state.old {
            if old.gc_index.load(Ordering::Acquire) >= old.table.len() {
                state.old = None;
                debug!(self.log, "retired fully migrated old table");
            }
        }
    }

    /// Attempt to double the table's size. Declines (bumping the advisory counter) if the
    /// resize lock is contended or a migration is already in progress — the caller's triggering
    /// operation still succeeds either way, just without a resize this time. An allocation
    /// failure while growing the new bucket array is handled the same way: the resize is simply
    /// abandoned and the table is left in its current, consistent, pre-resize state.
    fn try_resize(&self) {
        let mut state = match self.state.try_write() {
            Some(state) => state,
            None => {
                self.stats.resize_declined();
                return;
            }
        };
        if state.old.is_some() {
            self.stats.resize_declined();
            return;
        }

        let new_size = state.current.len() * 2;
        let new_table = match Table::try_new(new_size) {
            Ok(table) => table,
            Err(err) => {
                self.stats.allocation_failure();
                warn!(self.log, "resize allocation failed, leaving table at its current size";
                    "error" => %err, "attempted_size" => new_size);
                return;
            }
        };
        let previous = mem::replace(&mut state.current, new_table);
        state.old = Some(OldTable::new(previous));
        self.stats.resize();
        debug!(self.log, "resized table"; "new_size" => new_size);
    }
}
