//! The bucketed, chained table that backs a [`ShardedHashTable`](crate::ShardedHashTable).
//!
//! This module has no notion of "current" vs. "old" — that distinction, and the locking that
//! guards the transition between them, lives in `lib.rs`. A bare [`Table`] is just an array of
//! independently-locked buckets.

use std::sync::atomic::AtomicUsize;

use parking_lot::RwLock;

/// One link of a bucket's collision chain.
struct Entry<V> {
    hash: u64,
    key: Box<[u8]>,
    value: V,
    next: Option<Box<Entry<V>>>,
}

/// The mutable state of a single bucket: its chain head and an advisory depth counter.
#[derive(Default)]
pub(crate) struct BucketInner<V> {
    head: Option<Box<Entry<V>>>,
    depth: usize,
}

impl<V> BucketInner<V> {
    pub(crate) fn find(&self, hash: u64, key: &[u8]) -> Option<&V> {
        let mut cur = self.head.as_deref();
        while let Some(entry) = cur {
            if entry.hash == hash && &*entry.key == key {
                return Some(&entry.value);
            }
            cur = entry.next.as_deref();
        }
        None
    }

    pub(crate) fn find_value(&self, hash: u64, key: &[u8]) -> Result<&V, ()> {
        self.find(hash, key).ok_or(())
    }

    fn push_front(&mut self, hash: u64, key: Box<[u8]>, value: V) {
        let entry = Box::new(Entry {
            hash,
            key,
            value,
            next: self.head.take(),
        });
        self.head = Some(entry);
        self.depth += 1;
    }

    /// Remove the first entry matching `(hash, key)`, if any.
    fn remove(&mut self, hash: u64, key: &[u8]) -> Option<V> {
        let mut cur = &mut self.head;
        loop {
            match cur {
                None => return None,
                Some(entry) if entry.hash == hash && &*entry.key == key => {
                    let mut entry = cur.take().expect("matched Some above");
                    *cur = entry.next.take();
                    self.depth -= 1;
                    return Some(entry.value);
                }
                Some(entry) => cur = &mut entry.next,
            }
        }
    }

    /// Remove and return every entry, resetting depth to zero.
    ///
    /// Used by GC migration.
    pub(crate) fn drain(&mut self) -> Vec<(u64, Box<[u8]>, V)> {
        self.depth = 0;
        let mut out = Vec::new();
        let mut cur = self.head.take();
        while let Some(mut entry) = cur {
            cur = entry.next.take();
            out.push((entry.hash, entry.key, entry.value));
        }
        out
    }

    /// Insert `(key, value)` unless a matching key is already present in this bucket.
    ///
    /// Returns whether the value was inserted. On `false`, `value` is simply dropped — the
    /// caller's entry lost to whatever is already there.
    pub(crate) fn insert_if_absent_raw(&mut self, hash: u64, key: Box<[u8]>, value: V) -> bool {
        if self.find(hash, &key).is_some() {
            false
        } else {
            self.push_front(hash, key, value);
            true
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }
}

/// One bucket: a reader-writer lock guarding a [`BucketInner`].
pub(crate) struct Bucket<V> {
    lock: RwLock<BucketInner<V>>,
}

impl<V> Default for Bucket<V> {
    fn default() -> Self {
        Bucket {
            lock: RwLock::new(BucketInner::default()),
        }
    }
}

impl<V> Bucket<V> {
    /// The raw lock, for callers (in `lib.rs`) that need to chain it behind the table-level lock
    /// to build a [`crate::ReadGuard`].
    pub(crate) fn raw(&self) -> &RwLock<BucketInner<V>> {
        &self.lock
    }

    pub(crate) fn contains(&self, hash: u64, key: &[u8]) -> bool {
        self.lock.read().find(hash, key).is_some()
    }

    pub(crate) fn get_cloned(&self, hash: u64, key: &[u8]) -> Option<V>
    where
        V: Clone,
    {
        self.lock.read().find(hash, key).cloned()
    }

    /// Unconditionally push a new entry to the head of the chain, returning the bucket's depth
    /// after insertion.
    pub(crate) fn insert(&self, hash: u64, key: Box<[u8]>, value: V) -> usize {
        let mut inner = self.lock.write();
        inner.push_front(hash, key, value);
        inner.depth()
    }

    /// Insert `(key, value)` unless a matching key is already present.
    ///
    /// Returns `Some(depth_after_insert)` on a successful insert, or `None` if a concurrent
    /// writer beat us to it (the caller should re-read rather than assume its `value` won).
    pub(crate) fn insert_if_absent(&self, hash: u64, key: &[u8], value: V) -> Option<usize> {
        let mut inner = self.lock.write();
        if inner.insert_if_absent_raw(hash, key.into(), value) {
            Some(inner.depth())
        } else {
            None
        }
    }

    pub(crate) fn remove(&self, hash: u64, key: &[u8]) -> Option<V> {
        self.lock.write().remove(hash, key)
    }

    pub(crate) fn depth(&self) -> usize {
        self.lock.read().depth()
    }
}

/// The low-level representation of a generation of the hash table: a fixed bucket array and the
/// `max_depth` threshold derived from its size.
///
/// This type knows nothing about resizing or migration; a [`Table`] is just a flat array of
/// independently-locked buckets, plus the depth threshold `lib.rs` uses to decide when to build a
/// bigger one.
pub(crate) struct Table<V> {
    pub(crate) buckets: Vec<Bucket<V>>,
    pub(crate) max_depth: usize,
}

/// Integer square root via Newton's method, good enough for a depth threshold.
fn isqrt(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let mut x = n;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

impl<V> Table<V> {
    pub(crate) fn new(size: usize) -> Table<V> {
        let mut buckets = Vec::with_capacity(size);
        buckets.resize_with(size, Bucket::default);
        Table {
            max_depth: isqrt(size).max(1),
            buckets,
        }
    }

    /// Like [`new`](Self::new), but reports allocation failure instead of aborting the process.
    /// Used by resize, which must leave the table in its pre-resize state on failure rather than
    /// panic.
    pub(crate) fn try_new(size: usize) -> Result<Table<V>, crate::Error> {
        let mut buckets = Vec::new();
        buckets
            .try_reserve(size)
            .map_err(|_| crate::Error::AllocationFailure)?;
        buckets.resize_with(size, Bucket::default);
        Ok(Table {
            max_depth: isqrt(size).max(1),
            buckets,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn index(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    pub(crate) fn bucket(&self, hash: u64) -> &Bucket<V> {
        &self.buckets[self.index(hash)]
    }
}

/// A table that is in the process of being migrated into a newer, larger [`Table`].
///
/// `gc_index` is the index of the next bucket the cooperative GC pass should drain; once it
/// reaches `table.len()`, the whole generation has been migrated and the `OldTable` can be
/// retired.
pub(crate) struct OldTable<V> {
    pub(crate) table: Table<V>,
    pub(crate) gc_index: AtomicUsize,
}

impl<V> OldTable<V> {
    pub(crate) fn new(table: Table<V>) -> OldTable<V> {
        OldTable {
            table,
            gc_index: AtomicUsize::new(0),
        }
    }
}
