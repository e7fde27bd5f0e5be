//! The binary min-heap backing an [`ExpiringQueue`](crate::ExpiringQueue), and the back-pointer
//! bookkeeping that keeps external [`Handle`](crate::Handle)s valid across swaps.

use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

const NOT_IN_HEAP: isize = -1;

/// A shared back-pointer cell: the item's current heap index, or "not currently in the heap".
#[derive(Debug, Default)]
pub(crate) struct Slot(AtomicIsize);

impl Slot {
    pub(crate) fn new() -> Arc<Slot> {
        Arc::new(Slot(AtomicIsize::new(NOT_IN_HEAP)))
    }

    pub(crate) fn get(&self) -> Option<usize> {
        match self.0.load(Ordering::Acquire) {
            i if i < 0 => None,
            i => Some(i as usize),
        }
    }

    pub(crate) fn set(&self, index: usize) {
        self.0.store(index as isize, Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        self.0.store(NOT_IN_HEAP, Ordering::Release);
    }
}

/// One heap-owned element.
pub(crate) struct Item<V> {
    pub(crate) expire: u64,
    pub(crate) value: V,
    pub(crate) slot: Arc<Slot>,
}

fn swap<V>(items: &mut [Item<V>], a: usize, b: usize) {
    items.swap(a, b);
    items[a].slot.set(a);
    items[b].slot.set(b);
}

/// Restore heap order after appending an item at the tail, index `i`.
pub(crate) fn sift_up<V>(items: &mut [Item<V>], mut i: usize) {
    while i > 0 {
        let parent = (i - 1) / 2;
        if items[i].expire < items[parent].expire {
            swap(items, i, parent);
            i = parent;
        } else {
            break;
        }
    }
}

/// Restore heap order after overwriting index `i` with a value that may be too large to stay
/// there.
pub(crate) fn sift_down<V>(items: &mut [Item<V>], mut i: usize) {
    let len = items.len();
    loop {
        let left = 2 * i + 1;
        let right = 2 * i + 2;
        let mut smallest = i;
        if left < len && items[left].expire < items[smallest].expire {
            smallest = left;
        }
        if right < len && items[right].expire < items[smallest].expire {
            smallest = right;
        }
        if smallest == i {
            break;
        }
        swap(items, i, smallest);
        i = smallest;
    }
}

/// Remove and return the item at `index`, restoring heap order among what remains.
///
/// The standard "swap with the last element, pop, then the displaced element may need to move in
/// either direction" removal: `sift_down` and `sift_up` are each no-ops if the displaced element
/// is already correctly placed in that direction, so calling both unconditionally is safe.
pub(crate) fn remove_at<V>(items: &mut Vec<Item<V>>, index: usize) -> Item<V> {
    let last = items.len() - 1;
    if index != last {
        swap(items, index, last);
    }
    let removed = items.pop().expect("index was in bounds, so the heap was non-empty");
    removed.slot.clear();
    if index < items.len() {
        sift_down(items, index);
        sift_up(items, index);
    }
    removed
}
