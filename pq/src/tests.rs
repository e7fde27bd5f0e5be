use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use super::*;

fn recording_queue() -> (ExpiringQueue<u32>, Arc<Mutex<Vec<u32>>>) {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let fired_cb = Arc::clone(&fired);
    let queue = ExpiringQueue::new(move |v| fired_cb.lock().unwrap().push(v));
    (queue, fired)
}

#[test]
fn s3_ordered_expiry() {
    let (queue, fired) = recording_queue();
    queue.insert(0, 1, 42).unwrap();
    queue.insert(0, 2, 142).unwrap();
    queue.insert(0, 3, 8888).unwrap();

    assert_eq!(queue.expire_all(10), 0);
    assert_eq!(queue.expire_all(10000), 3);
    assert_eq!(&*fired.lock().unwrap(), &[1, 2, 3]);
}

#[test]
fn s4_reschedule() {
    let (queue, fired) = recording_queue();
    let handle = queue.insert(0, 99, 10).unwrap();
    queue.reschedule(0, &handle, 20).unwrap();

    assert_eq!(queue.expire_all(15), 0);
    assert_eq!(queue.expire_all(30), 1);
    assert_eq!(&*fired.lock().unwrap(), &[99]);
}

#[test]
fn remove_cancels_an_item() {
    let (queue, fired) = recording_queue();
    let handle = queue.insert(0, 1, 10).unwrap();
    assert_eq!(queue.remove(&handle), Some(1));
    assert_eq!(queue.remove(&handle), None);

    queue.expire_all(100);
    assert!(fired.lock().unwrap().is_empty());
}

#[test]
fn heap_order_survives_interleaved_operations() {
    let (queue, fired) = recording_queue();
    let mut handles = Vec::new();
    for (i, ttl) in [50, 10, 40, 20, 30].into_iter().enumerate() {
        handles.push(queue.insert(0, i as u32, ttl).unwrap());
    }
    // Cancel the item with ttl=40 (index 2), reschedule ttl=50 (index 0) to fire first.
    queue.remove(&handles[2]);
    queue.reschedule(0, &handles[0], 5).unwrap();

    queue.expire_all(1000);
    // Expected firing order by final deadline: idx0(5), idx1(10), idx3(20), idx4(30).
    assert_eq!(&*fired.lock().unwrap(), &[0, 1, 3, 4]);
}

#[test]
fn expire_respects_max_count() {
    let (queue, fired) = recording_queue();
    for i in 0..10u32 {
        queue.insert(0, i, 1).unwrap();
    }
    assert_eq!(queue.expire(100, 3), 3);
    assert_eq!(queue.expire(100, usize::MAX), 7);
    assert_eq!(fired.lock().unwrap().len(), 10);
}

#[test]
fn growth_past_default_capacity() {
    let (queue, _fired) = recording_queue();
    for i in 0..500u32 {
        queue.insert(0, i, i as u64).unwrap();
    }
    assert_eq!(queue.len(), 500);
    assert_eq!(queue.expire_all(u64::MAX), 500);
}

#[test]
fn drop_fires_remaining_items_in_order() {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let fired_cb = Arc::clone(&fired);
    {
        let queue = ExpiringQueue::new(move |v: u32| fired_cb.lock().unwrap().push(v));
        queue.insert(0, 3, 30).unwrap();
        queue.insert(0, 1, 10).unwrap();
        queue.insert(0, 2, 20).unwrap();
    }
    assert_eq!(&*fired.lock().unwrap(), &[1, 2, 3]);
}

#[test]
fn concurrent_inserts_and_removals_never_panic() {
    let fired_count = Arc::new(AtomicUsize::new(0));
    let count_cb = Arc::clone(&fired_count);
    let queue = Arc::new(ExpiringQueue::new(move |_: u32| {
        count_cb.fetch_add(1, Ordering::Relaxed);
    }));

    let inserters: Vec<_> = (0..4)
        .map(|t| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut handles = Vec::new();
                for i in 0..100u32 {
                    handles.push(queue.insert(0, t * 100 + i, i as u64).unwrap());
                }
                handles
            })
        })
        .collect();

    let mut all_handles = Vec::new();
    for t in inserters {
        all_handles.extend(t.join().unwrap());
    }
    assert_eq!(queue.len(), 400);

    for handle in &all_handles[..200] {
        queue.remove(handle);
    }
    assert_eq!(queue.len(), 200);

    let fired = queue.expire_all(u64::MAX);
    assert_eq!(fired, 200);
    assert_eq!(fired_count.load(Ordering::Relaxed), 200);
}

#[test]
fn stats_track_operations() {
    let (queue, _fired) = recording_queue();
    let handle = queue.insert(0, 1, 10).unwrap();
    queue.reschedule(0, &handle, 20).unwrap();
    queue.expire_all(100);

    let snapshot = queue.stats();
    assert_eq!(snapshot.inserts, 1);
    assert_eq!(snapshot.reschedules, 1);
    assert_eq!(snapshot.expired, 1);
}
