use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use super::*;

fn recording_wheel(size: usize, res: u64) -> (TimerWheel<u32>, Arc<Mutex<Vec<u32>>>) {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let fired_cb = Arc::clone(&fired);
    let wheel = TimerWheel::with_config(size, res, move |v| fired_cb.lock().unwrap().push(v));
    (wheel, fired)
}

#[test]
fn s5_multi_timer_fires_in_tick_order() {
    let (wheel, fired) = recording_wheel(64, 1000);
    wheel.add(3 * 1000, 3).unwrap();
    wheel.add(1 * 1000, 1).unwrap();
    wheel.add(2 * 1000, 2).unwrap();

    assert_eq!(wheel.tick(1 * 1000).unwrap(), 1);
    assert_eq!(wheel.tick(2 * 1000).unwrap(), 1);
    assert_eq!(wheel.tick(3 * 1000).unwrap(), 1);
    assert_eq!(wheel.tick(4 * 1000).unwrap(), 0);
    assert_eq!(&*fired.lock().unwrap(), &[1, 2, 3]);
}

#[test]
fn s6_wrap_around_multi_round_timer() {
    let (wheel, fired) = recording_wheel(16, 1000);
    wheel.add((16 + 5) * 1000, 42).unwrap();

    for t in 1..=20u64 {
        assert_eq!(wheel.tick(t * 1000).unwrap(), 0);
    }
    assert_eq!(wheel.tick(21 * 1000).unwrap(), 1);
    assert_eq!(&*fired.lock().unwrap(), &[42]);
    assert!(wheel.stats().multi_round >= 1);
}

#[test]
fn zero_delay_is_a_silent_no_op() {
    let (wheel, fired) = recording_wheel(16, 1000);
    wheel.add(0, 7).unwrap();
    wheel.tick(1000).unwrap();
    assert!(fired.lock().unwrap().is_empty());
}

#[test]
fn ticking_backwards_in_time_is_ignored() {
    let (wheel, _fired) = recording_wheel(16, 1000);
    wheel.add(5 * 1000, 1).unwrap();
    assert_eq!(wheel.tick(3 * 1000).unwrap(), 0);
    assert_eq!(wheel.tick(1 * 1000).unwrap(), 0);
    assert_eq!(wheel.current_tick(), 4);
}

#[test]
fn shutdown_without_firing_drops_pending_timers() {
    let (wheel, fired) = recording_wheel(16, 1000);
    wheel.add(5 * 1000, 1).unwrap();
    wheel.add(6 * 1000, 2).unwrap();
    let count = wheel.shutdown(false);
    assert_eq!(count, 2);
    assert!(fired.lock().unwrap().is_empty());
}

#[test]
fn shutdown_with_fire_pending_fires_everything_left() {
    let (wheel, fired) = recording_wheel(16, 1000);
    wheel.add(5 * 1000, 1).unwrap();
    wheel.add(6 * 1000, 2).unwrap();
    let count = wheel.shutdown(true);
    assert_eq!(count, 2);
    assert_eq!(fired.lock().unwrap().len(), 2);
}

#[test]
fn slot_count_is_rounded_up_to_a_power_of_two() {
    let (wheel, _fired) = recording_wheel(100, 1000);
    assert_eq!(wheel.slot_count(), 128);
}

#[test]
fn concurrent_add_from_many_threads_all_eventually_fire() {
    let fired_count = Arc::new(AtomicUsize::new(0));
    let count_cb = Arc::clone(&fired_count);
    let wheel = Arc::new(TimerWheel::with_config(256, 1000, move |_: u32| {
        count_cb.fetch_add(1, Ordering::Relaxed);
    }));

    let adders: Vec<_> = (0..8)
        .map(|t| {
            let wheel = Arc::clone(&wheel);
            thread::spawn(move || {
                for i in 0..200u64 {
                    wheel.add((1 + i % 50) * 1000, (t * 1000 + i) as u32).unwrap();
                }
            })
        })
        .collect();
    for handle in adders {
        handle.join().unwrap();
    }

    for t in 1..=60u64 {
        wheel.tick(t * 1000).unwrap();
    }
    assert_eq!(fired_count.load(Ordering::Relaxed), 1600);
}
