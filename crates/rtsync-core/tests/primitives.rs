//! Cross-thread behaviour of the primitives on every backend profile

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use rtsync_core::sync::{Condvar, Mutex, Platform, Semaphore};

fn platforms() -> Vec<Platform> {
    vec![
        Platform::native(),
        Platform::semaphore_only(),
        Platform::lock_only(),
    ]
}

#[test]
fn test_mutual_exclusion() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 500;

    for platform in platforms() {
        let mutex = Arc::new(Mutex::with_platform(&platform).unwrap());
        let inside = Arc::new(AtomicBool::new(false));
        let total = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let (mutex, inside, total) = (mutex.clone(), inside.clone(), total.clone());
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        let _guard = mutex.lock_guard();
                        assert!(!inside.swap(true, Ordering::SeqCst), "two owners at once");
                        // Read-modify-write that would lose updates without the lock
                        let seen = total.load(Ordering::Relaxed);
                        thread::yield_now();
                        total.store(seen + 1, Ordering::Relaxed);
                        inside.store(false, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(total.load(Ordering::SeqCst), THREADS * ROUNDS, "{}", platform.name());
    }
}

#[test]
fn test_signals_release_exactly_that_many_waiters() {
    const WAITERS: usize = 4;
    const SIGNALS: usize = 2;

    for platform in platforms() {
        let mutex = Arc::new(Mutex::with_platform(&platform).unwrap());
        let cv = Arc::new(Condvar::with_platform(&platform).unwrap());
        let registered = Arc::new(AtomicUsize::new(0));

        let waiters: Vec<_> = (0..WAITERS)
            .map(|_| {
                let (mutex, cv, registered) = (mutex.clone(), cv.clone(), registered.clone());
                thread::spawn(move || {
                    mutex.lock();
                    registered.fetch_add(1, Ordering::SeqCst);
                    let woken = cv.wait_timeout(&mutex, Duration::from_millis(600)).unwrap();
                    mutex.unlock().unwrap();
                    woken
                })
            })
            .collect();

        // A waiter bumps the counter under the mutex and is registered with
        // the condvar before it lets go, so once we own the mutex with the
        // count complete every waiter can be signalled.
        loop {
            mutex.lock();
            if registered.load(Ordering::SeqCst) == WAITERS {
                break;
            }
            mutex.unlock().unwrap();
            thread::sleep(Duration::from_millis(1));
        }
        for _ in 0..SIGNALS {
            cv.signal();
        }
        mutex.unlock().unwrap();

        let woken = waiters
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|&woken| woken)
            .count();
        assert_eq!(woken, SIGNALS, "{}", platform.name());
    }
}

#[test]
fn test_racing_signallers_release_exactly_that_many_waiters() {
    const WAITERS: usize = 6;
    const SIGNALLERS: usize = 4;
    const ROUNDS: usize = 5;

    for platform in platforms() {
        for round in 0..ROUNDS {
            let mutex = Arc::new(Mutex::with_platform(&platform).unwrap());
            let cv = Arc::new(Condvar::with_platform(&platform).unwrap());
            let registered = Arc::new(AtomicUsize::new(0));

            let waiters: Vec<_> = (0..WAITERS)
                .map(|_| {
                    let (mutex, cv, registered) = (mutex.clone(), cv.clone(), registered.clone());
                    thread::spawn(move || {
                        mutex.lock();
                        registered.fetch_add(1, Ordering::SeqCst);
                        let woken = cv.wait_timeout(&mutex, Duration::from_millis(250)).unwrap();
                        mutex.unlock().unwrap();
                        woken
                    })
                })
                .collect();

            loop {
                mutex.lock();
                if registered.load(Ordering::SeqCst) == WAITERS {
                    break;
                }
                mutex.unlock().unwrap();
                thread::sleep(Duration::from_millis(1));
            }

            let start = Arc::new(Barrier::new(SIGNALLERS + 1));
            let signallers: Vec<_> = (0..SIGNALLERS)
                .map(|_| {
                    let (cv, start) = (cv.clone(), start.clone());
                    thread::spawn(move || {
                        start.wait();
                        cv.signal();
                    })
                })
                .collect();
            mutex.unlock().unwrap();
            start.wait();

            for signaller in signallers {
                signaller.join().unwrap();
            }
            let woken = waiters
                .into_iter()
                .map(|w| w.join().unwrap())
                .filter(|&woken| woken)
                .count();
            assert_eq!(woken, SIGNALLERS, "{} round {}", platform.name(), round);
        }
    }
}

#[test]
fn test_signal_without_waiters_is_not_remembered() {
    for platform in platforms() {
        let mutex = Mutex::with_platform(&platform).unwrap();
        let cv = Condvar::with_platform(&platform).unwrap();
        for _ in 0..3 {
            cv.signal();
        }

        mutex.lock();
        let woken = cv.wait_timeout(&mutex, Duration::from_millis(30)).unwrap();
        mutex.unlock().unwrap();
        assert!(!woken, "{}", platform.name());
    }
}

#[test]
fn test_posts_then_waits_never_block() {
    for platform in platforms() {
        let sem = Semaphore::with_platform(&platform, 0).unwrap();
        for _ in 0..32 {
            sem.post();
        }
        let start = Instant::now();
        for _ in 0..32 {
            sem.wait();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

#[test]
fn test_producer_consumer_handoff() {
    for platform in platforms() {
        let items = Arc::new(Semaphore::with_platform(&platform, 0).unwrap());
        let consumed = Arc::new(AtomicUsize::new(0));

        let consumer = {
            let (items, consumed) = (items.clone(), consumed.clone());
            thread::spawn(move || {
                for _ in 0..100 {
                    assert!(items.wait_timeout(Duration::from_secs(5)));
                    consumed.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        for _ in 0..100 {
            items.post();
        }
        consumer.join().unwrap();
        assert_eq!(consumed.load(Ordering::SeqCst), 100);
    }
}
