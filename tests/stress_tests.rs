//! Stress tests for the admission-control semaphore.
//!
//! These tests verify behavior under high load and contention, all within
//! the single-threaded cooperative executor this crate targets.

use compio_admission::{Resources, Semaphore, SemaphoreConfig};
use std::cell::Cell;
use std::rc::Rc;

#[compio::test]
async fn test_high_contention_single_slot() {
    let sem = Semaphore::new(SemaphoreConfig::new(1, 1024));
    let counter = Rc::new(Cell::new(0usize));
    let mut handles = vec![];

    // 1000 tasks contending for 1 slot.
    for _ in 0..1000 {
        let sem = sem.clone();
        let counter = counter.clone();
        handles.push(compio::runtime::spawn(async move {
            let _p = sem.wait_admission(0, None).await.unwrap();
            counter.set(counter.get() + 1);
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(counter.get(), 1000);
    assert_eq!(sem.available_resources(), Resources::new(1, 1024));
}

#[compio::test]
async fn test_rapid_admit_release_cycles() {
    let sem = Semaphore::new(SemaphoreConfig::new(10, 4096));
    let counter = Rc::new(Cell::new(0usize));
    let mut handles = vec![];

    // 100 tasks, each doing 100 admit/release cycles.
    for _ in 0..100 {
        let sem = sem.clone();
        let counter = counter.clone();
        handles.push(compio::runtime::spawn(async move {
            for _ in 0..100 {
                let _p = sem.wait_admission(16, None).await.unwrap();
                counter.set(counter.get() + 1);
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(counter.get(), 10_000);
    assert_eq!(sem.available_resources(), Resources::new(10, 4096));
}

#[compio::test]
async fn test_many_waiters_all_complete() {
    let sem = Semaphore::new(SemaphoreConfig::new(1, 1024));
    let permit = sem.wait_admission(0, None).await.unwrap();

    let mut handles = vec![];
    for i in 0..100 {
        let sem = sem.clone();
        handles.push(compio::runtime::spawn(async move {
            let _p = sem.wait_admission(0, None).await.unwrap();
            i
        }));
    }

    drop(permit);

    let mut results = vec![];
    for h in handles {
        results.push(h.await.unwrap());
    }

    assert_eq!(results.len(), 100);
    assert_eq!(sem.available_resources(), Resources::new(1, 1024));
}

#[compio::test]
async fn test_semaphore_under_mixed_operations() {
    let sem = Semaphore::new(SemaphoreConfig::new(50, 1024 * 1024));
    let mut handles = vec![];

    for i in 0..200 {
        let sem = sem.clone();
        handles.push(compio::runtime::spawn(async move {
            if i % 3 == 0 {
                let _p = sem.consume_resources(Resources::new(0, 1));
            } else {
                let _p = sem.wait_admission(1, None).await.unwrap();
            }
            i
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(sem.available_resources(), Resources::new(50, 1024 * 1024));
}

#[compio::test]
async fn test_cancellation_of_queued_waiters_is_stress_safe() {
    let sem = Semaphore::new(SemaphoreConfig::new(1, 1024));

    let permit = sem.wait_admission(0, None).await.unwrap();

    // Start many waiter futures but drop them before they resolve, exercising
    // the `WaitFuture::drop` dequeue-by-id path under load.
    for _ in 0..100 {
        let sem = sem.clone();
        let fut = Box::pin(async move {
            let _p = sem.wait_admission(0, None).await.unwrap();
        });
        drop(fut);
    }

    assert_eq!(sem.queue_len(), 0);

    drop(permit);
    let _p2 = sem.wait_admission(0, None).await.unwrap();
}
