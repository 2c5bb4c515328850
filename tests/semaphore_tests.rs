//! Integration tests for the admission-control semaphore.

use compio_admission::{Resources, Semaphore, SemaphoreConfig};
use std::time::Duration;

#[compio::test]
async fn test_basic_admit_release() {
    compio::time::timeout(Duration::from_secs(5), async {
        let sem = Semaphore::new(SemaphoreConfig::new(1, 1024));
        let permit = sem.wait_admission(0, None).await.unwrap();
        assert_eq!(sem.available_resources(), Resources::new(0, 1024));
        drop(permit);
        assert_eq!(sem.available_resources(), Resources::new(1, 1024));
    })
    .await
    .expect("test timed out");
}

#[compio::test]
async fn test_concurrent_admission() {
    compio::time::timeout(Duration::from_secs(10), async {
        let sem = Semaphore::new(SemaphoreConfig::new(5, 4096));
        let mut handles = vec![];

        // Spawn 20 tasks, but only 5 can hold a slot concurrently.
        for i in 0..20 {
            let sem = sem.clone();
            let handle = compio::runtime::spawn(async move {
                let _permit = sem.wait_admission(64, None).await.unwrap();
                compio::time::sleep(Duration::from_millis(5)).await;
                i
            });
            handles.push(handle);
        }

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), i);
        }

        assert_eq!(sem.available_resources(), Resources::new(5, 4096));
    })
    .await
    .expect("test timed out");
}

#[test]
fn test_consume_resources_is_synchronous() {
    let sem = Semaphore::new(SemaphoreConfig::new(1, 1024));

    let permit1 = sem.consume_resources(Resources::new(1, 0));
    assert_eq!(sem.available_resources(), Resources::new(0, 1024));

    // A second slot has no room; `consume_resources` is an unconditional
    // debit reserved for callers that already know capacity exists, so
    // exercising the queue/no-room path instead uses `try_evict_one_inactive_read`
    // returning false when nothing is registered.
    assert!(!sem.try_evict_one_inactive_read());

    drop(permit1);
    assert_eq!(sem.available_resources(), Resources::new(1, 1024));
}

#[compio::test]
async fn test_memory_soft_admission_allows_overcommit() {
    compio::time::timeout(Duration::from_secs(5), async {
        let sem = Semaphore::new(SemaphoreConfig::new(10, 64));
        // 10_000 bytes requested against a 64-byte budget still admits,
        // since the soft memory dimension only blocks once headroom is gone.
        let permit = sem.wait_admission(10_000, None).await.unwrap();
        assert_eq!(sem.available_resources(), Resources::new(9, 64 - 10_000));
        drop(permit);
        assert_eq!(sem.available_resources(), Resources::new(10, 64));
    })
    .await
    .expect("test timed out");
}

#[compio::test]
async fn test_single_slot_waiter_wakes_on_release() {
    compio::time::timeout(Duration::from_secs(5), async {
        let sem = Semaphore::new(SemaphoreConfig::new(1, 1024));
        let permit = sem.wait_admission(0, None).await.unwrap();

        let sem_clone = sem.clone();
        let handle = compio::runtime::spawn(async move {
            let _permit = sem_clone.wait_admission(0, None).await.unwrap();
            "admitted"
        });

        compio::time::sleep(Duration::from_millis(10)).await;
        drop(permit);

        let result = compio::time::timeout(Duration::from_millis(200), handle).await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap().unwrap(), "admitted");
    })
    .await
    .expect("test timed out");
}

#[compio::test]
async fn test_fifo_wake_order() {
    compio::time::timeout(Duration::from_secs(10), async {
        use std::cell::RefCell;
        use std::rc::Rc;

        let sem = Semaphore::new(SemaphoreConfig::new(1, 1024));
        let order = Rc::new(RefCell::new(Vec::new()));

        let permit = sem.wait_admission(0, None).await.unwrap();

        let mut handles = vec![];
        for i in 0..5 {
            let sem = sem.clone();
            let order = order.clone();
            handles.push(compio::runtime::spawn(async move {
                let _permit = sem.wait_admission(0, None).await.unwrap();
                order.borrow_mut().push(i);
            }));
        }

        compio::time::sleep(Duration::from_millis(50)).await;
        drop(permit);

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);
    })
    .await
    .expect("test timed out");
}

#[compio::test]
async fn test_queue_overload_rejects_past_max_queue_length() {
    compio::time::timeout(Duration::from_secs(5), async {
        let sem = Semaphore::new(SemaphoreConfig::new(1, 1024).with_max_queue_length(1));
        let _held = sem.wait_admission(0, None).await.unwrap();

        let sem_clone = sem.clone();
        let waiter = compio::runtime::spawn(async move { sem_clone.wait_admission(0, None).await });
        compio::time::sleep(Duration::from_millis(10)).await;

        let rejected = sem.wait_admission(0, None).await;
        assert!(matches!(
            rejected,
            Err(compio_admission::SemaphoreError::QueueOverload { .. })
        ));

        drop(_held);
        waiter.await.unwrap().unwrap();
    })
    .await
    .expect("test timed out");
}

#[compio::test]
async fn test_admission_timeout() {
    compio::time::timeout(Duration::from_secs(5), async {
        let sem = Semaphore::new(SemaphoreConfig::new(1, 1024));
        let _held = sem.wait_admission(0, None).await.unwrap();

        let deadline = std::time::Instant::now() + Duration::from_millis(20);
        let result = sem.wait_admission(0, Some(deadline)).await;
        assert!(matches!(
            result,
            Err(compio_admission::SemaphoreError::AdmissionTimeout { .. })
        ));
    })
    .await
    .expect("test timed out");
}
