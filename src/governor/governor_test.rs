use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::*;

async fn run_blocking(pool: &PermitPool, tasks: usize, each: Duration) -> Duration {
    let started = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..tasks {
        let permit = pool.clone();
        handles.push(tokio::spawn(async move {
            let guard = permit.acquire().await.unwrap();
            tokio::task::spawn_blocking(move || {
                std::thread::sleep(each);
                drop(guard);
            })
            .await
            .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    started.elapsed()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_permit_serializes_blocking_work() {
    let pool = PermitPool::new(1);
    let elapsed = run_blocking(&pool, 3, Duration::from_millis(100)).await;
    assert!(elapsed >= Duration::from_millis(300), "took {elapsed:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wider_pool_runs_in_parallel() {
    let pool = PermitPool::new(3);
    let elapsed = run_blocking(&pool, 3, Duration::from_millis(200)).await;
    assert!(elapsed < Duration::from_millis(550), "took {elapsed:?}");
}

#[tokio::test]
async fn permit_returns_on_drop() {
    let pool = PermitPool::new(2);
    let a = pool.acquire().await.unwrap();
    let _b = pool.acquire().await.unwrap();
    assert_eq!(pool.in_use(), 2);
    assert!(pool.try_acquire().is_none());

    drop(a);
    assert_eq!(pool.available(), 1);
    assert!(pool.try_acquire().is_some());
}

#[tokio::test]
async fn zero_capacity_means_one() {
    assert_eq!(PermitPool::new(0).capacity(), 1);
}

#[tokio::test]
async fn closed_pool_rejects() {
    let pool = PermitPool::new(1);
    pool.close();
    assert_eq!(pool.acquire().await.unwrap_err(), GovernorError::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_initialize_once() {
    let cell = Arc::new(InitOnce::new("Counter"));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cell = Arc::clone(&cell);
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            cell.call_once(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            })
            .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cell.state(), InitState::Done);
}

#[tokio::test]
async fn failure_is_remembered() {
    let cell = InitOnce::new("Broken");
    let first = cell.call_once(|| async { Err(anyhow::anyhow!("weights missing")) }).await;
    assert_eq!(
        first.unwrap_err(),
        InitError::Failed {
            unit: "Broken".to_string(),
            reason: "weights missing".to_string(),
        }
    );
    assert_eq!(cell.state(), InitState::Failed);

    let second = cell.call_once(|| async { Ok(()) }).await;
    assert_eq!(
        second.unwrap_err(),
        InitError::PreviouslyFailed {
            unit: "Broken".to_string(),
            reason: "weights missing".to_string(),
        }
    );
}

#[tokio::test]
async fn completed_cell_skips_initializer() {
    let cell = InitOnce::completed("Restored");
    let ran = AtomicUsize::new(0);
    cell.call_once(|| async {
        ran.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .await
    .unwrap();
    assert!(cell.is_done());
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}
