//! Integration tests for bounded-wait acquisition.
//!
//! Timing assertions carry generous margins: CI scheduling jitter easily
//! reaches tens of milliseconds, so each bound sits well clear of the
//! interval it discriminates.

use leaselock::{LockError, TimedLock, MIN_GRANULARITY};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn target_in(temp_dir: &TempDir) -> std::path::PathBuf {
    temp_dir.path().join("data.txt")
}

#[tokio::test]
async fn test_rejects_timeout_below_minimum() {
    let temp_dir = TempDir::new().unwrap();
    let lock = TimedLock::new(target_in(&temp_dir));

    let result = lock
        .try_acquire_or_timeout(Duration::from_secs(60), Duration::from_millis(10))
        .await;

    let err = result.expect_err("Sub-minimum timeout should be rejected");
    assert!(err.is_invalid_argument(), "Unexpected error: {:?}", err);
    assert!(!lock.lock_path().exists(), "Validation must precede any I/O");
}

#[tokio::test]
async fn test_rejects_retry_below_minimum() {
    let temp_dir = TempDir::new().unwrap();
    let lock = TimedLock::new(target_in(&temp_dir));

    let result = lock
        .try_acquire_or_timeout_with_retry(
            Duration::from_secs(60),
            Duration::from_secs(1),
            Duration::from_millis(5),
        )
        .await;

    assert!(matches!(result, Err(LockError::InvalidRetry { .. })));
}

#[tokio::test]
async fn test_rejects_retry_above_timeout() {
    let temp_dir = TempDir::new().unwrap();
    let lock = TimedLock::new(target_in(&temp_dir));

    let result = lock
        .try_acquire_or_timeout_with_retry(
            Duration::from_secs(60),
            Duration::from_millis(100),
            Duration::from_millis(200),
        )
        .await;

    assert!(matches!(result, Err(LockError::InvalidRetry { .. })));
}

#[tokio::test]
async fn test_accepts_boundary_arguments() {
    let temp_dir = TempDir::new().unwrap();
    let lock = TimedLock::new(target_in(&temp_dir));

    // timeout == retry == the minimum granularity is the smallest legal call.
    let result = lock
        .try_acquire_or_timeout_with_retry(Duration::from_secs(60), MIN_GRANULARITY, MIN_GRANULARITY)
        .await;

    assert!(matches!(result, Ok(true)));
    lock.dispose().await;
}

#[tokio::test]
async fn test_fast_path_acquires_without_waiting() {
    let temp_dir = TempDir::new().unwrap();
    let lock = TimedLock::new(target_in(&temp_dir));

    let start = Instant::now();
    let result = lock
        .try_acquire_or_timeout(Duration::from_secs(3600), Duration::from_secs(10))
        .await;

    assert!(matches!(result, Ok(true)));
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "Fast path must not consume the timeout, took {:?}",
        start.elapsed()
    );
    lock.dispose().await;
}

#[tokio::test]
async fn test_fails_fast_when_holder_outlives_timeout() {
    let temp_dir = TempDir::new().unwrap();
    let target = target_in(&temp_dir);

    let holder = TimedLock::new(&target);
    assert!(holder.try_acquire_for(Duration::from_secs(10), false).await);

    let contender = TimedLock::new(&target);
    let start = Instant::now();
    let result = contender
        .try_acquire_or_timeout(Duration::from_secs(10), Duration::from_millis(100))
        .await;

    assert!(matches!(result, Ok(false)));
    assert!(
        start.elapsed() < Duration::from_millis(80),
        "A hopeless wait should fail without consuming the timeout, took {:?}",
        start.elapsed()
    );
    holder.dispose().await;
}

#[tokio::test]
async fn test_waits_through_stated_release_then_acquires() {
    let temp_dir = TempDir::new().unwrap();
    let target = target_in(&temp_dir);

    let holder = TimedLock::new(&target);
    assert!(holder.try_acquire_for(Duration::from_millis(200), false).await);

    let contender = TimedLock::new(&target);
    let start = Instant::now();
    let result = contender
        .try_acquire_or_timeout(Duration::from_secs(3600), Duration::from_secs(2))
        .await;
    let elapsed = start.elapsed();

    assert!(matches!(result, Ok(true)));
    assert!(
        elapsed >= Duration::from_millis(150),
        "Acquisition should wait out the holder's lease, took {:?}",
        elapsed
    );
    assert!(
        elapsed < Duration::from_secs(1),
        "Acquisition should follow promptly on expiry, took {:?}",
        elapsed
    );

    contender.dispose().await;
    assert!(!contender.lock_path().exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_retry_interval_catches_early_release() {
    let temp_dir = TempDir::new().unwrap();
    let target = target_in(&temp_dir);

    // The holder claims 600 ms but actually releases after ~150 ms.
    let holder = Arc::new(TimedLock::new(&target));
    assert!(holder.try_acquire_for(Duration::from_millis(600), false).await);

    let early_release = {
        let holder = holder.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            holder.dispose().await;
        })
    };

    let contender = TimedLock::new(&target);
    let start = Instant::now();
    let result = contender
        .try_acquire_or_timeout_with_retry(
            Duration::from_secs(3600),
            Duration::from_secs(5),
            Duration::from_millis(50),
        )
        .await;
    let elapsed = start.elapsed();

    assert!(matches!(result, Ok(true)));
    assert!(
        elapsed < Duration::from_millis(450),
        "The retry path should win well before the stated release, took {:?}",
        elapsed
    );

    early_release.await.unwrap();
    contender.dispose().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dispose_cancels_pending_wait() {
    let temp_dir = TempDir::new().unwrap();
    let target = target_in(&temp_dir);

    let holder = TimedLock::new(&target);
    assert!(holder.try_acquire_for(Duration::from_secs(5), false).await);

    let contender = Arc::new(TimedLock::new(&target));
    let waiting = {
        let contender = contender.clone();
        tokio::spawn(async move {
            contender
                .try_acquire_or_timeout_with_retry(
                    Duration::from_secs(1),
                    Duration::from_secs(5),
                    Duration::from_millis(50),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    let start = Instant::now();
    contender.dispose().await;

    let result = waiting.await.unwrap();
    assert!(
        matches!(result, Ok(false)),
        "A disposed handle's pending wait should report contention, got {:?}",
        result
    );
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "Cancellation should cut the wait short, took {:?}",
        start.elapsed()
    );
    assert!(
        holder.lock_path().exists(),
        "Cancelling a wait must leave the holder's lock intact"
    );
    holder.dispose().await;
}

#[tokio::test]
async fn test_timed_refresh_extends_cached_release_for_disposal() {
    let temp_dir = TempDir::new().unwrap();
    let target = target_in(&temp_dir);

    let holder = TimedLock::new(&target);
    assert!(holder.try_acquire_for(Duration::from_millis(200), true).await);

    // Several refresh cycles move the on-disk release; the cache has to
    // follow for disposal to still recognize its own lock.
    tokio::time::sleep(Duration::from_millis(600)).await;

    holder.dispose().await;
    assert!(
        !holder.lock_path().exists(),
        "Disposal after refresh cycles should still delete the handle's own lock"
    );
}
