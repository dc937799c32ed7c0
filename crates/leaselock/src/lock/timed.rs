//! Bounded-wait lock handle.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::basic::{extend, file_exists, release_after};
use super::record::LockRecord;
use super::{lock_path_for, MIN_GRANULARITY, REFRESH_FACTOR};
use crate::error::{LockError, Result};
use crate::ticks;

/// Advisory lock handle with bounded-wait acquisition.
///
/// Carries the same immediate operations as [`super::BasicLock`], plus
/// [`try_acquire_or_timeout`](TimedLock::try_acquire_or_timeout), which
/// waits for a competing lock to be released or to expire up to a
/// caller-supplied deadline.
///
/// Every successful write by this handle is also remembered in a cached
/// release field. Disposal deletes the lock file only while its content
/// still equals that cache, so a lock that a competing handle has since
/// re-acquired is left alone.
#[derive(Debug)]
pub struct TimedLock {
    lock_path: PathBuf,
    record: LockRecord,
    cancel: CancellationToken,
    cached_release_ticks: Arc<AtomicI64>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl TimedLock {
    /// Create a handle for the resource at `target`. The lock file lives
    /// next to the target with its extension replaced by `lock`.
    pub fn new(target: impl AsRef<Path>) -> Self {
        let lock_path = lock_path_for(target.as_ref());
        let record = LockRecord::new(&lock_path);
        Self {
            lock_path,
            record,
            cancel: CancellationToken::new(),
            cached_release_ticks: Arc::new(AtomicI64::new(ticks::NEVER)),
            refresh_task: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Path of the lock file this handle competes through.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Try to take the lock until `release`, without waiting.
    pub async fn try_acquire_until(&self, release: DateTime<Utc>) -> bool {
        acquire_until(&self.record, &self.cached_release_ticks, release).await
    }

    /// Try to take the lock for `duration` from now, without waiting.
    ///
    /// With `refresh`, a successful acquisition also starts a background
    /// task that keeps extending the release instant until the handle is
    /// disposed.
    pub async fn try_acquire_for(&self, duration: Duration, refresh: bool) -> bool {
        if !self.try_acquire_until(release_after(duration)).await {
            return false;
        }
        if refresh {
            self.spawn_refresh(duration);
        }
        true
    }

    /// Push the current release instant out by `duration`. Best-effort:
    /// write failures are swallowed.
    pub async fn add_time(&self, duration: Duration) {
        let release = self.record.release_date().await;
        set_release(
            &self.record,
            &self.cached_release_ticks,
            extend(release, duration),
        )
        .await;
    }

    /// Current on-disk release instant; far future when no lock file exists.
    pub async fn release_date(&self) -> DateTime<Utc> {
        self.record.release_date().await
    }

    /// Wait up to `timeout` for the lock, sleeping straight through the
    /// holder's stated release. Equivalent to
    /// [`try_acquire_or_timeout_with_retry`](TimedLock::try_acquire_or_timeout_with_retry)
    /// with `retry = timeout`.
    pub async fn try_acquire_or_timeout(
        &self,
        duration: Duration,
        timeout: Duration,
    ) -> Result<bool> {
        self.try_acquire_or_timeout_with_retry(duration, timeout, timeout)
            .await
    }

    /// Wait up to `timeout` for the lock, additionally polling every
    /// `retry` in case the holder releases before its stated release.
    ///
    /// Returns `Ok(true)` once an acquisition write succeeds, `Ok(false)`
    /// when the deadline passes, the competing holder outlives it, or this
    /// handle is disposed mid-wait. Rejects `timeout` below
    /// [`MIN_GRANULARITY`] and `retry` outside
    /// `MIN_GRANULARITY..=timeout`.
    pub async fn try_acquire_or_timeout_with_retry(
        &self,
        duration: Duration,
        timeout: Duration,
        retry: Duration,
    ) -> Result<bool> {
        if timeout < MIN_GRANULARITY {
            return Err(LockError::InvalidTimeout {
                actual: timeout,
                minimum: MIN_GRANULARITY,
            });
        }
        if retry < MIN_GRANULARITY || retry > timeout {
            return Err(LockError::InvalidRetry {
                actual: retry,
                minimum: MIN_GRANULARITY,
                timeout,
            });
        }
        if self.cancel.is_cancelled() {
            return Ok(false);
        }

        // Fast path: nothing to wait out.
        if !file_exists(&self.lock_path).await {
            return Ok(self.try_acquire_for(duration, false).await);
        }

        let release = self.record.release_date().await;
        if release > extend(Utc::now(), timeout) {
            // The holder outlives our deadline; waiting cannot help.
            return Ok(false);
        }

        let waiter = Waiter {
            record: self.record.clone(),
            cache: self.cached_release_ticks.clone(),
            token: self.cancel.child_token(),
            release,
            deadline: Instant::now() + timeout,
            duration,
        };

        let mut strategies = JoinSet::new();
        {
            let waiter = waiter.clone();
            strategies.spawn(async move { waiter.wait_till_release().await });
        }
        if retry < timeout {
            let waiter = waiter.clone();
            strategies.spawn(async move { waiter.retry_before_release(retry).await });
        }

        // First success wins and cancels its sibling; a failed task is
        // surfaced exactly once unless the sibling already acquired.
        let mut acquired = false;
        let mut failure: Option<LockError> = None;
        while let Some(outcome) = strategies.join_next().await {
            match outcome {
                Ok(true) => {
                    acquired = true;
                    waiter.token.cancel();
                }
                Ok(false) => {}
                Err(err) => {
                    failure.get_or_insert(LockError::WaitTaskFailed(err.to_string()));
                    waiter.token.cancel();
                }
            }
        }
        match failure {
            Some(err) if !acquired => Err(err),
            Some(err) => {
                tracing::warn!("Wait task failed after the lock was acquired: {}", err);
                Ok(true)
            }
            None => Ok(acquired),
        }
    }

    /// Cancel background tasks, then release the lock only if the file
    /// still holds the last instant this handle wrote. Idempotent; I/O
    /// failures are swallowed.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        // Let an in-flight refresh write finish first, both so the cache is
        // final and so the write cannot resurrect a deleted file.
        let task = self.refresh_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = task {
            let _ = task.await;
        }
        let cached = self.cached_release_ticks.load(Ordering::SeqCst);
        if cached == ticks::NEVER {
            return;
        }
        let on_disk = match tokio::fs::read_to_string(&self.lock_path).await {
            Ok(content) => content,
            Err(_) => return,
        };
        if on_disk.trim().parse::<i64>().map_or(false, |t| t == cached) {
            if let Err(err) = tokio::fs::remove_file(&self.lock_path).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to delete lock file {:?}: {}", self.lock_path, err);
                }
            }
        }
    }

    fn spawn_refresh(&self, duration: Duration) {
        let record = self.record.clone();
        let cache = self.cached_release_ticks.clone();
        let cancel = self.cancel.clone();
        let interval = duration.mul_f64(REFRESH_FACTOR);
        let task = tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let release = record.release_date().await;
                set_release(&record, &cache, extend(release, interval)).await;
                if cancel
                    .run_until_cancelled(tokio::time::sleep(interval))
                    .await
                    .is_none()
                {
                    break;
                }
            }
        });
        if let Ok(mut slot) = self.refresh_task.lock() {
            *slot = Some(task);
        }
    }
}

impl Drop for TimedLock {
    fn drop(&mut self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        if let Ok(mut slot) = self.refresh_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        // Blocking best-effort release; dispose() is the async path. The
        // same matched-content check keeps a re-acquired lock intact.
        let cached = self.cached_release_ticks.load(Ordering::SeqCst);
        if cached == ticks::NEVER {
            return;
        }
        if let Ok(on_disk) = std::fs::read_to_string(&self.lock_path) {
            if on_disk.trim().parse::<i64>().map_or(false, |t| t == cached) {
                let _ = std::fs::remove_file(&self.lock_path);
            }
        }
    }
}

/// Write `release` through to disk and remember it in the handle's cache.
async fn set_release(record: &LockRecord, cache: &AtomicI64, release: DateTime<Utc>) -> bool {
    if !record.try_set_release_date(release).await {
        return false;
    }
    cache.store(ticks::from_datetime(release), Ordering::SeqCst);
    true
}

/// The immediate-acquire protocol with cached write-through.
async fn acquire_until(record: &LockRecord, cache: &AtomicI64, release: DateTime<Utc>) -> bool {
    if !file_exists(record.path()).await {
        return set_release(record, cache, release).await;
    }
    if record.release_date().await > Utc::now() {
        return false;
    }
    set_release(record, cache, release).await
}

/// Shared state of one cooperative acquisition strategy: the record to
/// write through, the competing holder's stated release, and the overall
/// deadline. Strategies observe the token between operations and report
/// `false` instead of an error when it fires.
#[derive(Clone)]
struct Waiter {
    record: LockRecord,
    cache: Arc<AtomicI64>,
    token: CancellationToken,
    release: DateTime<Utc>,
    deadline: Instant,
    duration: Duration,
}

impl Waiter {
    async fn try_acquire(&self) -> bool {
        acquire_until(&self.record, &self.cache, release_after(self.duration)).await
    }

    /// Sleep straight through the holder's stated release, then poll at the
    /// minimum granularity until the deadline.
    async fn wait_till_release(self) -> bool {
        let delay = ceil_ms_until(self.release);
        if !delay.is_zero()
            && self
                .token
                .run_until_cancelled(tokio::time::sleep(delay))
                .await
                .is_none()
        {
            return false;
        }
        self.poll(MIN_GRANULARITY).await
    }

    /// Poll every `retry` while the holder's stated release is still ahead,
    /// catching holders that release early, then fall back to fine-grained
    /// polling until the deadline.
    async fn retry_before_release(self, retry: Duration) -> bool {
        while Utc::now() < self.release {
            if self.token.is_cancelled() {
                return false;
            }
            if self.try_acquire().await {
                return true;
            }
            let now = Instant::now();
            if now >= self.deadline {
                return false;
            }
            let nap = retry.min(self.deadline - now);
            if self
                .token
                .run_until_cancelled(tokio::time::sleep(nap))
                .await
                .is_none()
            {
                return false;
            }
        }
        self.poll(MIN_GRANULARITY).await
    }

    /// Attempt, sleep `interval`, repeat until success or the deadline.
    async fn poll(&self, interval: Duration) -> bool {
        loop {
            if self.token.is_cancelled() {
                return false;
            }
            if self.try_acquire().await {
                return true;
            }
            let now = Instant::now();
            if now >= self.deadline {
                return false;
            }
            let nap = interval.min(self.deadline - now);
            if self
                .token
                .run_until_cancelled(tokio::time::sleep(nap))
                .await
                .is_none()
            {
                return false;
            }
        }
    }
}

/// Ceiling-rounded millisecond delay from now until `release`, never
/// negative.
fn ceil_ms_until(release: DateTime<Utc>) -> Duration {
    let remaining = release - Utc::now();
    match remaining.num_microseconds() {
        Some(us) if us > 0 => Duration::from_millis((us as u64).div_ceil(1000)),
        Some(_) => Duration::ZERO,
        // Delta too large for microseconds; millisecond precision is plenty.
        None => Duration::from_millis(remaining.num_milliseconds().max(0) as u64),
    }
}
