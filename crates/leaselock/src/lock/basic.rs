//! Immediate-acquire lock handle.

use chrono::{DateTime, Duration as TimeDelta, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::record::LockRecord;
use super::{lock_path_for, REFRESH_FACTOR};

/// Advisory lock handle with immediate (no-wait) acquisition.
///
/// A handle is bound to one lock-file path for its whole lifetime. It never
/// blocks waiting for a competing holder: acquisition either succeeds right
/// away or reports `false`, and the caller decides whether to retry.
/// Disposal cancels the handle's background tasks and deletes the lock file
/// if it still exists; the [`Drop`] impl performs the same cleanup so the
/// lock is released on every exit path.
#[derive(Debug)]
pub struct BasicLock {
    lock_path: PathBuf,
    record: LockRecord,
    cancel: CancellationToken,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl BasicLock {
    /// Create a handle for the resource at `target`. The lock file lives
    /// next to the target with its extension replaced by `lock`.
    pub fn new(target: impl AsRef<Path>) -> Self {
        let lock_path = lock_path_for(target.as_ref());
        let record = LockRecord::new(&lock_path);
        Self {
            lock_path,
            record,
            cancel: CancellationToken::new(),
            refresh_task: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Path of the lock file this handle competes through.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Try to take the lock until `release`.
    ///
    /// Succeeds when no lock file exists or the current one has expired and
    /// the overwrite goes through. A live competing lock reports `false`.
    pub async fn try_acquire_until(&self, release: DateTime<Utc>) -> bool {
        if !file_exists(&self.lock_path).await {
            return self.record.try_set_release_date(release).await;
        }
        if self.record.release_date().await > Utc::now() {
            return false;
        }
        self.record.try_set_release_date(release).await
    }

    /// Try to take the lock for `duration` from now.
    ///
    /// With `refresh`, a successful acquisition also starts a background
    /// task that keeps extending the release instant until the handle is
    /// disposed, so the lock outlives holders that run long.
    pub async fn try_acquire_for(&self, duration: Duration, refresh: bool) -> bool {
        if !self.try_acquire_until(release_after(duration)).await {
            return false;
        }
        if refresh {
            let task = spawn_refresh(self.record.clone(), self.cancel.clone(), duration);
            if let Ok(mut slot) = self.refresh_task.lock() {
                *slot = Some(task);
            }
        }
        true
    }

    /// Push the current release instant out by `duration`. Best-effort:
    /// write failures are swallowed.
    pub async fn add_time(&self, duration: Duration) {
        let release = self.record.release_date().await;
        self.record
            .try_set_release_date(extend(release, duration))
            .await;
    }

    /// Current on-disk release instant; far future when no lock file exists.
    pub async fn release_date(&self) -> DateTime<Utc> {
        self.record.release_date().await
    }

    /// Cancel background tasks, then delete the lock file if it still
    /// exists. Idempotent; I/O failures are swallowed.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        // Let an in-flight refresh write finish before deleting, so it
        // cannot resurrect the file afterwards.
        let task = self.refresh_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = task {
            let _ = task.await;
        }
        if let Err(err) = tokio::fs::remove_file(&self.lock_path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to delete lock file {:?}: {}", self.lock_path, err);
            }
        }
    }
}

impl Drop for BasicLock {
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
        // Blocking best-effort delete; dispose() is the async path.
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

/// Background task: extend the release by `0.9 × duration`, sleep the same
/// interval, repeat until the handle token fires.
fn spawn_refresh(
    record: LockRecord,
    cancel: CancellationToken,
    duration: Duration,
) -> JoinHandle<()> {
    let interval = duration.mul_f64(REFRESH_FACTOR);
    tokio::spawn(async move {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let release = record.release_date().await;
            record.try_set_release_date(extend(release, interval)).await;
            if cancel
                .run_until_cancelled(tokio::time::sleep(interval))
                .await
                .is_none()
            {
                break;
            }
        }
    })
}

pub(crate) async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// `now + duration`, saturating at the far-future bound.
pub(crate) fn release_after(duration: Duration) -> DateTime<Utc> {
    extend(Utc::now(), duration)
}

pub(crate) fn extend(instant: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| instant.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
