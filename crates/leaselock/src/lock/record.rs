//! Persistence adapter for the lock file.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::ticks;

/// Reads and writes the single release instant stored in a lock file.
///
/// This is the only type that touches the file, and it tolerates every
/// failure. A missing file reads as the far-future sentinel ("no lock file,
/// nothing to wait out"). Unreadable or torn content reads as the far-past
/// sentinel, so it is never mistaken for a live lock; a competing handle
/// may overwrite the file during the instant a write is torn, and the next
/// successful write restores canonical state. Writes report `false` instead
/// of failing.
#[derive(Debug, Clone)]
pub struct LockRecord {
    path: PathBuf,
}

impl LockRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the lock file this record is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current release instant.
    ///
    /// Far future when no file exists, far past when the file cannot be
    /// read or parsed.
    pub async fn release_date(&self) -> DateTime<Utc> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return DateTime::<Utc>::MAX_UTC;
            }
            Err(err) => {
                tracing::debug!("Tolerating unreadable lock file {:?}: {}", self.path, err);
                return DateTime::<Utc>::MIN_UTC;
            }
        };
        match content.trim().parse::<i64>() {
            Ok(ticks) => ticks::to_datetime(ticks),
            Err(_) => {
                tracing::debug!("Tolerating unparseable lock file {:?}", self.path);
                DateTime::<Utc>::MIN_UTC
            }
        }
    }

    /// Write `release` as the new on-disk instant, creating the file if it
    /// is missing and truncating it otherwise. Returns whether the write
    /// went through; callers must not consider the lock acquired on `false`.
    pub async fn try_set_release_date(&self, release: DateTime<Utc>) -> bool {
        let payload = ticks::from_datetime(release).to_string();
        match fs::write(&self.path, payload).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("Lock file write to {:?} failed: {}", self.path, err);
                false
            }
        }
    }
}
