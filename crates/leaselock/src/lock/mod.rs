//! Advisory file locks with an explicit expiry date.
//!
//! A lock lives in a sidecar file next to the guarded resource; its sole
//! content is the instant at which the lock stops being held, written as a
//! decimal tick count (see [`crate::ticks`]). Presence of the file means a
//! lock may be held; the instant compared to now decides whether it still
//! is. Locks are advisory: they bind only participants speaking this
//! protocol, and the only coordination primitive assumed is a shared
//! filesystem with consistent open/read/write/delete.
//!
//! Two handles bound to the same path in one process are independent
//! participants and compete through the file, exactly like handles in
//! different processes.

use std::path::{Path, PathBuf};
use std::time::Duration;

mod basic;
mod record;
mod timed;

pub use basic::BasicLock;
pub use record::LockRecord;
pub use timed::TimedLock;


/// Smallest permitted timeout and retry interval for timed acquisition.
///
/// Matches the typical minimum OS timer resolution on commodity platforms;
/// shorter intervals would degenerate into busy-waiting and are rejected.
pub const MIN_GRANULARITY: Duration = Duration::from_millis(15);

/// Fraction of the lease duration used as the refresh cadence. The slack
/// lets one missed refresh cycle pass without the lock lapsing.
pub(crate) const REFRESH_FACTOR: f64 = 0.9;

/// Derive the lock-file path for a target resource.
///
/// The lock file lives in the same directory as the target, with the
/// extension replaced by `lock`: `/tmp/data.txt` locks through
/// `/tmp/data.lock`.
pub fn lock_path_for(target: &Path) -> PathBuf {
    target.with_extension("lock")
}
