//! Test utilities shared across the leaselock workspace.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Get the path to a compiled example binary.
///
/// Cross-process tests drive small helper binaries built from
/// `examples/`; cargo places those next to the test binary, under
/// `target/debug/examples/`.
///
/// # Panics
///
/// Panics if the current executable path cannot be determined.
pub fn example_bin(name: &str) -> PathBuf {
    let mut path = std::env::current_exe().expect("Failed to get current executable path");

    // Navigate from target/debug/deps/<test_binary> to target/debug/examples/
    path.pop(); // Remove test binary name
    path.pop(); // Remove "deps"
    path.push("examples");
    path.push(name);

    if cfg!(target_os = "windows") {
        path.set_extension("exe");
    }

    path
}

/// Parse the release instant stored in a lock file, if the file exists and
/// holds a well-formed tick count.
pub fn lock_file_release(path: &Path) -> Option<DateTime<Utc>> {
    let content = std::fs::read_to_string(path).ok()?;
    let ticks: i64 = content.trim().parse().ok()?;
    Some(leaselock::ticks::to_datetime(ticks))
}

/// Block until `path` exists, polling briefly, up to `timeout`. Returns
/// whether the path appeared in time.
pub fn wait_for_path(path: &Path, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    path.exists()
}
