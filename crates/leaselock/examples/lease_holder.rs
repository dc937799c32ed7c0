//! Helper binary that takes a lease, holds it, then releases it.
//!
//! Usage: lease_holder <target_path> <lease_ms> <hold_ms>
//!
//! Acquires the lock on `target_path` for `lease_ms`, sleeps `hold_ms`,
//! then disposes the handle. Cross-process tests use it as the competing
//! holder. Exits non-zero when the acquisition fails.

use leaselock::TimedLock;
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        eprintln!("Usage: lease_holder <target_path> <lease_ms> <hold_ms>");
        std::process::exit(2);
    }

    let target = PathBuf::from(&args[1]);
    let lease = Duration::from_millis(args[2].parse().expect("lease_ms must be an integer"));
    let hold = Duration::from_millis(args[3].parse().expect("hold_ms must be an integer"));

    let lock = TimedLock::new(&target);
    if !lock.try_acquire_for(lease, false).await {
        eprintln!(
            "lease_holder: failed to acquire {}",
            lock.lock_path().display()
        );
        std::process::exit(1);
    }

    tokio::time::sleep(hold).await;
    lock.dispose().await;

    println!("lease_holder: released {}", lock.lock_path().display());
}
