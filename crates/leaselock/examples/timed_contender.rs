//! Helper binary that races for a lease with a bounded wait.
//!
//! Usage: timed_contender <target_path> <lease_ms> <timeout_ms> [retry_ms]
//!
//! Runs a timed acquisition against `target_path` and exits 0 when the
//! lock was obtained within the timeout, 1 on timeout, 2 on misuse.

use leaselock::TimedLock;
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 && args.len() != 5 {
        eprintln!("Usage: timed_contender <target_path> <lease_ms> <timeout_ms> [retry_ms]");
        std::process::exit(2);
    }

    let target = PathBuf::from(&args[1]);
    let lease = Duration::from_millis(args[2].parse().expect("lease_ms must be an integer"));
    let timeout = Duration::from_millis(args[3].parse().expect("timeout_ms must be an integer"));
    let retry = args
        .get(4)
        .map(|raw| Duration::from_millis(raw.parse().expect("retry_ms must be an integer")));

    let lock = TimedLock::new(&target);
    let outcome = match retry {
        Some(retry) => {
            lock.try_acquire_or_timeout_with_retry(lease, timeout, retry)
                .await
        }
        None => lock.try_acquire_or_timeout(lease, timeout).await,
    };

    match outcome {
        Ok(true) => {
            println!("timed_contender: acquired {}", lock.lock_path().display());
            lock.dispose().await;
        }
        Ok(false) => {
            println!("timed_contender: timed out");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("timed_contender: {}", err);
            std::process::exit(2);
        }
    }
}
