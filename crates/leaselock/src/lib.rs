//! Advisory file locks with an explicit expiry date.
//!
//! A lock is a sidecar file next to the guarded resource, holding the
//! instant at which the lock stops being held. Handles acquire immediately
//! ([`BasicLock`]) or wait for a competing holder up to a deadline
//! ([`TimedLock`]); both release their lock file on disposal.

// Core modules
pub mod error;
pub mod lock;
pub mod ticks;

// Re-export commonly used types
pub use error::{LockError, Result};
pub use lock::{lock_path_for, BasicLock, LockRecord, TimedLock, MIN_GRANULARITY};
