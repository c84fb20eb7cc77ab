//! Fixed-delay retry for lock contention.
//!
//! Several stages hold connections to the same database at once. SQLite
//! serializes writers, so a statement can fail with `SQLITE_BUSY` or
//! `SQLITE_LOCKED` even after the busy timeout. Such failures are retried
//! here; any other error is returned immediately.

use std::thread;
use std::time::Duration;

use super::StorageResult;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least 1)
    pub attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Create a policy.
    #[must_use]
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Run `op`, retrying transient storage errors.
///
/// # Arguments
///
/// * `policy` - Attempt count and delay
/// * `what` - Short description used in log messages
/// * `op` - The operation; called once per attempt
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first
/// non-transient error.
pub fn with_retry<T>(
    policy: RetryPolicy,
    what: &str,
    mut op: impl FnMut() -> StorageResult<T>,
) -> StorageResult<T> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                log::debug!(
                    "{} failed (attempt {}/{}): {}; retrying",
                    what,
                    attempt,
                    attempts,
                    err
                );
                thread::sleep(policy.delay);
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    log::warn!("{} still failing after {} attempts", what, attempts);
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use rusqlite::ffi;

    fn busy() -> StorageError {
        StorageError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            None,
        ))
    }

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.delay, Duration::from_millis(100));
        assert_eq!(RetryPolicy::none().attempts, 1);
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let mut calls = 0;
        let result = with_retry(fast(5), "test", || {
            calls += 1;
            if calls < 3 {
                Err(busy())
            } else {
                Ok(calls)
            }
        });

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_gives_up_after_attempts() {
        let mut calls = 0;
        let result: StorageResult<()> = with_retry(fast(4), "test", || {
            calls += 1;
            Err(busy())
        });

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_permanent_error_not_retried() {
        let mut calls = 0;
        let result: StorageResult<()> = with_retry(fast(5), "test", || {
            calls += 1;
            Err(StorageError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        });

        assert!(!result.unwrap_err().is_transient());
        assert_eq!(calls, 1);
    }
}
