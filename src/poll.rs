//! # Bounded Polling
//!
//! Repeatedly evaluates a condition at a fixed interval until it reports
//! success, an unrecoverable error, or the timeout elapses.
//!
//! Time is measured with `tokio::time`, so callers running on a paused test
//! clock see deterministic attempt counts.

use crate::constants::{
    DEFAULT_NAMESPACE_CREATE_TIMEOUT_SECS, DEFAULT_NAMESPACE_DELETE_TIMEOUT_SECS,
    DEFAULT_POLL_INTERVAL_SECS,
};
use crate::error::PollError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Timing used by the test scope for its bounded polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two attempts of the same poll
    pub interval: Duration,
    /// Upper bound for namespace creation retries
    pub create_timeout: Duration,
    /// Upper bound for waiting on namespace deletion
    pub delete_timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            create_timeout: Duration::from_secs(DEFAULT_NAMESPACE_CREATE_TIMEOUT_SECS),
            delete_timeout: Duration::from_secs(DEFAULT_NAMESPACE_DELETE_TIMEOUT_SECS),
        }
    }
}

/// Poll `condition` immediately and then every `interval` until it finishes.
///
/// The condition returns:
/// - `Ok(Some(value))` when done
/// - `Ok(None)` to try again after `interval` (retryable failures are logged by
///   the caller and mapped to this)
/// - `Err(e)` to stop polling with an unrecoverable error
///
/// No attempt is started once `timeout` has elapsed.
pub async fn poll_immediate<T, E, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut condition: F,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match condition().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => return Err(PollError::Aborted(e)),
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(PollError::Timeout { elapsed, attempts });
        }

        debug!(attempt = attempts, elapsed_ms = elapsed.as_millis(), "condition not met, polling again");
        tokio::time::sleep(interval.min(timeout - elapsed)).await;

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(PollError::Timeout { elapsed, attempts });
        }
    }
}
