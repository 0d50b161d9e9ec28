//! Opt-in retry of optimistic concurrency conflicts.
//!
//! The service itself never retries: a conflict is returned to the caller, who
//! decides whether to run the whole load-decide-append cycle again.

use std::time::Duration;

use tracing::warn;

use crate::config::ReservationConfig;

/// How often and how patiently a conflicting operation is re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Pause before the second attempt; doubled for each further attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ReservationConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before the given attempt (1-indexed; the first attempt never waits).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor)
    }
}

/// Errors that can tell whether running the operation again may help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for crate::command_dispatcher::DispatchError {
    fn is_retryable(&self) -> bool {
        crate::command_dispatcher::DispatchError::is_retryable(self)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the policy
/// runs out of attempts. `op` receives the 1-indexed attempt number and must
/// reload whatever state it decides on.
pub fn retry_on_conflict<T, E, F>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Retryable + core::fmt::Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %err, "retrying after concurrency conflict");
                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
            Err(err) => return Err(err),
        }
    }
}
