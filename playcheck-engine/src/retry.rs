//! Bounded exponential backoff around fallible async operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::constants::{RETRY_BASE_DELAY, RETRY_MAX_DELAY};

const RETRYABLE_PHRASES: &[&str] = &[
    "timeout",
    "network",
    "connection",
    "econnrefused",
    "cdp",
    "transport closed",
    "socket",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy for one step: the configured retry budget plus the first attempt.
    #[must_use]
    pub const fn for_action(action_retries: u32) -> Self {
        Self {
            max_attempts: action_retries.saturating_add(1),
            base_delay: RETRY_BASE_DELAY,
            max_delay: RETRY_MAX_DELAY,
        }
    }

    /// Sleep before the attempt following `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_action(crate::constants::DEFAULT_ACTION_RETRIES)
    }
}

/// Default retry classifier: transient transport and timing failures only.
#[must_use]
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Run `operation` until it succeeds, `should_retry` rejects an error, or
/// `policy.max_attempts` attempts have been made. The last error is returned
/// unchanged.
pub async fn retry<T, E, F, Fut, P>(
    policy: RetryPolicy,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts || !should_retry(&err) {
                    return Err(err);
                }
                let delay = policy.delay_after(attempt);
                log::debug!(
                    "attempt {attempt}/{max_attempts} failed ({err}); retrying in {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
