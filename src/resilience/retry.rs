// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Exponential backoff for store and source calls.
//!
//! Two presets cover every caller:
//!
//! ```
//! use feed_cache::RetryConfig;
//!
//! // Connecting: a wrong URL should surface within a few seconds
//! assert_eq!(RetryConfig::startup().attempts, 5);
//!
//! // Per query: give up early, the read path has a fallback
//! assert_eq!(RetryConfig::query().attempts, 3);
//! ```
//!
//! Only errors the caller classifies as transient are retried. A syntax
//! error or constraint violation comes straight back.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub attempts: usize,
    pub first_delay: Duration,
    pub delay_cap: Duration,
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::query()
    }
}

impl RetryConfig {
    /// 5 attempts, roughly 3 seconds end to end.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            attempts: 5,
            first_delay: Duration::from_millis(200),
            delay_cap: Duration::from_secs(2),
            multiplier: 2,
        }
    }

    /// 3 attempts, 100ms then 200ms between them.
    #[must_use]
    pub fn query() -> Self {
        Self {
            attempts: 3,
            first_delay: Duration::from_millis(100),
            delay_cap: Duration::from_secs(2),
            multiplier: 2,
        }
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            attempts: 3,
            first_delay: Duration::from_millis(1),
            delay_cap: Duration::from_millis(10),
            multiplier: 2,
        }
    }

    /// Pause before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_before(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_sub(1).min(31) as u32;
        self.first_delay
            .saturating_mul(self.multiplier.saturating_pow(exponent))
            .min(self.delay_cap)
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
pub async fn retry_when<F, Fut, T, E, P>(
    operation_name: &str,
    config: &RetryConfig,
    is_transient: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Recovered after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt < config.attempts && is_transient(&err) => {
                let delay = config.delay_before(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = config.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
