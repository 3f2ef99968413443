// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache-read circuit breaker on top of `recloser`.
//!
//! While the key-value store keeps failing, [`FeedService`] reads skip it and
//! go straight to the record source instead of paying the store client's
//! retry cycle on every request. The breaker trips when the failure rate over
//! the last `window` calls exceeds `error_rate`, stays open for `open_for`,
//! then lets `trial_calls` trial calls through to decide whether to close.
//!
//! [`FeedService`]: crate::service::FeedService

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use recloser::{AsyncRecloser, Error as RecloserError, Recloser};
use tracing::{debug, warn};

use crate::config::FeedCacheConfig;
use crate::metrics;

#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// Open circuit; the guarded call never ran.
    #[error("circuit open, call skipped")]
    Rejected,
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitConfig {
    /// Failure rate (0.0 - 1.0) that trips the circuit
    pub error_rate: f32,
    /// Calls the failure rate is measured over while closed
    pub window: usize,
    /// Trial calls let through once the open period ends
    pub trial_calls: usize,
    pub open_for: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self::from_config(&FeedCacheConfig::default())
    }
}

impl CircuitConfig {
    #[must_use]
    pub fn from_config(config: &FeedCacheConfig) -> Self {
        Self {
            error_rate: config.store_failure_rate.clamp(0.0, 1.0),
            window: config.store_failure_window.max(1),
            trial_calls: 2,
            open_for: Duration::from_secs(config.store_recovery_secs),
        }
    }
}

/// Outcome counts since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitCounts {
    pub passed: u64,
    pub failed: u64,
    pub rejected: u64,
}

pub struct CircuitBreaker {
    name: String,
    inner: AsyncRecloser,
    passed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        let recloser = Recloser::custom()
            .error_rate(config.error_rate)
            .closed_len(config.window)
            .half_open_len(config.trial_calls)
            .open_wait(config.open_for)
            .build();

        Self {
            name: name.into(),
            inner: recloser.into(),
            passed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the future built by `f` unless the circuit is open.
    ///
    /// When rejected the future is dropped without being polled.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let (outcome, result) = match self.inner.call(f()).await {
            Ok(value) => {
                self.passed.fetch_add(1, Ordering::Relaxed);
                ("success", Ok(value))
            }
            Err(RecloserError::Inner(e)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                debug!(circuit = %self.name, "Guarded call failed");
                ("failure", Err(CircuitError::Inner(e)))
            }
            Err(RecloserError::Rejected) => {
                let rejected = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
                // First rejection, then every 100th
                if rejected % 100 == 1 {
                    warn!(circuit = %self.name, rejected, "Circuit open, skipping guarded calls");
                }
                ("rejected", Err(CircuitError::Rejected))
            }
        };

        metrics::record_circuit_call(&self.name, outcome);
        result
    }

    #[must_use]
    pub fn counts(&self) -> CircuitCounts {
        CircuitCounts {
            passed: self.passed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
