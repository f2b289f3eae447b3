// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Retry and rate limiting primitives.
//!
//! - [`ExponentialBackoff`] drives in-place retries of transient documentation backend errors.
//! - [`RateLimiter`] computes controller requeue delays: a per-item exponential
//!   delay (100ms doubling up to 3s) combined with a global token bucket
//!   (1 request/s, burst 1). The larger of the two wins.
//! - [`retry_on_conflict`] refetch-and-retry loop for optimistic concurrency conflicts.

use crate::constants::{
    CONFLICT_RETRY_ATTEMPTS, RATE_LIMIT_BASE_DELAY_MILLIS, RATE_LIMIT_BUCKET_BURST,
    RATE_LIMIT_BUCKET_QPS, RATE_LIMIT_MAX_DELAY_SECS,
};
use crate::errors::is_conflict;
use rand::RngExt;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// HTTP retry initial interval (500ms)
const HTTP_INITIAL_INTERVAL_MILLIS: u64 = 500;

/// HTTP retry maximum interval (30 seconds)
const HTTP_MAX_INTERVAL_SECS: u64 = 30;

/// HTTP retry maximum elapsed time (5 minutes)
const HTTP_MAX_ELAPSED_TIME_SECS: u64 = 300;

/// Simple exponential backoff implementation.
///
/// Provides exponential backoff with randomization (jitter) to prevent thundering herd.
pub struct ExponentialBackoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Initial interval duration
    pub initial_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Maximum total elapsed time
    pub max_elapsed_time: Option<Duration>,
    /// Backoff multiplier (typically 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
    start_time: Instant,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with specified parameters.
    #[must_use]
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            max_elapsed_time,
            multiplier,
            randomization_factor,
            start_time: Instant::now(),
        }
    }

    /// Get the next backoff interval, or None if max elapsed time exceeded.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed_time {
            if self.start_time.elapsed() >= max_elapsed {
                return None;
            }
        }

        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        Some(jittered)
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let jittered = rand::rng().random_range((secs - delta)..=(secs + delta));

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Backoff for documentation backend retries: 500ms doubling to 30s, 5 minutes total, ±10%.
#[must_use]
pub fn http_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(HTTP_INITIAL_INTERVAL_MILLIS),
        Duration::from_secs(HTTP_MAX_INTERVAL_SECS),
        Some(Duration::from_secs(HTTP_MAX_ELAPSED_TIME_SECS)),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Whether an HTTP status is worth retrying (429 and 5xx).
#[must_use]
pub fn is_retryable_http_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Run a read-modify-write operation, re-running it on HTTP 409.
///
/// The operation must refetch the object itself so each attempt sees the latest
/// resource version. Gives up after [`CONFLICT_RETRY_ATTEMPTS`] attempts.
///
/// # Errors
///
/// Returns the first non-conflict error, or the last conflict once attempts run out.
pub async fn retry_on_conflict<T, F, Fut>(
    mut operation: F,
    operation_name: &str,
) -> Result<T, kube::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, kube::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(e) if is_conflict(&e) && attempt < CONFLICT_RETRY_ATTEMPTS => {
                debug!(
                    operation = operation_name,
                    attempt = attempt,
                    "Conflict, refetching and retrying"
                );
                attempt += 1;
            }
            result => return result,
        }
    }
}

struct RateLimiterState {
    failures: HashMap<String, u32>,
    tokens: f64,
    last_refill: Instant,
}

/// Controller requeue rate limiter.
///
/// Per-item delay is `base * 2^(failures - 1)` capped at `max`. The global bucket
/// holds at most `burst` tokens refilled at `qps`; every call takes a token, and a
/// negative balance turns into a wait of `-tokens / qps`.
pub struct RateLimiter {
    base_delay: Duration,
    max_delay: Duration,
    qps: f64,
    burst: f64,
    state: Mutex<RateLimiterState>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(RATE_LIMIT_BASE_DELAY_MILLIS),
            Duration::from_secs(RATE_LIMIT_MAX_DELAY_SECS),
            RATE_LIMIT_BUCKET_QPS,
            RATE_LIMIT_BUCKET_BURST,
        )
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration, qps: f64, burst: f64) -> Self {
        Self {
            base_delay,
            max_delay,
            qps,
            burst,
            state: Mutex::new(RateLimiterState {
                failures: HashMap::new(),
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Requeue delay for `key`, recording one more failure.
    pub fn when(&self, key: &str) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let failures = state.failures.entry(key.to_string()).or_insert(0);
        *failures = failures.saturating_add(1);
        let exponent = (*failures - 1).min(31);
        let per_item = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.qps).min(self.burst) - 1.0;
        state.last_refill = now;
        let bucket = if state.tokens >= 0.0 || self.qps <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-state.tokens / self.qps)
        };

        per_item.max(bucket)
    }

    /// Reset the failure count of `key` after a successful reconcile.
    pub fn forget(&self, key: &str) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failures
            .remove(key);
    }

    /// Number of failures recorded for `key`.
    #[must_use]
    pub fn failures(&self, key: &str) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
