//! Bounded retry with exponential backoff for adapter calls
//!
//! Retry state is explicit (attempt count and next deadline) and uses
//! `tokio::time`, so tests can drive it with a paused clock.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::AdapterError;

/// Adapter retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Classifies adapter errors for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Node hiccup; retry with backoff
    Transient,
    /// Someone else already did it (late vote, batch already executed)
    AlreadyDone,
    /// Retrying cannot help
    Permanent,
}

/// Classify an adapter error for retry decisions
pub fn classify_error(error: &AdapterError) -> ErrorClass {
    match error {
        AdapterError::Unavailable(_) => ErrorClass::Transient,
        AdapterError::Rejected(e) if e.is_benign() => ErrorClass::AlreadyDone,
        AdapterError::Rejected(_) => ErrorClass::Permanent,
        AdapterError::Reverted(reason) => {
            let reason = reason.to_lowercase();
            if reason.contains("already") || reason.contains("nonce not greater") {
                ErrorClass::AlreadyDone
            } else {
                ErrorClass::Permanent
            }
        }
        AdapterError::Malformed(_) => ErrorClass::Permanent,
    }
}

/// Action to take after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    /// Retry after a backoff period
    RetryAfter(Duration),
    /// Nothing left to do
    Skip,
    /// Stop and surface the error
    GiveUp,
}

/// Retry state for one operation
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub config: RetryConfig,
    pub attempt: u32,
    pub last_error: Option<AdapterError>,
    /// Earliest instant the next attempt may run
    pub next_attempt_at: Option<Instant>,
}

impl RetryContext {
    pub fn with_config(config: RetryConfig) -> Self {
        Self {
            config,
            attempt: 0,
            last_error: None,
            next_attempt_at: None,
        }
    }

    /// Record a failed attempt and schedule the next one
    pub fn record_failure(&mut self, error: AdapterError) -> RetryAction {
        let action = match classify_error(&error) {
            ErrorClass::AlreadyDone => RetryAction::Skip,
            ErrorClass::Permanent => RetryAction::GiveUp,
            ErrorClass::Transient if !self.config.should_retry(self.attempt) => RetryAction::GiveUp,
            ErrorClass::Transient => {
                RetryAction::RetryAfter(self.config.backoff_for_attempt(self.attempt))
            }
        };

        self.attempt += 1;
        self.last_error = Some(error);
        self.next_attempt_at = match action {
            RetryAction::RetryAfter(backoff) => Some(Instant::now() + backoff),
            _ => None,
        };
        action
    }
}

/// Run `operation` until it succeeds, retrying transient failures.
///
/// Benign rejections are returned as errors without retrying; callers
/// decide whether to treat them as success.
pub async fn with_retry<F, T, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let mut ctx = RetryContext::with_config(config.clone());

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => match ctx.record_failure(e.clone()) {
                RetryAction::RetryAfter(backoff) => {
                    warn!(
                        operation = operation_name,
                        attempt = ctx.attempt,
                        max = config.max_retries,
                        ?backoff,
                        error = %e,
                        "Retrying after backoff"
                    );
                    crate::metrics::record_adapter_error(operation_name, e.kind());
                    if let Some(deadline) = ctx.next_attempt_at {
                        tokio::time::sleep_until(deadline).await;
                    }
                }
                RetryAction::Skip => {
                    debug!(operation = operation_name, error = %e, "Already done, skipping");
                    return Err(e);
                }
                RetryAction::GiveUp => {
                    warn!(operation = operation_name, error = %e, "Giving up");
                    crate::metrics::record_adapter_error(operation_name, e.kind());
                    return Err(e);
                }
            },
        }
    }
}
