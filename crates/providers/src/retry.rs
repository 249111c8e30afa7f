use chatdesk_core::{RemoteError, RemoteErrorKind, RetrySettings};
use std::time::Duration;

/// Bounded exponential backoff for [`crate::ModelClient`]
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, initial_delay_ms: 1000, max_delay_ms: 30000, backoff_multiplier: 2.0 }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay_ms: settings.initial_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            backoff_multiplier: settings.backoff_multiplier,
        }
    }
}

impl RetryConfig {
    /// One attempt, no waiting
    pub fn single_attempt() -> Self {
        Self { max_attempts: 1, ..Default::default() }
    }

    /// Wait before attempt `attempt` (0-based); the first attempt never waits.
    ///
    /// `initial_delay_ms * backoff_multiplier^(attempt - 1)`, capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(exponent) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };
        let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
        let scaled = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Whether `attempts_made` attempts leave room for another one
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// Check if an error is worth another attempt
pub fn is_retryable(error: &RemoteError) -> bool {
    matches!(
        error.kind,
        RemoteErrorKind::Transport | RemoteErrorKind::Timeout | RemoteErrorKind::RateLimit | RemoteErrorKind::EmptyResponse
    )
}
