//! Retry logic with exponential backoff and additive jitter.

use std::time::Duration;

use crate::http_client::{HttpError, HttpErrorKind};

/// Backoff strategy for retrying failed upstream requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Doubles the base delay per attempt, caps it, and adds bounded
    /// uniform jitter so synchronized callers do not retry in lockstep.
    ///
    /// The delay for attempt `n` (0-indexed) is
    /// `min(max, base * 2^n) + uniform(0, jitter_window)`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The maximum pre-jitter duration to wait between retries.
        max: Duration,
        /// Upper bound of the random additive jitter.
        jitter_window: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(1_000),
            max: Duration::from_secs(30),
            jitter_window: Duration::from_millis(1_000),
        }
    }
}

impl Backoff {
    /// Calculate the delay for a given retry attempt (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                max,
                jitter_window,
            } => {
                let scale = 2_f64.powi(attempt.min(31) as i32);
                let seconds = base.as_secs_f64() * scale;
                let capped = Duration::from_secs_f64(seconds.min(max.as_secs_f64()));

                let jitter_ms = jitter_window.as_millis() as u64;
                if jitter_ms == 0 {
                    return capped;
                }
                capped + Duration::from_millis(fastrand::u64(0..=jitter_ms))
            }
        }
    }

    /// The largest delay this strategy can produce for any attempt.
    pub fn max_delay(self) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                max, jitter_window, ..
            } => max + jitter_window,
        }
    }
}

/// Configuration for the automatic retry mechanism around upstream calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Enables or disables the retry mechanism.
    pub enabled: bool,
    /// The maximum number of retries to attempt.
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// The backoff strategy to use between retries.
    pub backoff: Backoff,
    /// Hard per-attempt deadline; an attempt exceeding it is cancelled and
    /// counts as a retryable failure.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff: Backoff::default(),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryConfig {
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether an HTTP status code should trigger a retry.
    ///
    /// 429 and every 5xx are retryable; all other 4xx surface immediately.
    pub fn should_retry_status(&self, status: u16) -> bool {
        status == 429 || status >= 500
    }

    /// Whether a transport error should trigger a retry.
    pub fn should_retry_transport(&self, error: &HttpError) -> bool {
        matches!(
            error.kind(),
            HttpErrorKind::Timeout | HttpErrorKind::Connect | HttpErrorKind::Transport
        )
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}
