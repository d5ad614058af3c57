use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::feed::EndpointKind;

/// Runtime circuit state for upstream endpoint calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip a closed breaker.
    pub failure_threshold: u32,
    /// Consecutive half-open successes required to close again.
    pub success_threshold: u32,
    /// How long an open breaker rejects traffic before probing.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            opened_at: None,
        }
    }
}

/// Thread-safe circuit breaker guarding one upstream endpoint category.
///
/// The open->half-open transition is evaluated lazily inside
/// [`allow_request`](CircuitBreaker::allow_request) on the next call after
/// the cooldown elapses; no background timer is involved.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    /// Gate check preceding every upstream attempt.
    pub fn allow_request(&self) -> bool {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let can_probe = inner
                    .opened_at
                    .map(|opened_at| opened_at.elapsed() >= self.config.cooldown)
                    .unwrap_or(false);

                if can_probe {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.opened_at = None;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes = inner.half_open_successes.saturating_add(1);
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        if inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold
        {
            inner.state = CircuitState::Open;
            inner.half_open_successes = 0;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        let inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        inner.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        let inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        inner.consecutive_failures
    }
}

/// Point-in-time view of one breaker, surfaced by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub endpoint: EndpointKind,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Lazily populated map of one breaker per upstream endpoint category.
///
/// Breaker state is process-local by design; multiple proxy instances do
/// not coordinate (accepted approximation, see DESIGN.md).
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<EndpointKind, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the breaker for an endpoint, creating it on first use.
    pub fn breaker(&self, endpoint: EndpointKind) -> Arc<CircuitBreaker> {
        let mut breakers = self
            .breakers
            .lock()
            .expect("breaker registry lock is not poisoned");
        Arc::clone(
            breakers
                .entry(endpoint)
                .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config))),
        )
    }

    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let breakers = self
            .breakers
            .lock()
            .expect("breaker registry lock is not poisoned");
        let mut entries = breakers
            .iter()
            .map(|(endpoint, breaker)| BreakerSnapshot {
                endpoint: *endpoint,
                state: breaker.state(),
                consecutive_failures: breaker.consecutive_failures(),
            })
            .collect::<Vec<_>>();
        entries.sort_by_key(|entry| entry.endpoint);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 3,
            cooldown: Duration::from_millis(10),
        }
    }

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(fast_config());

        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn closed_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(fast_config());

        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 1);
    }

    #[test]
    fn half_open_requires_success_streak_to_close() {
        let breaker = CircuitBreaker::new(fast_config());

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new(fast_config());

        breaker.record_failure();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.allow_request());

        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn registry_creates_breakers_lazily_and_snapshots() {
        let registry = CircuitBreakerRegistry::new(fast_config());
        assert!(registry.snapshot().is_empty());

        let players = registry.breaker(EndpointKind::Players);
        players.record_failure();
        let again = registry.breaker(EndpointKind::Players);
        assert_eq!(again.consecutive_failures(), 1);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].endpoint, EndpointKind::Players);
        assert_eq!(snapshot[0].consecutive_failures, 1);
    }
}
