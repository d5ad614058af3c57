//! Per-provider upstream probe budgets.
//!
//! Health probes are cheap but not free; the manager already debounces
//! them with a freshness interval, and this quota is the second bound so
//! admin bursts ("test all providers" in a loop) cannot stampede a vendor.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::ProviderId;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Upstream quota configuration for one vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    pub quota_window: Duration,
    pub quota_limit: u32,
}

impl ProviderPolicy {
    pub fn sleeper_default() -> Self {
        Self {
            provider_id: ProviderId::Sleeper,
            quota_window: Duration::from_secs(60),
            quota_limit: 30,
        }
    }

    pub fn sportsdataio_default() -> Self {
        Self {
            provider_id: ProviderId::SportsDataIo,
            quota_window: Duration::from_secs(60),
            quota_limit: 10,
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::Sleeper => Self::sleeper_default(),
            ProviderId::SportsDataIo => Self::sportsdataio_default(),
        }
    }
}

/// Rate budget for health probes against one provider.
#[derive(Clone)]
pub struct ProbeBudget {
    limiter: Arc<DirectRateLimiter>,
}

impl ProbeBudget {
    pub fn new(quota_window: Duration, quota_limit: u32) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                quota_window,
                quota_limit,
            ))),
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self::new(policy.quota_window, policy.quota_limit)
    }

    /// Whether a probe may be issued right now. Denied probes are not
    /// queued; the caller falls back to its cached health value.
    pub fn try_probe(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = quota_limit.max(1);
    let burst = NonZeroU32::new(safe_limit).expect("safe limit must be non-zero");

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .expect("period is always greater than zero")
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_denies_once_quota_is_spent() {
        let budget = ProbeBudget::new(Duration::from_secs(60), 2);

        assert!(budget.try_probe());
        assert!(budget.try_probe());
        assert!(!budget.try_probe());
    }

    #[test]
    fn default_policies_cover_all_providers() {
        for provider in ProviderId::ALL {
            let policy = ProviderPolicy::default_for(provider);
            assert_eq!(policy.provider_id, provider);
            assert!(policy.quota_limit > 0);
        }
    }
}
