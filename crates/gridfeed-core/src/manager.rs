//! Provider failover orchestration.
//!
//! The manager sits above the vendor adapters: it selects an active
//! provider from cached health data, retries failed operations against a
//! configured fallback, and tags every result with the vendor that
//! actually served it. Health is advisory for individual calls; dispatch
//! always tries the primary first and never refuses to attempt a call.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;

use crate::feed::{FeedError, FeedSource, StatsRequest};
use crate::throttling::{ProbeBudget, ProviderPolicy};
use crate::{
    ConfigError, NflPlayer, NflState, PlayerId, PlayerProjection, PlayerStats, ProviderId,
};

/// Runtime configuration read by every operation dispatch.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub primary: ProviderId,
    pub fallback: Option<ProviderId>,
    pub enable_fallback: bool,
    pub log_errors: bool,
    /// Cached health older than this must be re-checked before it is
    /// trusted again.
    pub health_check_interval: Duration,
}

impl ManagerConfig {
    pub fn new(primary: ProviderId) -> Self {
        Self {
            primary,
            fallback: None,
            enable_fallback: false,
            log_errors: true,
            health_check_interval: Duration::from_secs(60),
        }
    }

    pub fn with_fallback(mut self, fallback: ProviderId) -> Self {
        self.fallback = Some(fallback);
        self.enable_fallback = true;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }
}

/// A result tagged with the vendor that actually served it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Served<T> {
    pub data: T,
    pub provider: ProviderId,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Copy)]
struct CachedHealth {
    healthy: bool,
    checked_at: Instant,
}

/// Admin-facing view of one provider's cached health.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthSnapshot {
    pub provider: ProviderId,
    pub healthy: Option<bool>,
    pub checked_secs_ago: Option<u64>,
}

type OpFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FeedError>> + Send + 'a>>;

/// Registry of vendor adapters with health-aware failover.
pub struct ProviderManager {
    adapters: HashMap<ProviderId, Arc<dyn FeedSource>>,
    config: RwLock<ManagerConfig>,
    health: Mutex<HashMap<ProviderId, CachedHealth>>,
    budgets: HashMap<ProviderId, ProbeBudget>,
}

impl std::fmt::Debug for ProviderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderManager")
            .field("providers", &self.adapters.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProviderManager {
    /// Wire the manager. Misnamed providers are fatal here, not at
    /// request time.
    pub fn new(
        adapters: Vec<Arc<dyn FeedSource>>,
        config: ManagerConfig,
    ) -> Result<Self, ConfigError> {
        let adapters: HashMap<ProviderId, Arc<dyn FeedSource>> = adapters
            .into_iter()
            .map(|adapter| (adapter.id(), adapter))
            .collect();

        if !adapters.contains_key(&config.primary) {
            return Err(ConfigError::PrimaryNotRegistered(config.primary));
        }
        if let Some(fallback) = config.fallback {
            if fallback == config.primary {
                return Err(ConfigError::FallbackEqualsPrimary(fallback));
            }
            if !adapters.contains_key(&fallback) {
                return Err(ConfigError::FallbackNotRegistered(fallback));
            }
        }

        let budgets = adapters
            .keys()
            .map(|provider| {
                (
                    *provider,
                    ProbeBudget::from_policy(&ProviderPolicy::default_for(*provider)),
                )
            })
            .collect();

        Ok(Self {
            adapters,
            config: RwLock::new(config),
            health: Mutex::new(HashMap::new()),
            budgets,
        })
    }

    pub fn config(&self) -> ManagerConfig {
        self.config
            .read()
            .expect("manager config lock is not poisoned")
            .clone()
    }

    /// Switch the primary provider at runtime.
    pub fn set_primary(&self, primary: ProviderId) -> Result<(), ConfigError> {
        if !self.adapters.contains_key(&primary) {
            return Err(ConfigError::PrimaryNotRegistered(primary));
        }
        let mut config = self
            .config
            .write()
            .expect("manager config lock is not poisoned");
        if config.fallback == Some(primary) {
            return Err(ConfigError::FallbackEqualsPrimary(primary));
        }
        config.primary = primary;
        Ok(())
    }

    pub fn set_fallback_enabled(&self, enabled: bool) {
        self.config
            .write()
            .expect("manager config lock is not poisoned")
            .enable_fallback = enabled;
    }

    pub fn registered_providers(&self) -> Vec<ProviderId> {
        let mut providers = self.adapters.keys().copied().collect::<Vec<_>>();
        providers.sort_by_key(|provider| provider.as_str());
        providers
    }

    /// Debounced health check: a cached value fresher than the configured
    /// interval is reused without touching the upstream.
    pub async fn check_health(&self, provider: ProviderId) -> bool {
        let interval = self.config().health_check_interval;

        let cached = {
            let health = self.health.lock().expect("health cache lock");
            health.get(&provider).copied()
        };
        if let Some(entry) = cached {
            if entry.checked_at.elapsed() < interval {
                return entry.healthy;
            }
        }

        let Some(budget) = self.budgets.get(&provider) else {
            return false;
        };
        if !budget.try_probe() {
            // Out of probe budget: trust the last observation, or assume
            // reachable (dispatch tries the primary regardless).
            return cached.map(|entry| entry.healthy).unwrap_or(true);
        }

        self.probe(provider).await
    }

    /// Unconditional probe that refreshes the health cache.
    async fn probe(&self, provider: ProviderId) -> bool {
        let Some(adapter) = self.adapters.get(&provider) else {
            return false;
        };
        let healthy = adapter.health_check().await;
        let mut health = self.health.lock().expect("health cache lock");
        health.insert(
            provider,
            CachedHealth {
                healthy,
                checked_at: Instant::now(),
            },
        );
        healthy
    }

    /// Pick the provider a caller should be routed to right now.
    ///
    /// Fresh healthy primary wins; a stale primary is re-checked; an
    /// unhealthy primary defers to a healthy fallback; with neither
    /// healthy the primary is returned anyway as a last resort.
    pub async fn active_provider(&self) -> ProviderId {
        let config = self.config();

        if self.check_health(config.primary).await {
            return config.primary;
        }

        if let Some(fallback) = config.fallback {
            if config.enable_fallback && self.check_health(fallback).await {
                return fallback;
            }
        }

        config.primary
    }

    /// Attempt an operation on the primary, then once on the fallback.
    ///
    /// Cached health never gates individual calls. When both vendors
    /// fail, the primary's error is returned verbatim.
    pub async fn execute_with_fallback<'m, T, F>(&'m self, invoke: F) -> Result<Served<T>, FeedError>
    where
        F: Fn(&'m dyn FeedSource) -> OpFuture<'m, T>,
    {
        let config = self.config();

        let primary = self
            .adapters
            .get(&config.primary)
            .ok_or_else(|| FeedError::not_registered(config.primary))?;

        let primary_error = match invoke(primary.as_ref()).await {
            Ok(data) => {
                return Ok(Served {
                    data,
                    provider: config.primary,
                    used_fallback: false,
                })
            }
            Err(error) => error,
        };

        if config.log_errors {
            warn!(
                provider = config.primary.as_str(),
                error = %primary_error,
                "primary provider failed"
            );
        }

        if config.enable_fallback {
            if let Some(fallback_id) = config.fallback {
                if let Some(fallback) = self.adapters.get(&fallback_id) {
                    match invoke(fallback.as_ref()).await {
                        Ok(data) => {
                            return Ok(Served {
                                data,
                                provider: fallback_id,
                                used_fallback: true,
                            })
                        }
                        Err(fallback_error) => {
                            if config.log_errors {
                                warn!(
                                    provider = fallback_id.as_str(),
                                    error = %fallback_error,
                                    "fallback provider failed"
                                );
                            }
                        }
                    }
                }
            }
        }

        Err(primary_error)
    }

    // Canonical operations, each dispatched through the failover routine.

    pub async fn nfl_state(&self) -> Result<Served<NflState>, FeedError> {
        self.execute_with_fallback(|source| source.nfl_state()).await
    }

    pub async fn players(&self) -> Result<Served<Vec<NflPlayer>>, FeedError> {
        self.execute_with_fallback(|source| source.players()).await
    }

    pub async fn player_by_id<'m>(
        &'m self,
        player_id: &'m PlayerId,
    ) -> Result<Served<NflPlayer>, FeedError> {
        self.execute_with_fallback(move |source| source.player_by_id(player_id))
            .await
    }

    pub async fn stats(&self, req: StatsRequest) -> Result<Served<Vec<PlayerStats>>, FeedError> {
        self.execute_with_fallback(move |source| source.stats(req))
            .await
    }

    pub async fn projections(
        &self,
        req: StatsRequest,
    ) -> Result<Served<Vec<PlayerProjection>>, FeedError> {
        self.execute_with_fallback(move |source| source.projections(req))
            .await
    }

    pub async fn player_stats<'m>(
        &'m self,
        player_id: &'m PlayerId,
        req: StatsRequest,
    ) -> Result<Served<PlayerStats>, FeedError> {
        self.execute_with_fallback(move |source| source.player_stats(player_id, req))
            .await
    }

    // Administrative surface.

    /// Cached health per registered provider, without probing.
    pub fn provider_health(&self) -> Vec<ProviderHealthSnapshot> {
        let health = self.health.lock().expect("health cache lock");
        self.registered_providers()
            .into_iter()
            .map(|provider| {
                let entry = health.get(&provider);
                ProviderHealthSnapshot {
                    provider,
                    healthy: entry.map(|entry| entry.healthy),
                    checked_secs_ago: entry.map(|entry| entry.checked_at.elapsed().as_secs()),
                }
            })
            .collect()
    }

    /// Probe every registered adapter exactly once, refreshing the cache.
    pub async fn test_all_providers(&self) -> Vec<(ProviderId, bool)> {
        let mut results = Vec::with_capacity(self.adapters.len());
        for provider in self.registered_providers() {
            let healthy = self.probe(provider).await;
            results.push((provider, healthy));
        }
        results
    }
}
