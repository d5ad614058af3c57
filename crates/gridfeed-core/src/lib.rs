//! # Gridfeed Core
//!
//! Core contracts and resilience layer for the gridfeed NFL data toolkit.
//!
//! ## Overview
//!
//! This crate provides the foundational components for gridfeed:
//!
//! - **Canonical domain models** for league state, players, stats, and
//!   projections
//! - **Provider identifiers** for multi-adapter support
//! - **Caching proxy pipeline** with per-endpoint TTLs and circuit breaking
//! - **Bounded jittered retry** around upstream calls
//! - **Provider manager** with health-aware failover
//! - **Response envelope** with provider tagging and structured errors
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`providers`] | Vendor adapters (Sleeper, SportsDataIO) |
//! | [`cache`] | Cache store contract, key derivation, in-memory store |
//! | [`circuit_breaker`] | Per-endpoint circuit breakers |
//! | [`domain`] | Domain models (NflState, NflPlayer, PlayerStats) |
//! | [`envelope`] | Response envelope with metadata |
//! | [`error`] | Core error types |
//! | [`feed`] | Adapter trait and structured feed errors |
//! | [`http_client`] | HTTP client abstraction |
//! | [`manager`] | Provider failover orchestration |
//! | [`metrics`] | Append-only request metrics |
//! | [`proxy`] | Caching proxy pipeline |
//! | [`retry`] | Retry policy with backoff |
//! | [`source`] | Provider identifiers |
//! | [`throttling`] | Health-probe rate budgets |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gridfeed_core::{
//!     FeedSource, ManagerConfig, ProviderId, ProviderManager, SleeperAdapter,
//!     SportsDataIoAdapter,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ProviderManager::new(
//!         vec![
//!             Arc::new(SleeperAdapter::default()) as Arc<dyn FeedSource>,
//!             Arc::new(SportsDataIoAdapter::default()) as Arc<dyn FeedSource>,
//!         ],
//!         ManagerConfig::new(ProviderId::Sleeper)
//!             .with_fallback(ProviderId::SportsDataIo),
//!     )?;
//!
//!     let served = manager.nfl_state().await?;
//!     println!("week {} served by {}", served.data.week, served.provider);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Caller         │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ ProviderManager │────▶│ Health Cache +   │
//! │ (failover)      │     │ Probe Budget     │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ FeedSource      │────▶│ UpstreamProxy    │
//! │ (Adapter Trait) │     │ cache ▸ breaker  │
//! └────────┬────────┘     │ ▸ retry ▸ metrics│
//!          │              └──────────────────┘
//!          ▼
//! ┌─────────────────┐
//! │ Domain Models   │
//! │ (NflState, ...) │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Expected failure modes travel as values, never as panics:
//!
//! ```rust
//! use gridfeed_core::{FeedError, FeedErrorKind};
//!
//! fn handle_error(error: FeedError) {
//!     match error.kind() {
//!         FeedErrorKind::RateLimited => {
//!             // Wait and retry
//!         }
//!         FeedErrorKind::CircuitOpen | FeedErrorKind::Unavailable => {
//!             // Try the fallback provider
//!         }
//!         FeedErrorKind::InvalidRequest => {
//!             // Report to the caller
//!         }
//!         _ => {}
//!     }
//! }
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod feed;
pub mod http_client;
pub mod manager;
pub mod metrics;
pub mod providers;
pub mod proxy;
pub mod retry;
pub mod source;
pub mod throttling;

// Re-export commonly used types at crate root for convenience

// Adapter implementations
pub use providers::{SleeperAdapter, SportsDataIoAdapter};

// Caching
pub use cache::{cache_key, CacheError, CacheStore, MemoryCacheStore};

// Circuit breaker
pub use circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
};

// Adapter contract and errors
pub use feed::{EndpointKind, FeedError, FeedErrorKind, FeedSource, StatsRequest};

// Domain models
pub use domain::{
    NflPlayer, NflState, PlayerCrossRefs, PlayerId, PlayerProjection, PlayerStats, ScoringPoints,
    Season, SeasonType, StatLine, UtcDateTime, Week,
};

// Envelope types
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta};

// Error types
pub use error::{ConfigError, CoreError, ValidationError};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    NoopHttpClient, ReqwestHttpClient,
};

// Failover orchestration
pub use manager::{
    ManagerConfig, ProviderHealthSnapshot, ProviderManager, Served,
};

// Metrics
pub use metrics::{ApiMetric, MemoryMetricsRecorder, MetricsRecorder, MetricsSummary};

// Proxy pipeline
pub use proxy::{ProxyResponse, TtlPolicy, UpstreamProxy};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Provider identifiers
pub use source::ProviderId;

// Throttling
pub use throttling::{ProbeBudget, ProviderPolicy};
