//! Vendor adapter contract and request/response types.
//!
//! This module defines the adapter contract ([`FeedSource`]) that every
//! vendor implementation must follow, the endpoint taxonomy used by the
//! proxy pipeline and circuit-breaker registry, and the structured
//! [`FeedError`] used for value-or-error signaling. Adapters never panic or
//! throw past this boundary; the provider manager inspects errors to decide
//! on fallback.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{NflPlayer, NflState, PlayerId, PlayerProjection, PlayerStats, ProviderId, Season,
    SeasonType, Week};

/// Upstream endpoint category used for TTL policy, circuit breaking, and
/// metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    State,
    Players,
    Stats,
    Projections,
    Health,
}

impl EndpointKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Players => "players",
            Self::Stats => "stats",
            Self::Projections => "projections",
            Self::Health => "health",
        }
    }
}

impl Display for EndpointKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed request for weekly stats and projections endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRequest {
    pub season: Season,
    pub week: Week,
    pub season_type: SeasonType,
}

impl StatsRequest {
    pub fn new(season: Season, week: Week, season_type: SeasonType) -> Self {
        Self {
            season,
            week,
            season_type,
        }
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    /// Missing or invalid caller input; never retried, never counted
    /// against a breaker.
    InvalidRequest,
    /// The endpoint's circuit breaker rejected the call without touching
    /// the upstream.
    CircuitOpen,
    /// Terminal upstream failure after retries were exhausted.
    Unavailable,
    /// The upstream explicitly rate-limited the call.
    RateLimited,
    /// The named adapter is not registered with the manager.
    NotRegistered,
    /// Contract violations: unparseable payloads, invalid normalized data.
    Internal,
}

/// Structured adapter error used by failover decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedError {
    kind: FeedErrorKind,
    message: String,
    retryable: bool,
}

impl FeedError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: FeedErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn circuit_open(endpoint: EndpointKind) -> Self {
        Self {
            kind: FeedErrorKind::CircuitOpen,
            message: format!("circuit breaker for '{endpoint}' is open; skipping upstream call"),
            retryable: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: FeedErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: FeedErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn not_registered(provider: ProviderId) -> Self {
        Self {
            kind: FeedErrorKind::NotRegistered,
            message: format!("feed adapter '{provider}' is not registered"),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: FeedErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> FeedErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FeedErrorKind::InvalidRequest => "feed.invalid_request",
            FeedErrorKind::CircuitOpen => "feed.circuit_open",
            FeedErrorKind::Unavailable => "feed.unavailable",
            FeedErrorKind::RateLimited => "feed.rate_limited",
            FeedErrorKind::NotRegistered => "feed.not_registered",
            FeedErrorKind::Internal => "feed.internal",
        }
    }
}

impl Display for FeedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FeedError {}

type FeedFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FeedError>> + Send + 'a>>;

/// Vendor adapter contract.
///
/// Each adapter owns the mapping from its vendor's field names, units, and
/// identifiers to the canonical domain model, and routes every upstream
/// call through its caching proxy pipeline.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`id`](FeedSource::id) | Unique vendor identifier |
/// | [`nfl_state`](FeedSource::nfl_state) | Current league/schedule state |
/// | [`players`](FeedSource::players) | Full player directory |
/// | [`stats`](FeedSource::stats) | Weekly actual stats |
/// | [`projections`](FeedSource::projections) | Weekly projections |
/// | [`health_check`](FeedSource::health_check) | Cheapest upstream probe |
///
/// The single-entity lookups ([`player_by_id`](FeedSource::player_by_id),
/// [`player_stats`](FeedSource::player_stats)) have default implementations
/// that fetch the bulk collection and index into it, so vendors are never
/// required to expose per-entity endpoints.
///
/// Implementations must be `Send + Sync`; they are shared across request
/// tasks behind `Arc`.
pub trait FeedSource: Send + Sync {
    /// Returns the unique vendor identifier.
    fn id(&self) -> ProviderId;

    /// Fetches the current NFL league/schedule state.
    fn nfl_state<'a>(&'a self) -> FeedFuture<'a, NflState>;

    /// Fetches the full player directory.
    fn players<'a>(&'a self) -> FeedFuture<'a, Vec<NflPlayer>>;

    /// Fetches weekly actual stats for every player with activity.
    fn stats<'a>(&'a self, req: StatsRequest) -> FeedFuture<'a, Vec<PlayerStats>>;

    /// Fetches weekly projections.
    fn projections<'a>(&'a self, req: StatsRequest) -> FeedFuture<'a, Vec<PlayerProjection>>;

    /// Performs the cheapest possible upstream call and reports boolean
    /// health. The default probes the state endpoint.
    fn health_check<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move { self.nfl_state().await.is_ok() })
    }

    /// Looks up a single player by fetching the full directory and
    /// indexing into it.
    fn player_by_id<'a>(&'a self, player_id: &'a PlayerId) -> FeedFuture<'a, NflPlayer> {
        Box::pin(async move {
            let players = self.players().await?;
            players
                .into_iter()
                .find(|player| &player.player_id == player_id)
                .ok_or_else(|| {
                    FeedError::invalid_request(format!("unknown player id '{player_id}'"))
                })
        })
    }

    /// Looks up a single player's weekly stats from the bulk result.
    fn player_stats<'a>(
        &'a self,
        player_id: &'a PlayerId,
        req: StatsRequest,
    ) -> FeedFuture<'a, PlayerStats> {
        Box::pin(async move {
            let stats = self.stats(req).await?;
            stats
                .into_iter()
                .find(|entry| &entry.player_id == player_id)
                .ok_or_else(|| {
                    FeedError::invalid_request(format!(
                        "no stats recorded for player '{player_id}' in week {}",
                        req.week
                    ))
                })
        })
    }
}
