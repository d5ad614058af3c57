use thiserror::Error;

use crate::ProviderId;

/// Validation and contract errors exposed by `gridfeed-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("player id cannot be empty")]
    EmptyPlayerId,
    #[error("player id length {len} exceeds max {max}")]
    PlayerIdTooLong { len: usize, max: usize },
    #[error("player id contains invalid character '{ch}' at index {index}")]
    PlayerIdInvalidChar { ch: char, index: usize },

    #[error("invalid season '{value}', expected a year between {min} and {max}")]
    InvalidSeason { value: u16, min: u16, max: u16 },
    #[error("invalid week '{value}', expected 1 through {max}")]
    InvalidWeek { value: u16, max: u16 },
    #[error("invalid season type '{value}', expected one of regular, pre, post")]
    InvalidSeasonType { value: String },
    #[error("invalid provider '{value}', expected one of sleeper, sportsdataio")]
    InvalidProvider { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("request_id must be at least 8 characters")]
    InvalidRequestId,
    #[error("schema_version must match vMAJOR.MINOR.PATCH: '{value}'")]
    InvalidSchemaVersion { value: String },
    #[error("provider_chain must contain at least one provider")]
    EmptyProviderChain,

    #[error("error code cannot be empty")]
    EmptyErrorCode,
    #[error("error message cannot be empty")]
    EmptyErrorMessage,
}

/// Fatal configuration errors raised while wiring the provider manager.
///
/// These are setup-time failures, not per-request failures: a manager that
/// names an unregistered provider cannot dispatch anything.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("primary provider '{0}' is not registered")]
    PrimaryNotRegistered(ProviderId),
    #[error("fallback provider '{0}' is not registered")]
    FallbackNotRegistered(ProviderId),
    #[error("fallback provider must differ from the primary '{0}'")]
    FallbackEqualsPrimary(ProviderId),
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
