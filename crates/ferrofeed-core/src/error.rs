use thiserror::Error;

/// Validation and contract errors exposed by `ferrofeed-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("source id cannot be empty")]
    EmptySourceId,
    #[error("source weight {value} must be within 0.0..=1.0")]
    WeightOutOfRange { value: String },

    #[error("timestamp must be RFC3339: '{value}'")]
    InvalidTimestamp { value: String },
    #[error("unix timestamp {value} is out of range")]
    TimestampOutOfRange { value: i64 },
    #[error("date range start {start} is after end {end}")]
    InvertedRange { start: String, end: String },

    #[error("invalid entity type '{value}', expected one of news, search, trending, product, price")]
    InvalidEntityType { value: String },
    #[error("invalid impact level '{value}', expected one of high, medium, low")]
    InvalidImpactLevel { value: String },

    #[error("base url must start with http:// or https://: '{value}'")]
    InvalidBaseUrl { value: String },
    #[error("requests per second must be positive and finite")]
    InvalidRateLimit,

    #[error("configuration value for '{key}' is invalid: '{value}'")]
    InvalidConfig { key: String, value: String },
}

/// Top-level error type for core construction paths.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Cache(#[from] crate::cache::CacheError),
}
