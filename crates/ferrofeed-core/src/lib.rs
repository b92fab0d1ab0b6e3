//! # Ferrofeed Core
//!
//! Rate-limited HTTP transport, a compressed Redis-backed cache and weighted
//! multi-source aggregation of financial news.
//!
//! ## Overview
//!
//! - **Canonical domain types** shared by every source (`NormalizedItem`,
//!   `UtcDateTime`, `DateRange`, impact annotations)
//! - **Transport client** with token-bucket rate limiting, auth injection,
//!   request/response transforms and classified bounded retry
//! - **Cache layer** with per-type TTLs, transparent gzip above a size
//!   threshold and per-instance hit/miss statistics
//! - **Source adapters** for NewsAPI, Finnhub and GNews
//! - **Aggregator** that fans out to enabled sources by weight, merges,
//!   deduplicates and caches the result
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | NewsAPI, Finnhub and GNews adapters plus shared normalization |
//! | [`aggregator`] | Weighted fan-out, merge and write-through caching |
//! | [`cache`] | Typed cache facade, backends (memory, Redis) and statistics |
//! | [`config`] | Environment-driven configuration |
//! | [`domain`] | Items, timestamps, source ids and date ranges |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`impact`] | Keyword-based market-impact assessment |
//! | [`logging`] | Optional `tracing` subscriber setup |
//! | [`rate_limit`] | Token-bucket settings and limiter |
//! | [`retry`] | Backoff formulas and retry policy |
//! | [`source`] | Source adapter contract |
//! | [`transport`] | Rate-limited, retrying HTTP transport |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferrofeed_core::{AggregatorBuilder, FeedConfig, ImpactLevel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FeedConfig::from_env()?;
//!     let aggregator = AggregatorBuilder::from_config(&config)?.build();
//!
//!     for item in aggregator.get_by_impact_level(ImpactLevel::High, 5).await {
//!         println!("{} [{}] {}", item.published_at, item.source, item.title);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Aggregator    │────▶│      Cache       │──▶ Redis / memory
//! └────────┬────────┘     └──────────────────┘
//!          │ one task per enabled source
//!          ▼
//! ┌─────────────────┐
//! │ Source Adapter  │
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ TransportClient │────▶│ HttpClient       │
//! │ (limit, retry)  │     │ (reqwest)        │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Query methods on the aggregator and the cache never fail; failures are
//! logged and degrade to empty results or misses. Adapters expose a
//! classified [`SourceError`]:
//!
//! ```rust
//! use ferrofeed_core::{SourceError, SourceErrorKind};
//!
//! fn handle_error(error: SourceError) {
//!     match error.kind() {
//!         SourceErrorKind::Upstream if error.retryable() => {
//!             // Try again later
//!         }
//!         SourceErrorKind::InvalidRequest => {
//!             // Report to user
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - API keys and cache passwords are redacted from `Debug` output and logs
//! - Keys are read from the environment, never from source

pub mod adapters;
pub mod aggregator;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod impact;
pub mod logging;
pub mod rate_limit;
pub mod retry;
pub mod source;
pub mod transport;

// Adapter implementations
pub use adapters::{FinnhubAdapter, GNewsAdapter, NewsApiAdapter};

// Aggregation
pub use aggregator::{Aggregator, AggregatorBuilder, TrendingTopic};

// Caching
pub use cache::{
    Cache, CacheBackend, CacheConfig, CacheError, CacheHealth, CacheSettings, CacheStats,
    EntityType, MemoryBackend, RedisBackend, RedisSettings,
};

// Configuration
pub use config::{FeedConfig, SourceKind, SourceSettings};

// Domain models
pub use domain::{DateRange, ImpactAnnotation, ImpactLevel, NormalizedItem, SourceId, UtcDateTime};

// Error types
pub use error::{CoreError, ValidationError};

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient};

// Logging
pub use logging::LogFormat;

// Rate limiting and retry
pub use rate_limit::RateLimit;
pub use retry::{Backoff, RetryPolicy};

// Source contract
pub use source::{SourceAdapter, SourceDescriptor, SourceError, SourceErrorKind};

// Transport
pub use transport::{
    AuthConfig, ClientConfig, OAuth2Credentials, TransportClient, TransportError,
    TransportErrorKind,
};
