//! Source adapter contract.
//!
//! Every upstream is wrapped in a [`SourceAdapter`]. The required `fetch_*`
//! methods surface a [`SourceError`]; the provided `get_*` counterparts log
//! the error and degrade to an empty result, which is what most callers want
//! from an unreliable news feed.
//!
//! | Method | Fallible | Infallible |
//! |--------|----------|------------|
//! | Latest items | [`fetch_latest`](SourceAdapter::fetch_latest) | [`get_latest`](SourceAdapter::get_latest) |
//! | Keyword search | [`fetch_search`](SourceAdapter::fetch_search) | [`search`](SourceAdapter::search) |
//! | Publish-time window | [`fetch_range`](SourceAdapter::fetch_range) | [`get_by_date_range`](SourceAdapter::get_by_date_range) |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::warn;

use crate::transport::{TransportError, TransportErrorKind};
use crate::{DateRange, NormalizedItem, SourceId, ValidationError};

pub type SourceFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<NormalizedItem>, SourceError>> + Send + 'a>>;

pub type ItemsFuture<'a> = Pin<Box<dyn Future<Output = Vec<NormalizedItem>> + Send + 'a>>;

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// The transport gave up; see [`SourceError::transport_kind`].
    Upstream,
    /// The upstream answered but the payload could not be understood.
    Parse,
    InvalidRequest,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
    transport_kind: Option<TransportErrorKind>,
}

impl SourceError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Parse,
            message: message.into(),
            retryable: false,
            transport_kind: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
            transport_kind: None,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unsupported,
            message: message.into(),
            retryable: false,
            transport_kind: None,
        }
    }

    pub fn upstream(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind: SourceErrorKind::Upstream,
            message: message.into(),
            retryable,
            transport_kind: None,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// Transport classification when the failure came from the HTTP layer.
    pub const fn transport_kind(&self) -> Option<TransportErrorKind> {
        self.transport_kind
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Upstream => "source.upstream",
            SourceErrorKind::Parse => "source.parse",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Unsupported => "source.unsupported",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<TransportError> for SourceError {
    fn from(error: TransportError) -> Self {
        Self {
            kind: SourceErrorKind::Upstream,
            message: error.to_string(),
            retryable: error.retryable(),
            transport_kind: Some(error.kind()),
        }
    }
}

impl From<ValidationError> for SourceError {
    fn from(error: ValidationError) -> Self {
        Self::invalid_request(error.to_string())
    }
}

/// Upstream news provider normalized into [`NormalizedItem`]s.
///
/// Implementations must be `Send + Sync`; the aggregator shares them across
/// spawned tasks behind an `Arc`.
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;

    /// Most recent items, newest first, at most `limit` of them.
    fn fetch_latest(&self, limit: usize) -> SourceFuture<'_>;

    /// Items matching a free-text query.
    fn fetch_search<'a>(&'a self, query: &'a str, limit: usize) -> SourceFuture<'a>;

    /// Items published inside `range` (inclusive).
    fn fetch_range(&self, range: DateRange, limit: usize) -> SourceFuture<'_>;

    fn get_latest(&self, limit: usize) -> ItemsFuture<'_> {
        Box::pin(async move { or_empty(self.id(), "latest", self.fetch_latest(limit).await) })
    }

    fn search<'a>(&'a self, query: &'a str, limit: usize) -> ItemsFuture<'a> {
        Box::pin(async move {
            or_empty(self.id(), "search", self.fetch_search(query, limit).await)
        })
    }

    fn get_by_date_range(&self, range: DateRange, limit: usize) -> ItemsFuture<'_> {
        Box::pin(async move { or_empty(self.id(), "range", self.fetch_range(range, limit).await) })
    }
}

fn or_empty(
    source: SourceId,
    operation: &'static str,
    result: Result<Vec<NormalizedItem>, SourceError>,
) -> Vec<NormalizedItem> {
    match result {
        Ok(items) => items,
        Err(error) => {
            warn!(
                source = %source,
                operation,
                code = error.code(),
                error = %error,
                "source request failed; returning no items"
            );
            Vec::new()
        }
    }
}

/// Registration record for one source inside the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDescriptor {
    pub id: SourceId,
    weight: f64,
    pub enabled: bool,
}

impl SourceDescriptor {
    pub fn new(id: SourceId, weight: f64) -> Result<Self, ValidationError> {
        if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
            return Err(ValidationError::WeightOutOfRange {
                value: weight.to_string(),
            });
        }
        Ok(Self {
            id,
            weight,
            enabled: true,
        })
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub const fn weight(&self) -> f64 {
        self.weight
    }
}
