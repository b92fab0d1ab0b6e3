use std::fmt::{Display, Formatter};

use crate::http_client::HttpError;

/// Failure classes of an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// No response was received.
    Network,
    /// 401 or 403.
    Authentication,
    /// 429.
    RateLimit,
    /// 404.
    NotFound,
    /// 422.
    Validation,
    /// Any 5xx.
    Server,
    Unknown,
}

impl TransportErrorKind {
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            404 => Self::NotFound,
            422 => Self::Validation,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }

    pub const fn retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Authentication | Self::RateLimit | Self::Server
        )
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "transport.network",
            Self::Authentication => "transport.authentication",
            Self::RateLimit => "transport.rate_limit",
            Self::NotFound => "transport.not_found",
            Self::Validation => "transport.validation",
            Self::Server => "transport.server",
            Self::Unknown => "transport.unknown",
        }
    }
}

/// Classified transport error surfaced after retries are exhausted, or
/// immediately for non-retryable classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    kind: TransportErrorKind,
    status: Option<u16>,
    message: String,
    attempts: u32,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            attempts: 1,
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::from_status(status),
            status: Some(status),
            message: message.into(),
            attempts: 1,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unknown, message)
    }

    pub fn from_http_error(error: &HttpError) -> Self {
        if error.retryable() {
            Self::network(error.message())
        } else {
            Self::unknown(error.message())
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub const fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Total attempts made before this error was surfaced.
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub const fn retryable(&self) -> bool {
        self.kind.retryable()
    }

    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {}, {})", self.message, status, self.code()),
            None => write!(f, "{} ({})", self.message, self.code()),
        }
    }
}

impl std::error::Error for TransportError {}
