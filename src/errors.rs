use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::geolocation::GeoFailure;
use crate::session::SessionStatus;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Config(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("unknown category tag `{0}`")]
    UnknownCategory(String),
    #[error("invalid location: {0}")]
    InvalidLocation(String),
    #[error("cannot {event} while session is {from:?}")]
    InvalidTransition {
        from: SessionStatus,
        event: &'static str,
    },
    #[error("retry rejected: {0}")]
    RetryRejected(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscoveryError {
    #[error("location unavailable: {reason}")]
    LocationUnavailable { reason: GeoFailure },
    #[error("request timed out")]
    Timeout,
    #[error("network error: {message}")]
    NetworkError { message: String },
    #[error("backend responded with HTTP {status}")]
    HttpError { status: u16 },
    #[error("malformed response: {message}")]
    MalformedResponse { message: String },
    #[error("request cancelled")]
    Cancelled,
}

impl DiscoveryError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::NetworkError { .. } => true,
            Self::HttpError { status } => *status >= 500,
            Self::LocationUnavailable { .. } | Self::MalformedResponse { .. } | Self::Cancelled => {
                false
            }
        }
    }

    pub fn is_fetch_failure(&self) -> bool {
        !matches!(self, Self::LocationUnavailable { .. } | Self::Cancelled)
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::LocationUnavailable { .. } => "location_unavailable",
            Self::Timeout => "timeout",
            Self::NetworkError { .. } => "network_error",
            Self::HttpError { .. } => "http_error",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Cancelled => "cancelled",
        }
    }
}
