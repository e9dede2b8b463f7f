//! Stats API error types.

use hyper::StatusCode;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised by the stats API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The listen socket could not be bound.
    #[error("failed to bind stats API on {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// `/update` arrived without a body.
    #[error("request body is required")]
    MissingBody,

    /// The body is not a valid update payload.
    #[error("invalid update payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// The request body could not be read.
    #[error("failed to read request body: {0}")]
    BodyRead(#[from] hyper::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// HTTP status reported for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingBody | Self::InvalidPayload(_) | Self::BodyRead(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Bind { .. } | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type for stats API operations.
pub type ApiResult<T> = Result<T, ApiError>;
