use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every failure surfaced on the wire is one of these kinds.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("subscriber queue overflow")]
    Backpressure,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("deadline exceeded")]
    Timeout,
}

/// Stable wire code carried in error acks and HTTP error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    RateLimited,
    Backpressure,
    Internal,
    Timeout,
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation(_) => ErrorCode::ValidationError,
            Error::Unauthenticated(_) => ErrorCode::Unauthenticated,
            Error::Forbidden(_) => ErrorCode::Forbidden,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::Conflict(_) => ErrorCode::Conflict,
            Error::RateLimited { .. } => ErrorCode::RateLimited,
            Error::Backpressure => ErrorCode::Backpressure,
            Error::Internal(_) => ErrorCode::Internal,
            Error::Timeout => ErrorCode::Timeout,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

impl ErrorCode {
    /// Rebuild a typed error from a wire code, e.g. out of an error ack.
    pub fn into_error(self, message: String, retry_after: Option<u64>) -> Error {
        match self {
            ErrorCode::ValidationError => Error::Validation(message),
            ErrorCode::Unauthenticated => Error::Unauthenticated(message),
            ErrorCode::Forbidden => Error::Forbidden(message),
            ErrorCode::NotFound => Error::NotFound(message),
            ErrorCode::Conflict => Error::Conflict(message),
            ErrorCode::RateLimited => Error::RateLimited {
                retry_after_secs: retry_after.unwrap_or(0),
            },
            ErrorCode::Backpressure => Error::Backpressure,
            ErrorCode::Internal => Error::Internal(message),
            ErrorCode::Timeout => Error::Timeout,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
