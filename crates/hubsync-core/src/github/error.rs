use thiserror::Error;

use crate::domain::errors::ErrorKind;
use crate::ports::token_provider::TokenError;

/// Everything a GitHub call can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-success response, or a transport failure (`status == 0`).
    #[error("GitHub API error ({status}) at {url}: {message}")]
    Api {
        status: u16,
        message: String,
        url: String,
    },

    /// 429, or 403 with `X-RateLimit-Remaining: 0`.
    #[error("{message}")]
    RateLimited {
        status: u16,
        message: String,
        url: String,
        retry_after_ms: u64,
    },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("malformed GitHub response from {url}: {message}")]
    Malformed { url: String, message: String },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Api { status: 401, .. } => ErrorKind::Auth,
            ApiError::Api { .. } => ErrorKind::Transient,
            ApiError::RateLimited { .. } => ErrorKind::RateLimited,
            ApiError::Token(e) => e.kind(),
            ApiError::Malformed { .. } => ErrorKind::Malformed,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } | ApiError::RateLimited { status, .. } => Some(*status),
            _ => None,
        }
    }
}
