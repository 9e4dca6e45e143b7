//! TokenProvider port - 認証トークンの取得
//!
//! One capability, one method. The concrete strategy (static PAT or GitHub
//! App installation token) is chosen once at construction time and injected
//! as `Arc<dyn TokenProvider>`.

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use crate::domain::errors::ErrorKind;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no GitHub credential configured")]
    Missing,

    #[error("invalid GitHub credential: {0}")]
    Invalid(String),

    #[error("token exchange failed ({status}): {message}")]
    Exchange { status: u16, message: String },

    #[error("token exchange transport error: {0}")]
    Transport(String),
}

impl TokenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenError::Missing | TokenError::Invalid(_) => ErrorKind::Auth,
            TokenError::Exchange { status, .. } if matches!(status, 401 | 403 | 404) => {
                ErrorKind::Auth
            }
            TokenError::Exchange { .. } | TokenError::Transport(_) => ErrorKind::Transient,
        }
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A bearer token valid for at least the next request.
    async fn token(&self) -> Result<SecretString, TokenError>;
}
