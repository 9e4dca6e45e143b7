//! Token providers - PAT と GitHub App installation token
//!
//! Both implement the one-method `TokenProvider` port; the composition root
//! picks one from configuration.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::github::client::{API_VERSION, USER_AGENT};
use crate::github::types::InstallationToken;
use crate::ports::clock::Clock;
use crate::ports::token_provider::{TokenError, TokenProvider};
use crate::ports::transport::{HttpMethod, HttpRequest, HttpTransport};

/// Installation tokens are refreshed once they are this close to expiry.
pub const REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Long-lived personal access token.
pub struct StaticTokenProvider {
    token: Option<SecretString>,
}

impl StaticTokenProvider {
    /// An empty token is treated as missing.
    pub fn new(token: Option<SecretString>) -> Self {
        let token = token.filter(|t| !t.expose_secret().trim().is_empty());
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<SecretString, TokenError> {
        self.token.clone().ok_or(TokenError::Missing)
    }
}

/// Signs the short-lived app JWT used for the installation token exchange.
pub trait AppJwtSigner: Send + Sync {
    fn sign(&self, now: DateTime<Utc>) -> Result<String, TokenError>;
}

/// RS256 app JWT: `iat = now - 60`, `exp = now + 600`, `iss = app id`.
pub struct Rs256Signer {
    app_id: String,
    key: EncodingKey,
}

impl Rs256Signer {
    pub fn from_pem(app_id: impl Into<String>, pem: &SecretString) -> Result<Self, TokenError> {
        let key = EncodingKey::from_rsa_pem(pem.expose_secret().as_bytes())
            .map_err(|e| TokenError::Invalid(format!("GitHub App private key: {e}")))?;
        Ok(Self {
            app_id: app_id.into(),
            key,
        })
    }
}

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

impl AppJwtSigner for Rs256Signer {
    fn sign(&self, now: DateTime<Utc>) -> Result<String, TokenError> {
        let now = now.timestamp();
        let claims = AppClaims {
            iat: now - 60,
            exp: now + 600,
            iss: self.app_id.clone(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| TokenError::Invalid(format!("app JWT: {e}")))
    }
}

struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

/// GitHub App installation token, cached until shortly before expiry.
///
/// The cache lock is held across the exchange, so concurrent callers that
/// miss the cache wait for one refresh instead of each starting their own.
pub struct InstallationTokenProvider {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    signer: Arc<dyn AppJwtSigner>,
    api_base_url: String,
    installation_id: u64,
    cache: Mutex<Option<CachedToken>>,
}

impl InstallationTokenProvider {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
        signer: Arc<dyn AppJwtSigner>,
        api_base_url: impl AsRef<str>,
        installation_id: u64,
    ) -> Self {
        Self {
            transport,
            clock,
            signer,
            api_base_url: api_base_url.as_ref().trim_end_matches('/').to_string(),
            installation_id,
            cache: Mutex::new(None),
        }
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<CachedToken, TokenError> {
        let jwt = self.signer.sign(now)?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base_url, self.installation_id
        );

        let resp = self
            .transport
            .send(HttpRequest {
                method: HttpMethod::Post,
                url,
                headers: vec![
                    ("Authorization".to_string(), format!("Bearer {jwt}")),
                    (
                        "Accept".to_string(),
                        "application/vnd.github+json".to_string(),
                    ),
                    ("X-GitHub-Api-Version".to_string(), API_VERSION.to_string()),
                    ("User-Agent".to_string(), USER_AGENT.to_string()),
                ],
                body: Vec::new(),
            })
            .await
            .map_err(|e| TokenError::Transport(e.to_string()))?;

        if !resp.is_success() {
            return Err(TokenError::Exchange {
                status: resp.status,
                message: String::from_utf8_lossy(&resp.body).into_owned(),
            });
        }

        let payload: InstallationToken =
            serde_json::from_slice(&resp.body).map_err(|e| TokenError::Exchange {
                status: resp.status,
                message: format!("unreadable token response: {e}"),
            })?;

        info!(
            installation_id = self.installation_id,
            expires_at = %payload.expires_at,
            "installation token refreshed"
        );
        Ok(CachedToken {
            token: SecretString::from(payload.token),
            expires_at: payload.expires_at,
        })
    }
}

#[async_trait]
impl TokenProvider for InstallationTokenProvider {
    async fn token(&self) -> Result<SecretString, TokenError> {
        let mut cache = self.cache.lock().await;
        let now = self.clock.now();

        if let Some(cached) = cache.as_ref() {
            if now + Duration::seconds(REFRESH_MARGIN_SECS) < cached.expires_at {
                return Ok(cached.token.clone());
            }
            debug!(installation_id = self.installation_id, "installation token near expiry");
        }

        let fresh = self.exchange(now).await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}
