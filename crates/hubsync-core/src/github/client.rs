//! Rate-limit-aware GitHub REST client.
//!
//! `ApiClient::run` obtains a token, hands the closure an `AuthedFetch`, and
//! returns whatever the closure returns. Every response goes through the
//! rate-limit classifier before the closure sees it, so step code never has to
//! look at rate-limit headers itself.

use std::future::Future;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{Instrument, debug};

use super::error::ApiError;
use super::pagination::next_link;
use super::rate_limit::{is_rate_limited, rate_limit_message, retry_after_ms};
use crate::ports::clock::Clock;
use crate::ports::token_provider::TokenProvider;
use crate::ports::transport::{HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpTransport};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
pub const API_VERSION: &str = "2022-11-28";
pub const USER_AGENT: &str = "hubsync";

/// Page cap for `get_paginated` when the caller has no better bound.
pub const DEFAULT_MAX_PAGES: usize = 50;

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenProvider>,
    clock: Arc<dyn Clock>,
    base_url: Arc<str>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<dyn TokenProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            tokens,
            clock,
            base_url: Arc::from(DEFAULT_BASE_URL),
        }
    }

    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = Arc::from(base_url.as_ref().trim_end_matches('/'));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run `f` against an authenticated fetch handle.
    pub async fn run<F, Fut, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(AuthedFetch) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let span = tracing::info_span!("github_api.run", base_url = %self.base_url);
        async move {
            let token = self.tokens.token().await?;
            let fetch = AuthedFetch {
                transport: Arc::clone(&self.transport),
                clock: Arc::clone(&self.clock),
                base_url: Arc::clone(&self.base_url),
                token: Arc::new(token),
            };
            f(fetch).await
        }
        .instrument(span)
        .await
    }
}

/// Authenticated request handle passed to `ApiClient::run` closures.
#[derive(Clone)]
pub struct AuthedFetch {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    base_url: Arc<str>,
    token: Arc<SecretString>,
}

impl AuthedFetch {
    /// Absolute URLs pass through; paths are joined to the base URL.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn default_headers(&self) -> HttpHeaders {
        vec![
            (
                "Authorization".to_string(),
                format!("token {}", self.token.expose_secret()),
            ),
            (
                "Accept".to_string(),
                "application/vnd.github+json".to_string(),
            ),
            ("X-GitHub-Api-Version".to_string(), API_VERSION.to_string()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ]
    }

    /// Send one request. Rate-limit responses come back as
    /// `ApiError::RateLimited`; every other status is returned as-is.
    pub async fn fetch(
        &self,
        method: HttpMethod,
        path: &str,
        extra_headers: HttpHeaders,
        body: Vec<u8>,
    ) -> Result<HttpResponse, ApiError> {
        let url = self.resolve(path);
        let mut headers = self.default_headers();
        for (name, value) in extra_headers {
            headers.retain(|(h, _)| !h.eq_ignore_ascii_case(&name));
            headers.push((name, value));
        }

        debug!(method = method.as_str(), url = %url, "github request");
        let resp = self
            .transport
            .send(HttpRequest {
                method,
                url: url.clone(),
                headers,
                body,
            })
            .await
            .map_err(|e| ApiError::Api {
                status: 0,
                message: e.to_string(),
                url: url.clone(),
            })?;

        if is_rate_limited(&resp) {
            let wait_ms = retry_after_ms(&resp, self.clock.now());
            return Err(ApiError::RateLimited {
                status: resp.status,
                message: rate_limit_message(resp.status, wait_ms),
                url,
                retry_after_ms: wait_ms,
            });
        }
        Ok(resp)
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse, ApiError> {
        self.fetch(HttpMethod::Get, path, Vec::new(), Vec::new())
            .await
    }

    /// GET and decode a JSON body, failing on any non-2xx status.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.resolve(path);
        let resp = ensure_success(self.get(path).await?, &url)?;
        decode(&resp, &url)
    }

    /// GET a JSON array, following `Link: rel="next"` up to `max_pages`.
    pub async fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        max_pages: usize,
    ) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut next = Some(self.resolve(path));
        let mut pages = 0;

        while let Some(url) = next.take() {
            if pages >= max_pages {
                debug!(url = %url, max_pages, "page cap reached");
                break;
            }
            let resp = ensure_success(self.get(&url).await?, &url)?;
            let page: Vec<T> = decode(&resp, &url)?;
            items.extend(page);
            next = next_link(resp.header("Link"));
            pages += 1;
        }
        Ok(items)
    }
}

/// Turn a non-2xx response into `ApiError::Api`, using GitHub's `message`
/// field when the body has one.
pub fn ensure_success(resp: HttpResponse, url: &str) -> Result<HttpResponse, ApiError> {
    if resp.is_success() {
        return Ok(resp);
    }
    let message = serde_json::from_slice::<serde_json::Value>(&resp.body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(&resp.body).into_owned());
    Err(ApiError::Api {
        status: resp.status,
        message,
        url: url.to_string(),
    })
}

fn decode<T: DeserializeOwned>(resp: &HttpResponse, url: &str) -> Result<T, ApiError> {
    serde_json::from_slice(&resp.body).map_err(|e| ApiError::Malformed {
        url: url.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ErrorKind;
    use crate::ports::clock::FixedClock;
    use crate::ports::token_provider::TokenError;
    use crate::ports::transport::{MockTransport, header_get};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    struct Pat(&'static str);

    #[async_trait]
    impl TokenProvider for Pat {
        async fn token(&self) -> Result<SecretString, TokenError> {
            if self.0.is_empty() {
                return Err(TokenError::Missing);
            }
            Ok(SecretString::from(self.0.to_string()))
        }
    }

    fn client(transport: &MockTransport, token: &'static str) -> ApiClient {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        ApiClient::new(
            Arc::new(transport.clone()),
            Arc::new(Pat(token)),
            Arc::new(clock),
        )
    }

    fn response(status: u16, headers: &[(&str, &str)], body: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: serde_json::to_vec(&body).unwrap(),
        }
    }

    #[tokio::test]
    async fn sends_github_headers_and_resolves_paths() {
        let transport = MockTransport::new();
        transport.push_json(
            "https://api.github.com/repos/acme/widgets",
            json!({"id": 42}),
        );

        let v: serde_json::Value = client(&transport, "t0k")
            .run(|fetch| async move { fetch.get_json("/repos/acme/widgets").await })
            .await
            .unwrap();
        assert_eq!(v["id"], 42);

        let req = &transport.requests()[0];
        assert_eq!(header_get(&req.headers, "authorization"), Some("token t0k"));
        assert_eq!(
            header_get(&req.headers, "accept"),
            Some("application/vnd.github+json")
        );
        assert_eq!(
            header_get(&req.headers, "x-github-api-version"),
            Some("2022-11-28")
        );
        assert_eq!(header_get(&req.headers, "user-agent"), Some("hubsync"));
    }

    #[tokio::test]
    async fn rate_limit_is_surfaced_with_wait() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            "https://api.github.com/repos/acme/widgets/issues",
            response(429, &[("Retry-After", "30")], json!({"message": "slow down"})),
        );

        let err = client(&transport, "t")
            .run(|fetch| async move { fetch.get("/repos/acme/widgets/issues").await })
            .await
            .unwrap_err();
        match err {
            ApiError::RateLimited {
                status,
                retry_after_ms,
                ref message,
                ..
            } => {
                assert_eq!(status, 429);
                assert_eq!(retry_after_ms, 30_000);
                assert_eq!(message, "GitHub rate limit hit (429). Retry after 30s.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn permission_403_is_a_plain_api_error() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            "https://api.github.com/repos/acme/secret",
            response(
                403,
                &[("X-RateLimit-Remaining", "5")],
                json!({"message": "Resource not accessible by integration"}),
            ),
        );

        let err = client(&transport, "t")
            .run(|fetch| async move {
                fetch
                    .get_json::<serde_json::Value>("/repos/acme/secret")
                    .await
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Api { status: 403, ref message, .. } if message == "Resource not accessible by integration"
        ));
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let transport = MockTransport::new();
        let err = client(&transport, "")
            .run(|fetch| async move { fetch.get("/rate_limit").await })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_maps_to_status_zero() {
        let transport = MockTransport::new();
        let err = client(&transport, "t")
            .run(|fetch| async move { fetch.get("/nowhere").await })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(0));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn shape_mismatch_is_malformed() {
        let transport = MockTransport::new();
        transport.push_json("https://api.github.com/x", json!({"not": "a list"}));
        let err = client(&transport, "t")
            .run(|fetch| async move { fetch.get_json::<Vec<u64>>("/x").await })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[tokio::test]
    async fn pagination_follows_next_links_up_to_cap() {
        let transport = MockTransport::new();
        let base = "https://api.github.com/repos/acme/widgets/pulls";
        let link2 = format!("<{base}?per_page=2&page=2>; rel=\"next\"");
        let link3 = format!("<{base}?per_page=2&page=3>; rel=\"next\"");
        transport.push_response(
            HttpMethod::Get,
            format!("{base}?per_page=2"),
            response(
                200,
                &[("Link", link2.as_str())],
                json!([1, 2]),
            ),
        );
        transport.push_response(
            HttpMethod::Get,
            format!("{base}?per_page=2&page=2"),
            response(
                200,
                &[("Link", link3.as_str())],
                json!([3]),
            ),
        );

        let items: Vec<u64> = client(&transport, "t")
            .run(|fetch| async move {
                fetch
                    .get_paginated("/repos/acme/widgets/pulls?per_page=2", 2)
                    .await
            })
            .await
            .unwrap();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn custom_base_url_drops_trailing_slash() {
        let transport = MockTransport::new();
        let c = client(&transport, "t").with_base_url("https://ghe.example.com/api/v3/");
        assert_eq!(c.base_url(), "https://ghe.example.com/api/v3");
    }
}
