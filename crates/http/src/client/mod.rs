//! Authenticated fetch client

pub mod error;
pub mod refresh;
pub mod request;
pub mod typed;

use error::ClientError;
use portal_core::{ApiConfig, IdentitySession};
use refresh::RefreshGate;
use request::RequestInit;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on network calls for one logical request
pub const MAX_ATTEMPTS: u32 = 2;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_IDENTITY_HEADER: &str = "x-user-id-token";

/// HTTP client that attaches identity headers and recovers once from a 401
///
/// On a 401 from the first attempt the client performs one silent sign-in
/// and replays the request. Whatever the replay returns is final. If the
/// sign-in fails, or the replay is still unauthorized, the session is signed
/// out and the last response is handed back unchanged.
#[derive(Clone)]
pub struct AuthenticatedFetchClient {
    client: Client,
    base_url: String,
    identity: Arc<dyn IdentitySession>,
    identity_header: HeaderName,
    refresh: Option<Arc<RefreshGate>>,
}

impl std::fmt::Debug for AuthenticatedFetchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedFetchClient")
            .field("base_url", &self.base_url)
            .field("identity_header", &self.identity_header)
            .field("dedupe_refresh", &self.refresh.is_some())
            .finish_non_exhaustive()
    }
}

impl AuthenticatedFetchClient {
    /// Create a new client builder
    pub fn builder() -> AuthenticatedFetchClientBuilder {
        AuthenticatedFetchClientBuilder::default()
    }

    /// Create a client from API configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configured header name or base URL is invalid
    pub fn from_config(
        config: &ApiConfig,
        identity: Arc<dyn IdentitySession>,
    ) -> Result<Self, ClientError> {
        Self::builder()
            .base_url(&config.base_url)
            .identity(identity)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .identity_header(&config.identity_header)
            .user_agent(&config.user_agent)
            .dedupe_refresh(config.dedupe_refresh)
            .build()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform a request with identity headers and single-shot recovery
    ///
    /// Non-401 statuses are returned as normal responses; callers check
    /// `status()` themselves.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Request`] for transport failures (never
    /// retried) and [`ClientError::Identity`] when no token is available.
    #[tracing::instrument(name = "authenticated_fetch", skip_all, fields(method = %init.method, url))]
    pub async fn fetch(&self, url: &str, init: RequestInit) -> Result<Response, ClientError> {
        let url = self.resolve(url);
        tracing::Span::current().record("url", url.as_str());

        let mut attempt = 1;
        loop {
            // Generation is read before the token so a refresh that lands in
            // between is never repeated by this request.
            let observed = self.refresh.as_ref().map_or(0, |gate| gate.generation());

            let token = match self.identity.get_token().await {
                Ok(token) => token,
                Err(e) if attempt == 1 => return Err(e.into()),
                Err(e) => {
                    warn!("No token after silent sign-in: {e}");
                    self.sign_out_best_effort().await;
                    return Err(e.into());
                }
            };

            debug!(attempt, "Sending request");
            let response = self.send(&url, &init, &token).await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if attempt >= MAX_ATTEMPTS {
                warn!(attempt, "Request still unauthorized after silent sign-in");
                self.sign_out_best_effort().await;
                return Ok(response);
            }

            info!("Request unauthorized, attempting silent sign-in");
            let refreshed = match &self.refresh {
                Some(gate) => gate.refresh(self.identity.as_ref(), observed).await,
                None => self.identity.sign_in_silently().await,
            };

            if let Err(e) = refreshed {
                warn!("Silent sign-in failed: {e}");
                self.sign_out_best_effort().await;
                return Ok(response);
            }

            attempt += 1;
        }
    }

    async fn send(
        &self,
        url: &str,
        init: &RequestInit,
        token: &str,
    ) -> Result<Response, ClientError> {
        let headers = self.headers_for(init, token)?;
        let mut request = self
            .client
            .request(init.method.clone(), url)
            .headers(headers);

        if let Some(body) = &init.body {
            request = request.body(body.clone());
        }

        Ok(request.send().await?)
    }

    /// Caller headers first, identity headers on top so they always win
    fn headers_for(&self, init: &RequestInit, token: &str) -> Result<HeaderMap, ClientError> {
        let mut headers = init.headers.clone();

        if headers.contains_key(AUTHORIZATION) || headers.contains_key(&self.identity_header) {
            debug!("Replacing caller supplied identity headers");
        }

        let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ClientError::InvalidHeader(format!("authorization: {e}")))?;
        bearer.set_sensitive(true);

        let mut raw = HeaderValue::from_str(token)
            .map_err(|e| ClientError::InvalidHeader(format!("{}: {e}", self.identity_header)))?;
        raw.set_sensitive(true);

        headers.insert(AUTHORIZATION, bearer);
        headers.insert(self.identity_header.clone(), raw);
        Ok(headers)
    }

    async fn sign_out_best_effort(&self) {
        if let Err(e) = self.identity.sign_out().await {
            warn!("Sign-out after authentication failure failed: {e}");
        }
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            format!("{}/{}", self.base_url, url)
        }
    }
}

/// Builder for AuthenticatedFetchClient
pub struct AuthenticatedFetchClientBuilder {
    base_url: Option<String>,
    identity: Option<Arc<dyn IdentitySession>>,
    timeout: Duration,
    identity_header: String,
    user_agent: Option<String>,
    dedupe_refresh: bool,
}

impl Default for AuthenticatedFetchClientBuilder {
    fn default() -> Self {
        Self {
            base_url: None,
            identity: None,
            timeout: DEFAULT_TIMEOUT,
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            user_agent: None,
            dedupe_refresh: true,
        }
    }
}

impl AuthenticatedFetchClientBuilder {
    /// Set the base URL
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the identity session supplying tokens
    #[must_use]
    pub fn identity(mut self, identity: Arc<dyn IdentitySession>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the header carrying the raw ID token
    #[must_use]
    pub fn identity_header(mut self, name: impl Into<String>) -> Self {
        self.identity_header = name.into();
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Share one silent sign-in between concurrently failing requests
    #[must_use]
    pub const fn dedupe_refresh(mut self, enabled: bool) -> Self {
        self.dedupe_refresh = enabled;
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] when the base URL or identity
    /// is missing or the identity header name is invalid
    pub fn build(self) -> Result<AuthenticatedFetchClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;
        let identity = self
            .identity
            .ok_or_else(|| ClientError::Configuration("identity session is required".into()))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let identity_header = HeaderName::from_bytes(self.identity_header.as_bytes())
            .map_err(|e| {
                ClientError::Configuration(format!(
                    "invalid identity header '{}': {e}",
                    self.identity_header
                ))
            })?;

        let mut client_builder = ClientBuilder::new();

        #[cfg(not(target_arch = "wasm32"))]
        {
            client_builder = client_builder.timeout(self.timeout);
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("portal-client/{}", env!("CARGO_PKG_VERSION")));
        client_builder = client_builder.user_agent(user_agent);

        let client = client_builder.build()?;

        Ok(AuthenticatedFetchClient {
            client,
            base_url,
            identity,
            identity_header,
            refresh: self.dedupe_refresh.then(|| Arc::new(RefreshGate::new())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_core::StaticTokenSession;

    fn client(base: &str) -> AuthenticatedFetchClient {
        AuthenticatedFetchClient::builder()
            .base_url(base)
            .identity(Arc::new(StaticTokenSession::new("t")))
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let client = client("https://portal.example.com/api/");
        assert_eq!(client.base_url(), "https://portal.example.com/api");
        assert_eq!(
            client.resolve("/projects"),
            "https://portal.example.com/api/projects"
        );
        assert_eq!(
            client.resolve("cases/42"),
            "https://portal.example.com/api/cases/42"
        );
        assert_eq!(
            client.resolve("https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn test_identity_headers_override_caller() {
        let client = client("http://localhost");
        let init = RequestInit::new()
            .header(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="))
            .header(
                HeaderName::from_static("x-trace"),
                HeaderValue::from_static("keep"),
            );

        let headers = client.headers_for(&init, "tok").unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer tok");
        assert_eq!(headers["x-user-id-token"], "tok");
        assert_eq!(headers["x-trace"], "keep");
        assert!(headers[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn test_token_with_newline_is_rejected() {
        let client = client("http://localhost");
        let result = client.headers_for(&RequestInit::new(), "bad\ntoken");
        assert!(matches!(result, Err(ClientError::InvalidHeader(_))));
    }

    #[test]
    fn test_builder_requires_identity() {
        let result = AuthenticatedFetchClient::builder()
            .base_url("http://localhost")
            .build();
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[test]
    fn test_builder_rejects_bad_header_name() {
        let result = AuthenticatedFetchClient::builder()
            .base_url("http://localhost")
            .identity(Arc::new(StaticTokenSession::new("t")))
            .identity_header("bad header")
            .build();
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }
}
