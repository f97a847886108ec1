//! Credentials and bearer token lifecycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::connection::LazyConnection;
use crate::error::ApiError;
use crate::metrics;

/// API credentials. Immutable for the life of the process.
#[derive(Clone)]
pub struct Credentials {
    base_url: Url,
    username: String,
    password: String,
}

impl Credentials {
    /// Parse the base URL and bundle it with the login pair.
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self, url::ParseError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        Ok(Self {
            base_url: Url::parse(trimmed)?,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// API base URL, without a trailing slash.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join an absolute endpoint path (e.g. `/crypto/symbols`) onto the base URL.
    pub fn endpoint(&self, endpoint: &str) -> Result<Url, url::ParseError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/{}", base, endpoint.trim_start_matches('/')))
    }

    /// Login name.
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Bearer token issued by the token endpoint.
#[derive(Clone)]
pub struct Token {
    value: String,
    issued_at: Instant,
    /// `None` when neither the server nor the config gave a lifetime;
    /// such a token is trusted until a request comes back 401.
    expires_at: Option<Instant>,
}

impl Token {
    /// Build a token issued now. A lifetime past the clock's range leaves
    /// the expiry unknown.
    pub fn new(value: impl Into<String>, lifetime: Option<Duration>) -> Self {
        let issued_at = Instant::now();
        Self {
            value: value.into(),
            issued_at,
            expires_at: lifetime.and_then(|ttl| issued_at.checked_add(ttl)),
        }
    }

    /// Raw token string.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the token was issued.
    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// When the token stops being usable, if known.
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Whether the token may still be attached to requests.
    pub fn is_valid(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("value", &"***")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds, when the server declares one. Kept raw so an
    /// odd encoding never fails the whole response.
    #[serde(default)]
    expires_in: Option<Value>,
}

impl TokenResponse {
    /// Declared lifetime, if it is a finite non-negative number of seconds
    /// (JSON number or numeric string).
    fn lifetime(&self) -> Option<Duration> {
        let secs = match self.expires_in.as_ref()? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(secs).ok()
    }
}

/// Owns the credentials and at most one live [`Token`].
///
/// All token reads and writes go through one async mutex that is held
/// across the token request, so only one authentication is ever in
/// flight; callers that queue behind it see the fresh token instead of
/// issuing their own request.
#[derive(Debug)]
pub struct AuthSession {
    credentials: Credentials,
    connection: Arc<LazyConnection>,
    token: Mutex<Option<Token>>,
    default_ttl: Option<Duration>,
}

impl AuthSession {
    /// Create a session. `default_ttl` applies when the token response
    /// carries no `expires_in`.
    pub fn new(
        credentials: Credentials,
        connection: Arc<LazyConnection>,
        default_ttl: Option<Duration>,
    ) -> Self {
        Self {
            credentials,
            connection,
            token: Mutex::new(None),
            default_ttl,
        }
    }

    /// Session credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// True iff a token exists and has not expired.
    pub async fn is_valid(&self) -> bool {
        self.token
            .lock()
            .await
            .as_ref()
            .is_some_and(Token::is_valid)
    }

    /// Request a new token unconditionally.
    pub async fn authenticate(&self) -> Result<Token, ApiError> {
        let mut slot = self.token.lock().await;
        self.refresh_locked(&mut slot).await
    }

    /// Current token value, authenticating first if there is no valid one.
    pub async fn bearer(&self) -> Result<String, ApiError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.value.clone());
        }
        self.refresh_locked(&mut slot).await.map(|t| t.value)
    }

    /// Replace a token the server just rejected.
    ///
    /// If another caller already swapped `rejected` for a fresh token while
    /// we waited for the lock, that token is returned without a new request.
    pub async fn reauthenticate(&self, rejected: &str) -> Result<String, ApiError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref() {
            if token.value != rejected && token.is_valid() {
                debug!("Token already refreshed by a concurrent request");
                return Ok(token.value.clone());
            }
        }
        *slot = None;
        self.refresh_locked(&mut slot).await.map(|t| t.value)
    }

    /// Drop the current token.
    pub async fn invalidate(&self) {
        self.token.lock().await.take();
    }

    #[instrument(skip(self, slot), fields(username = %self.credentials.username))]
    async fn refresh_locked(&self, slot: &mut Option<Token>) -> Result<Token, ApiError> {
        metrics::inc_auth_requests();
        match self.request_token().await {
            Ok(token) => {
                info!("Successfully authenticated with API");
                *slot = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                error!(error = %e, "Authentication failed");
                metrics::inc_auth_failures();
                *slot = None;
                Err(e)
            }
        }
    }

    async fn request_token(&self) -> Result<Token, ApiError> {
        let url = self.credentials.endpoint("/auth/token")?;
        let http = self.connection.client()?;

        let response = http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Token endpoint rejected credentials");
            return Err(ApiError::Auth(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Auth(format!("malformed token response: {}", e)))?;

        if body.expires_in.is_some() && body.lifetime().is_none() {
            warn!(expires_in = ?body.expires_in, "Ignoring unusable token expiry");
        }
        let lifetime = body.lifetime().or(self.default_ttl);
        Ok(Token::new(body.access_token, lifetime))
    }
}
