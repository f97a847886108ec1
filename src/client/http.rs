//! Authenticated GET client with one-shot re-authentication.

use std::sync::Arc;
use std::time::Instant;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::connection::{ConnectionSettings, LazyConnection};
use super::session::{AuthSession, Credentials};
use crate::config::Config;
use crate::error::ApiError;
use crate::metrics;

/// Outcome of a single GET attempt.
enum Attempt {
    Done(Value),
    Unauthorized,
}

/// Depth API client.
///
/// Cheap to share behind an `Arc`; the token and connection pool inside
/// are the only mutable state.
#[derive(Debug)]
pub struct HttpClient {
    session: Arc<AuthSession>,
    connection: Arc<LazyConnection>,
}

impl HttpClient {
    /// Wrap an existing session and connection.
    pub fn new(session: Arc<AuthSession>, connection: Arc<LazyConnection>) -> Self {
        Self {
            session,
            connection,
        }
    }

    /// Build the session, connection and client from config.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let credentials = config.credentials()?;
        let connection = Arc::new(LazyConnection::new(ConnectionSettings {
            timeout: config.http_timeout(),
            connect_timeout: config.connect_timeout(),
            ..ConnectionSettings::default()
        }));
        let session = Arc::new(AuthSession::new(
            credentials,
            connection.clone(),
            config.token_ttl(),
        ));
        Ok(Self::new(session, connection))
    }

    /// Client for `credentials` with default connection settings.
    pub fn with_credentials(credentials: Credentials) -> Self {
        let connection = Arc::new(LazyConnection::new(ConnectionSettings::default()));
        let session = Arc::new(AuthSession::new(
            credentials,
            connection.clone(),
            Some(std::time::Duration::from_secs(30 * 60)),
        ));
        Self::new(session, connection)
    }

    /// Underlying auth session.
    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    /// Authenticated GET returning the decoded JSON body.
    ///
    /// A 401 invalidates the token, triggers exactly one re-authentication
    /// and exactly one retry. Transport failures are returned as-is.
    #[instrument(skip(self, params))]
    pub async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, ApiError> {
        let _timer = metrics::timer_http_request(endpoint);

        let token = self.session.bearer().await?;
        match self.attempt(endpoint, params, &token).await? {
            Attempt::Done(body) => Ok(body),
            Attempt::Unauthorized => {
                info!("Token rejected, re-authenticating...");
                metrics::inc_unauthorized_retries();
                let token = self.session.reauthenticate(&token).await?;

                match self.attempt(endpoint, params, &token).await? {
                    Attempt::Done(body) => Ok(body),
                    Attempt::Unauthorized => {
                        self.session.invalidate().await;
                        Err(ApiError::Auth(
                            "request still unauthorized after re-authentication".to_string(),
                        ))
                    }
                }
            }
        }
    }

    async fn attempt(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        token: &str,
    ) -> Result<Attempt, ApiError> {
        let url = self.session.credentials().endpoint(endpoint)?;
        let http = self.connection.client()?;
        let start = Instant::now();

        let response = http
            .get(url)
            .query(params)
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        debug!(status = %status, elapsed_ms = start.elapsed().as_millis() as u64, "GET completed");

        if status == StatusCode::UNAUTHORIZED {
            return Ok(Attempt::Unauthorized);
        }

        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = %status, body = %body, "API error");
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map(Attempt::Done)
            .map_err(|e| ApiError::DataFormat(format!("response is not JSON: {}", e)))
    }

    /// Release the connection pool. Safe to call more than once.
    pub fn close(&self) {
        self.connection.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpClient {
        HttpClient::with_credentials(Credentials::new(&server.uri(), "alice", "pw").unwrap())
    }

    async fn mount_token(server: &MockServer, token: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": token})))
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn gets_within_ttl_authenticate_once() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/crypto/symbols"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["BTCUSDT"])))
            .expect(3)
            .mount(&server)
            .await;

        let client = client(&server);
        for _ in 0..3 {
            let body = client.get("/crypto/symbols", &[]).await.unwrap();
            assert_eq!(body, json!(["BTCUSDT"]));
        }
    }

    #[tokio::test]
    async fn passes_query_params() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/crypto/data/BTCUSDT"))
            .and(query_param("limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        client
            .get("/crypto/data/BTCUSDT", &[("limit", "50".to_string())])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unauthorized_triggers_one_reauth_and_one_retry() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", 2).await;
        Mock::given(method("GET"))
            .and(path("/crypto/symbols"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/crypto/symbols"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": ["ETHUSDT"]})))
            .expect(1)
            .mount(&server)
            .await;

        let body = client(&server).get("/crypto/symbols", &[]).await.unwrap();
        assert_eq!(body, json!({"data": ["ETHUSDT"]}));
    }

    #[tokio::test]
    async fn second_unauthorized_is_auth_error_without_third_attempt() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", 2).await;
        Mock::given(method("GET"))
            .and(path("/crypto/symbols"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server).get("/crypto/symbols", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn concurrent_rejections_share_one_reauthentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "old"})))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "new"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/crypto/symbols"))
            .and(header("authorization", "Bearer old"))
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(50)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/crypto/symbols"))
            .and(header("authorization", "Bearer new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["BTCUSDT"])))
            .mount(&server)
            .await;

        let client = client(&server);
        let calls = (0..6).map(|_| client.get("/crypto/symbols", &[]));
        let results = futures::future::join_all(calls).await;

        for result in results {
            assert_eq!(result.unwrap(), json!(["BTCUSDT"]));
        }
    }

    #[tokio::test]
    async fn failed_authentication_skips_the_get() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server).get("/crypto/symbols", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));
    }

    #[tokio::test]
    async fn other_status_is_http_error_with_body() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/crypto/symbols"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).get("/crypto/symbols", &[]).await.unwrap_err();
        match err {
            ApiError::Http { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected HttpError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_data_format_error() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/crypto/symbols"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server).get("/crypto/symbols", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::DataFormat(_)));
    }

    #[tokio::test]
    async fn timeout_is_network_error() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/crypto/symbols"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let connection = Arc::new(LazyConnection::new(ConnectionSettings {
            timeout: Duration::from_millis(200),
            ..ConnectionSettings::default()
        }));
        let credentials = Credentials::new(&server.uri(), "alice", "pw").unwrap();
        let session = Arc::new(AuthSession::new(credentials, connection.clone(), None));
        let client = HttpClient::new(session, connection);

        let err = client.get("/crypto/symbols", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn close_releases_pool() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(!client.connection.is_open());
        client.get("/crypto/symbols", &[]).await.unwrap();
        assert!(client.connection.is_open());
        client.close();
        assert!(!client.connection.is_open());
    }
}
