//! End-to-end tests against a mock depth API.
//!
//! Run with: cargo test --test integration

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use lob_depth::bot::{ConversationId, ConversationState, Dispatcher, SessionStore};
use lob_depth::chart::{ArtifactStore, ChartRenderer, Variant};
use lob_depth::client::HttpClient;
use lob_depth::config::Config;
use lob_depth::delivery::{deliver_artifact, Backoff, DirectorySink, RecordingSink, RetryPolicy};
use lob_depth::depth::{Band, Column, DepthDataset};
use lob_depth::error::ApiError;

fn depth_rows() -> Value {
    let mut rows = Vec::new();
    for (i, event_time) in [
        json!("2024-01-01T00:02:00"),
        json!(1704067200),
        json!("2024-01-01 00:01:00.500"),
    ]
    .into_iter()
    .enumerate()
    {
        let mut row = json!({
            "symbol": "BTCUSDT",
            "event_time": event_time,
            "best_bid": format!("{}", 100 + i),
            "best_ask": 101 + i,
            "min_bid": 90,
            "max_ask": 110
        });
        for pct in [1, 3, 5, 8] {
            row[format!("depth_{}pct_bid", pct)] = json!(10.0 * pct as f64);
            row[format!("depth_{}pct_ask", pct)] = json!(5.0 * pct as f64);
        }
        rows.push(row);
    }
    Value::Array(rows)
}

async fn mount_upstream(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok-1"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crypto/symbols"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": ["BTCUSDT", "ETHUSDT"]})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crypto/data/BTCUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(depth_rows()))
        .mount(server)
        .await;
}

fn client_for(server: &MockServer) -> Arc<HttpClient> {
    let config = Config::with_credentials(&server.uri(), "user", "secret");
    Arc::new(HttpClient::from_config(&config).unwrap())
}

fn instant_retry() -> RetryPolicy {
    RetryPolicy::new(2, Backoff::Fixed { delay: Duration::ZERO })
}

#[tokio::test]
async fn fetch_render_deliver_pipeline() {
    let server = MockServer::start().await;
    mount_upstream(&server).await;
    let client = client_for(&server);
    let datasets = DepthDataset::new(client.clone());

    let dataset = datasets.fetch_depth("BTCUSDT", 1000).await.unwrap();
    assert_eq!(dataset.len(), 3);
    assert_eq!(
        dataset.series(Column::BestBid),
        vec![Some(101.0), Some(102.0), Some(100.0)]
    );

    let artifacts = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let renderer = ChartRenderer::new(ArtifactStore::new(artifacts.path()), 250, 450);
    let sink = DirectorySink::new(out.path());
    let conversation = ConversationId::from(1);

    for band in Band::all() {
        let artifact = renderer.render(&dataset, band, Variant::Ratio).unwrap();
        deliver_artifact(&sink, &conversation, artifact, &instant_retry())
            .await
            .unwrap();
    }

    assert_eq!(std::fs::read_dir(artifacts.path()).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 4);
    client.close();
}

/// Rejects the first request, serves the rest.
struct RejectFirst {
    calls: std::sync::atomic::AtomicU32,
}

impl Respond for RejectFirst {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
            ResponseTemplate::new(401)
        } else {
            ResponseTemplate::new(200).set_body_json(json!(["BTCUSDT"]))
        }
    }
}

#[tokio::test]
async fn unauthorized_response_triggers_reauthentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crypto/symbols"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(RejectFirst {
            calls: Default::default(),
        })
        .expect(2)
        .mount(&server)
        .await;

    let datasets = DepthDataset::new(client_for(&server));
    assert_eq!(datasets.fetch_symbols().await, vec!["BTCUSDT"]);
}

#[tokio::test]
async fn persistent_rejection_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crypto/data/BTCUSDT"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(401))
        .expect(4)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .get("/crypto/data/BTCUSDT", &[("limit", "5".to_string())])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Auth(_)));
    assert!(DepthDataset::new(client).fetch_depth("BTCUSDT", 5).await.is_none());
}

#[tokio::test]
async fn dispatcher_conversation_end_to_end() {
    let server = MockServer::start().await;
    mount_upstream(&server).await;

    let artifacts = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::failing_images(1));
    let sessions = Arc::new(SessionStore::new());
    let dispatcher = Dispatcher::new(
        DepthDataset::new(client_for(&server)),
        ChartRenderer::new(ArtifactStore::new(artifacts.path()), 200, 360),
        sink.clone(),
        sessions.clone(),
    )
    .with_policy(instant_retry())
    .with_send_interval(Duration::ZERO);
    let conversation = ConversationId::from("chat-9");

    dispatcher.handle(&conversation, "/depth_diff").await.unwrap();
    assert_eq!(
        sessions.get(&conversation),
        ConversationState::AwaitingTicker {
            variant: Variant::Differential
        }
    );
    dispatcher.handle(&conversation, " BTCUSDT ").await.unwrap();

    assert_eq!(sink.texts(), vec!["Input ticker", "Len:3"]);
    assert_eq!(
        sink.captions(),
        vec![
            "Depth (1% diff % Bids-Asks)",
            "Depth (3% diff % Bids-Asks)",
            "Depth (5% diff % Bids-Asks)",
            "Depth (8% diff % Bids-Asks)",
        ]
    );
    // one failed send was retried
    assert_eq!(sink.image_attempts(), 5);
    assert_eq!(sessions.get(&conversation), ConversationState::Idle);
    assert_eq!(std::fs::read_dir(artifacts.path()).unwrap().count(), 0);
}
