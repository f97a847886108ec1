//! Prometheus metrics for latency tracking and monitoring.
//!
//! This module provides metrics for:
//! - Token requests and 401-driven re-authentication
//! - Upstream HTTP request latency
//! - Dataset fetches and dropped records
//! - Chart render latency and failures
//! - Artifact delivery and retries

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram, Label};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

use crate::chart::Variant;

// === Metric Name Constants ===

/// Upstream HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// Chart render latency metric name.
pub const METRIC_RENDER_LATENCY: &str = "chart_render_latency_ms";
/// Token requests counter metric name.
pub const METRIC_AUTH_REQUESTS: &str = "auth_requests_total";
/// Failed token requests counter metric name.
pub const METRIC_AUTH_FAILURES: &str = "auth_failures_total";
/// 401 responses that triggered a re-authentication.
pub const METRIC_UNAUTHORIZED_RETRIES: &str = "unauthorized_retries_total";
/// Dataset fetches counter metric name.
pub const METRIC_DATASET_FETCHES: &str = "dataset_fetches_total";
/// Fetches that produced no dataset.
pub const METRIC_DATASET_ABSENT: &str = "dataset_absent_total";
/// Records dropped during normalization.
pub const METRIC_RECORDS_DROPPED: &str = "records_dropped_total";
/// Failed chart renders counter metric name.
pub const METRIC_RENDER_FAILURES: &str = "chart_render_failures_total";
/// Artifacts handed to a sink.
pub const METRIC_ARTIFACTS_DELIVERED: &str = "artifacts_delivered_total";
/// Send attempts that were retried.
pub const METRIC_DELIVERY_RETRIES: &str = "delivery_retries_total";
/// Artifacts that could not be delivered.
pub const METRIC_DELIVERY_FAILURES: &str = "delivery_failures_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "Upstream HTTP request latency in milliseconds"
    );
    describe_histogram!(
        METRIC_RENDER_LATENCY,
        "Chart render latency in milliseconds"
    );

    describe_counter!(METRIC_AUTH_REQUESTS, "Total number of token requests");
    describe_counter!(METRIC_AUTH_FAILURES, "Total number of failed token requests");
    describe_counter!(
        METRIC_UNAUTHORIZED_RETRIES,
        "Total number of requests retried after a 401"
    );
    describe_counter!(METRIC_DATASET_FETCHES, "Total number of depth dataset fetches");
    describe_counter!(
        METRIC_DATASET_ABSENT,
        "Total number of depth fetches that returned no data"
    );
    describe_counter!(
        METRIC_RECORDS_DROPPED,
        "Total number of depth records dropped for unparsable timestamps"
    );
    describe_counter!(METRIC_RENDER_FAILURES, "Total number of failed chart renders");
    describe_counter!(METRIC_ARTIFACTS_DELIVERED, "Total number of charts delivered");
    describe_counter!(METRIC_DELIVERY_RETRIES, "Total number of retried chart sends");
    describe_counter!(
        METRIC_DELIVERY_FAILURES,
        "Total number of charts that could not be delivered"
    );

    debug!("Metrics initialized");
}

/// Install the global Prometheus recorder and return a handle for rendering
/// the scrape output.
pub fn install_prometheus() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

/// Increment token requests counter.
pub fn inc_auth_requests() {
    counter!(METRIC_AUTH_REQUESTS).increment(1);
}

/// Increment failed token requests counter.
pub fn inc_auth_failures() {
    counter!(METRIC_AUTH_FAILURES).increment(1);
}

/// Increment 401 retry counter.
pub fn inc_unauthorized_retries() {
    counter!(METRIC_UNAUTHORIZED_RETRIES).increment(1);
}

/// Increment dataset fetch counter.
pub fn inc_dataset_fetches() {
    counter!(METRIC_DATASET_FETCHES).increment(1);
}

/// Increment absent dataset counter.
pub fn inc_dataset_absent() {
    counter!(METRIC_DATASET_ABSENT).increment(1);
}

/// Add to the dropped records counter.
pub fn inc_records_dropped(count: u64) {
    counter!(METRIC_RECORDS_DROPPED).increment(count);
}

/// Increment render failure counter.
pub fn inc_render_failures() {
    counter!(METRIC_RENDER_FAILURES).increment(1);
}

/// Increment delivered artifacts counter.
pub fn inc_artifacts_delivered() {
    counter!(METRIC_ARTIFACTS_DELIVERED).increment(1);
}

/// Increment delivery retry counter.
pub fn inc_delivery_retries() {
    counter!(METRIC_DELIVERY_RETRIES).increment(1);
}

/// Increment delivery failure counter.
pub fn inc_delivery_failures() {
    counter!(METRIC_DELIVERY_FAILURES).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
    labels: Vec<Label>,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
            labels: Vec::new(),
        }
    }

    /// Attach a label recorded with the sample.
    pub fn with_label(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.labels.push(Label::new(key, value.into()));
        self
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.elapsed_ms();
        histogram!(self.metric_name, std::mem::take(&mut self.labels)).record(latency_ms);
    }
}

/// Create a latency timer for an upstream request.
pub fn timer_http_request(endpoint: &str) -> LatencyTimer {
    LatencyTimer::new(METRIC_HTTP_REQUEST_LATENCY).with_label("endpoint", endpoint)
}

/// Create a latency timer for a chart render.
pub fn timer_render(variant: Variant) -> LatencyTimer {
    LatencyTimer::new(METRIC_RENDER_LATENCY).with_label("variant", variant.to_string())
}
