//! Fetching symbol lists and depth datasets.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::normalize::normalize;
use super::symbol::Symbol;
use super::types::Dataset;
use crate::client::HttpClient;
use crate::error::DatasetError;
use crate::metrics;

const SYMBOLS_ENDPOINT: &str = "/crypto/symbols";
const DEPTH_ENDPOINT: &str = "/crypto/data";

/// Pulls symbol lists and depth records from the API.
///
/// The public `fetch_*` methods never fail: every error is logged and
/// surfaces as an empty list or `None`. The `try_*` variants expose the
/// typed error for callers that want it.
#[derive(Debug, Clone)]
pub struct DepthDataset {
    client: Arc<HttpClient>,
}

impl DepthDataset {
    /// Create a fetcher over a shared client.
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    /// Shared client.
    pub fn client(&self) -> &Arc<HttpClient> {
        &self.client
    }

    /// Available symbols, in upstream order. Empty on any error.
    pub async fn fetch_symbols(&self) -> Vec<String> {
        match self.try_fetch_symbols().await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(error = %e, "Failed to fetch active symbols");
                Vec::new()
            }
        }
    }

    /// Available symbols, or the reason there are none.
    #[instrument(skip(self))]
    pub async fn try_fetch_symbols(&self) -> Result<Vec<String>, DatasetError> {
        let payload = self.client.get(SYMBOLS_ENDPOINT, &[]).await?;
        let symbols: Vec<String> = extract_rows(&payload)?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        debug!(count = symbols.len(), "Fetched symbols");
        Ok(symbols)
    }

    /// Normalized depth dataset for `symbol`, or `None` when there is no
    /// usable data.
    pub async fn fetch_depth(&self, symbol: &str, limit: u32) -> Option<Dataset> {
        metrics::inc_dataset_fetches();
        match self.try_fetch_depth(symbol, limit).await {
            Ok(dataset) => Some(dataset),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "No depth data");
                metrics::inc_dataset_absent();
                None
            }
        }
    }

    /// Normalized depth dataset for `symbol`, or the reason there is none.
    #[instrument(skip(self))]
    pub async fn try_fetch_depth(&self, symbol: &str, limit: u32) -> Result<Dataset, DatasetError> {
        let symbol = Symbol::parse(symbol)?;
        let endpoint = format!("{}/{}", DEPTH_ENDPOINT, symbol);
        let payload = self
            .client
            .get(&endpoint, &[("limit", limit.to_string())])
            .await?;

        let rows = extract_rows(&payload)?;
        if rows.is_empty() {
            return Err(DatasetError::Empty);
        }

        let dataset = normalize(symbol.as_str(), rows);
        if dataset.is_empty() {
            return Err(DatasetError::Empty);
        }

        info!(symbol = %symbol, records = dataset.len(), "Fetched depth dataset");
        Ok(dataset)
    }
}

/// Accept a bare array or an object with a `data` array.
pub fn extract_rows(payload: &Value) -> Result<&[Value], DatasetError> {
    match payload {
        Value::Array(rows) => Ok(rows.as_slice()),
        Value::Object(object) => {
            if let Some(error) = object.get("error") {
                let message = error
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string());
                return Err(DatasetError::Upstream(message));
            }
            match object.get("data") {
                Some(Value::Array(rows)) => Ok(rows.as_slice()),
                Some(Value::Null) => Err(DatasetError::Empty),
                Some(other) => Err(DatasetError::DataFormat(format!(
                    "`data` is {}, expected an array",
                    json_kind(other)
                ))),
                None => Err(DatasetError::DataFormat(
                    "object without a `data` field".to_string(),
                )),
            }
        }
        Value::Null => Err(DatasetError::Empty),
        other => Err(DatasetError::DataFormat(format!(
            "top-level {}, expected an array or object",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
