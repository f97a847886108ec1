//! Unified error types for the depth chart service.

use std::path::PathBuf;

use thiserror::Error;

use crate::depth::Column;

/// Unified error type for the depth chart service.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration loaded but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Upstream API error.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Dataset fetch or normalization error.
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Chart rendering error.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Artifact delivery error.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the authenticated HTTP client.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Bad credentials, failed token request or failed refresh.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure (timeout, connection reset, TLS).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx, non-401 response.
    #[error("http {status}: {body}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Response body was not the JSON we expected.
    #[error("unexpected payload: {0}")]
    DataFormat(String),

    /// Endpoint could not be joined onto the base URL.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors raised while fetching and normalizing a depth dataset.
///
/// These never leave [`crate::depth::DepthDataset`]'s public fetch methods;
/// they are logged and turned into "no data".
#[derive(Error, Debug)]
pub enum DatasetError {
    /// HTTP layer failure.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Upstream answered with an `{"error": ...}` payload.
    #[error("upstream reported an error: {0}")]
    Upstream(String),

    /// Payload was neither an array nor an object with a `data` array.
    #[error("unrecognized payload shape: {0}")]
    DataFormat(String),

    /// Payload was well formed but held no usable records.
    #[error("dataset is empty")]
    Empty,

    /// Symbol failed validation before any request was made.
    #[error("invalid symbol {0:?}")]
    InvalidSymbol(String),
}

/// Errors raised by the chart renderer.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Dataset has no records.
    #[error("dataset is empty")]
    EmptyDataset,

    /// Dataset lacks a column the requested chart needs.
    #[error("dataset has no `{0}` column")]
    MissingColumn(Column),

    /// Depth band outside 1/3/5/8.
    #[error("unsupported depth band {0}%, expected one of 1, 3, 5, 8")]
    UnsupportedBand(u8),

    /// Chart variant outside 0/1/2.
    #[error("unsupported chart variant {0}, expected one of 0, 1, 2")]
    UnsupportedVariant(u8),

    /// Drawing backend failure.
    #[error("drawing failed: {0}")]
    Drawing(String),

    /// Artifact file could not be allocated.
    #[error("artifact io: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking render worker panicked or was cancelled.
    #[error("render task failed: {0}")]
    Task(String),
}

/// Errors raised while handing an artifact to the transmission collaborator.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Sink rejected or failed to transmit the message.
    #[error("send failed: {0}")]
    Send(String),

    /// Artifact file vanished before it could be sent.
    #[error("artifact {0} not found")]
    MissingArtifact(PathBuf),

    /// IO error while sending.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;
