//! Limit-order-book depth charts.
//!
//! Pulls order book depth snapshots from an authenticated HTTP API,
//! normalizes them into a time-ordered dataset and renders two-panel
//! depth charts as PNG artifacts for delivery to a user.
//!
//! ```text
//! symbol ──► HttpClient ──► DepthDataset ──► ChartRenderer ──► deliver_artifact
//!            (token, 401)    (normalize)      (1/3/5/8 %)       (retry, delete)
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`client`]: Authenticated HTTP client with token lifecycle
//! - [`depth`]: Symbol lists, depth datasets and normalization
//! - [`chart`]: Chart variants, artifacts and rendering
//! - [`delivery`]: Message sinks and send retry
//! - [`bot`]: Conversational command dispatcher
//! - [`api`]: HTTP API for health, metrics, data and charts
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod bot;
pub mod chart;
pub mod client;
pub mod config;
pub mod delivery;
pub mod depth;
pub mod error;
pub mod metrics;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
