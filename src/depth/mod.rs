//! Depth snapshot datasets.
//!
//! This module handles:
//! - Dataset types (records, bands, columns)
//! - Symbol validation
//! - Timestamp parsing and record normalization
//! - Fetching symbol lists and depth records over [`crate::client::HttpClient`]

pub mod fetch;
pub mod normalize;
pub mod symbol;
pub mod timestamp;
pub mod types;

pub use fetch::DepthDataset;
pub use normalize::normalize;
pub use symbol::Symbol;
pub use types::{Band, Column, Dataset, DepthRecord};
