//! Authenticated HTTP access to the depth API.
//!
//! This module handles:
//! - Credentials and bearer token lifecycle ([`AuthSession`])
//! - A lazily opened, explicitly closed connection pool
//! - Authenticated GETs with one-shot re-authentication on 401 ([`HttpClient`])

pub mod connection;
pub mod http;
pub mod session;

pub use connection::{ConnectionSettings, LazyConnection};
pub use http::HttpClient;
pub use session::{AuthSession, Credentials, Token};
