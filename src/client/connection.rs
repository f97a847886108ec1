//! Lazily opened HTTP connection pool.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::ApiError;

/// Settings used when the pool is first opened.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Idle connections kept per host.
    pub pool_max_idle_per_host: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(2),
            pool_max_idle_per_host: 8,
        }
    }
}

/// HTTP connection pool that is opened on first use and released by
/// [`LazyConnection::close`].
///
/// Cloned `reqwest::Client` handles share the pool; closing drops the
/// owner's handle so the pool goes away once in-flight requests finish.
/// A later request reopens it.
#[derive(Debug)]
pub struct LazyConnection {
    settings: ConnectionSettings,
    inner: Mutex<Option<reqwest::Client>>,
}

impl LazyConnection {
    /// Create an unopened connection.
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(None),
        }
    }

    /// Get a handle to the pool, opening it if needed.
    pub fn client(&self) -> Result<reqwest::Client, ApiError> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .timeout(self.settings.timeout)
            .connect_timeout(self.settings.connect_timeout)
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(self.settings.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        debug!("HTTP connection pool opened");
        *guard = Some(client.clone());
        Ok(client)
    }

    /// Whether the pool is currently open.
    pub fn is_open(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Release the pool.
    pub fn close(&self) {
        let previous = self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if previous.is_some() {
            info!("HTTP connection pool closed");
        }
    }
}
