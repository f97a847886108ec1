//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::client::Credentials;
use crate::delivery::{Backoff, RetryPolicy};

/// Application configuration loaded from environment variables.
#[derive(Clone, Deserialize)]
pub struct Config {
    // === API Credentials ===
    /// Base URL of the depth API (e.g. `https://lob.example.com/api`).
    pub lob_api_base_url: String,

    /// API username posted to the token endpoint.
    pub lob_api_username: String,

    /// API password posted to the token endpoint.
    pub lob_api_password: String,

    // === Token / HTTP ===
    /// Assumed token lifetime when the server declares none. 0 = unknown.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Whole-request timeout in milliseconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,

    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub http_connect_timeout_ms: u64,

    // === Dataset ===
    /// Default `limit` passed to the depth endpoint.
    #[serde(default = "default_depth_limit")]
    pub depth_limit: u32,

    // === Charts ===
    /// Directory that receives transient chart images.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Chart width in pixels.
    #[serde(default = "default_chart_width")]
    pub chart_width: u32,

    /// Chart height in pixels.
    #[serde(default = "default_chart_height")]
    pub chart_height: u32,

    // === Delivery ===
    /// Total send attempts per artifact (first try included).
    #[serde(default = "default_send_attempts")]
    pub send_max_attempts: u32,

    /// Delay between send attempts in milliseconds.
    #[serde(default = "default_send_delay")]
    pub send_retry_delay_ms: u64,

    // === Server Configuration ===
    /// HTTP server port for the `serve` command.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Install the Prometheus recorder in `serve` mode.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("lob_api_base_url", &self.lob_api_base_url)
            .field("lob_api_username", &self.lob_api_username)
            .field("lob_api_password", &"***")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("http_timeout_ms", &self.http_timeout_ms)
            .field("depth_limit", &self.depth_limit)
            .field("artifact_dir", &self.artifact_dir)
            .field("chart_width", &self.chart_width)
            .field("chart_height", &self.chart_height)
            .field("send_max_attempts", &self.send_max_attempts)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

fn default_token_ttl() -> u64 {
    30 * 60
}

fn default_http_timeout() -> u64 {
    10_000
}

fn default_connect_timeout() -> u64 {
    2_000
}

fn default_depth_limit() -> u32 {
    1000
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("/tmp/images")
}

fn default_chart_width() -> u32 {
    500
}

fn default_chart_height() -> u32 {
    900
}

fn default_send_attempts() -> u32 {
    2
}

fn default_send_delay() -> u64 {
    5_000
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Filter directive used when verbose logging is on.
pub const VERBOSE_DIRECTIVE: &str = "lob_depth=debug,info";

/// Logging settings. Loaded on their own so the subscriber can be set up
/// before credentials are known to be present.
#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// Filter directive (trace, debug, info, warn, error or a full
    /// `EnvFilter` expression).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            rust_log: default_log_level(),
            verbose: false,
        }
    }
}

impl LogSettings {
    /// Load `RUST_LOG` and `VERBOSE`, reading .env file first. Unparsable
    /// values fall back to the defaults.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        envy::from_env().unwrap_or_default()
    }

    /// Filter directive; `verbose_flag` is the command-line switch.
    pub fn directive(&self, verbose_flag: bool) -> &str {
        if verbose_flag || self.verbose {
            VERBOSE_DIRECTIVE
        } else {
            &self.rust_log
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Build a configuration around explicit credentials, every other
    /// setting at its default.
    pub fn with_credentials(base_url: &str, username: &str, password: &str) -> Self {
        Self {
            lob_api_base_url: base_url.to_string(),
            lob_api_username: username.to_string(),
            lob_api_password: password.to_string(),
            token_ttl_secs: default_token_ttl(),
            http_timeout_ms: default_http_timeout(),
            http_connect_timeout_ms: default_connect_timeout(),
            depth_limit: default_depth_limit(),
            artifact_dir: default_artifact_dir(),
            chart_width: default_chart_width(),
            chart_height: default_chart_height(),
            send_max_attempts: default_send_attempts(),
            send_retry_delay_ms: default_send_delay(),
            port: default_port(),
            metrics_enabled: true,
        }
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.lob_api_base_url.trim().is_empty() {
            return Err("LOB_API_BASE_URL is required".to_string());
        }

        if let Err(e) = Url::parse(&self.lob_api_base_url) {
            return Err(format!("LOB_API_BASE_URL is not a valid URL: {}", e));
        }

        if self.lob_api_username.is_empty() || self.lob_api_password.is_empty() {
            return Err("LOB_API_USERNAME and LOB_API_PASSWORD are required".to_string());
        }

        if self.chart_width == 0 || self.chart_height == 0 {
            return Err("CHART_WIDTH and CHART_HEIGHT must be positive".to_string());
        }

        if self.send_max_attempts == 0 {
            return Err("SEND_MAX_ATTEMPTS must be at least 1".to_string());
        }

        Ok(())
    }

    /// Credentials for the token endpoint.
    pub fn credentials(&self) -> Result<Credentials, url::ParseError> {
        Credentials::new(
            &self.lob_api_base_url,
            &self.lob_api_username,
            &self.lob_api_password,
        )
    }

    /// Token lifetime assumed when the server does not declare one.
    pub fn token_ttl(&self) -> Option<Duration> {
        (self.token_ttl_secs > 0).then(|| Duration::from_secs(self.token_ttl_secs))
    }

    /// Request timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.http_connect_timeout_ms)
    }

    /// Retry policy for artifact sends.
    pub fn send_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.send_max_attempts,
            Backoff::Fixed {
                delay: Duration::from_millis(self.send_retry_delay_ms),
            },
        )
    }
}
