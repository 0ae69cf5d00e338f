//! CLI configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (SOCIALWIRE_*)
//! - TOML configuration file
//! - Command line flags, applied on top in `main`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use socialwire_client::{ClientConfig, ReconnectPolicy};
use socialwire_core::DEFAULT_QUEUE_CAPACITY;
use socialwire_protocol::MAX_FRAME_SIZE;
use socialwire_transport::{Endpoint, WebSocketConfig, EVENTS_PATH};
use std::path::Path;
use std::time::Duration;

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Page origin the event socket lives on, e.g. `https://social.example.com`.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path of the event socket on the origin.
    #[serde(default = "default_path")]
    pub path: String,

    /// Session cookie sent with the handshake, as `name=value`.
    #[serde(default = "default_session_cookie")]
    pub session_cookie: Option<String>,

    /// Reconnect schedule.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Reconnect schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_ms: u64,

    /// Upper bound on any retry delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_ms: u64,

    /// Factor applied after every failed attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum requests held while disconnected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Give up on a request after this many milliseconds without a reply.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    /// Limit on connect plus handshake in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_origin() -> String {
    std::env::var("SOCIALWIRE_ORIGIN").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
}

fn default_path() -> String {
    EVENTS_PATH.to_string()
}

fn default_session_cookie() -> Option<String> {
    std::env::var("SOCIALWIRE_SESSION").ok().filter(|s| !s.is_empty())
}

fn default_initial_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_multiplier() -> u32 {
    2
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_max_message_size() -> usize {
    MAX_FRAME_SIZE
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_metrics_port() -> u16 {
    std::env::var("SOCIALWIRE_METRICS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9090)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            path: default_path(),
            session_cookie: default_session_cookie(),
            reconnect: ReconnectConfig::default(),
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_initial_delay(),
            max_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_message_size: default_max_message_size(),
            request_timeout_ms: None,
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first file found, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "socialwire.toml",
            "/etc/socialwire/socialwire.toml",
            "~/.config/socialwire/socialwire.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// The event socket URL for the configured origin.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin is not an http(s) or ws(s) URL.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::for_origin_with_path(&self.origin, &self.path)
            .with_context(|| format!("Invalid origin: {}", self.origin))
    }

    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            queue_capacity: self.limits.queue_capacity,
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_millis(self.reconnect.initial_ms),
                max_delay: Duration::from_millis(self.reconnect.max_ms),
                multiplier: self.reconnect.multiplier,
            },
            request_timeout: self.limits.request_timeout_ms.map(Duration::from_millis),
            ..ClientConfig::default()
        }
    }

    #[must_use]
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            max_message_size: self.limits.max_message_size,
            session_cookie: self.session_cookie.clone(),
            connect_timeout: Duration::from_millis(self.limits.connect_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialwire_client::{Backoff, MIN_RECONNECT_DELAY};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.path, "/events");
        assert_eq!(config.reconnect.initial_ms, 1_000);
        assert_eq!(config.reconnect.max_ms, 30_000);
        assert_eq!(config.limits.queue_capacity, 1024);
        assert!(config.limits.request_timeout_ms.is_none());
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml(
            r#"
            origin = "https://social.example.com"
            session_cookie = "sid=abc"

            [reconnect]
            initial_ms = 250

            [limits]
            request_timeout_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.origin, "https://social.example.com");
        assert_eq!(config.session_cookie.as_deref(), Some("sid=abc"));
        assert_eq!(config.reconnect.initial_ms, 250);
        assert_eq!(config.reconnect.max_ms, 30_000);
        assert_eq!(config.limits.request_timeout_ms, Some(5000));
    }

    #[test]
    fn test_endpoint_from_origin() {
        let config = Config {
            origin: "https://social.example.com/feed".to_string(),
            ..Config::default()
        };
        assert_eq!(config.endpoint().unwrap().url(), "wss://social.example.com/events");

        let config = Config {
            origin: "ftp://social.example.com".to_string(),
            ..Config::default()
        };
        assert!(config.endpoint().is_err());
    }

    #[test]
    fn test_client_config() {
        let mut config = Config::default();
        config.reconnect.multiplier = 3;
        config.limits.queue_capacity = 8;
        config.limits.request_timeout_ms = Some(1500);

        let client = config.client_config();
        assert_eq!(client.queue_capacity, 8);
        assert_eq!(client.reconnect.multiplier, 3);
        assert_eq!(client.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(client.request_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_zero_reconnect_delay_is_floored() {
        let config = Config::from_toml("[reconnect]\ninitial_ms = 0\n").unwrap();
        let mut backoff = Backoff::new(config.client_config().reconnect);
        assert_eq!(backoff.next_delay(), MIN_RECONNECT_DELAY);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/socialwire.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
