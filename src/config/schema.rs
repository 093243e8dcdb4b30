//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the API server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the API server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ApiConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Base path of the API routes.
    pub api: ApiPathConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Streaming session settings.
    pub stream: StreamConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Request limits.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiPathConfig {
    /// Group all reflected routes under this path.
    pub base_path: String,

    /// Serve the route catalog at `<base_path>/routes`.
    pub catalog: bool,
}

impl Default for ApiPathConfig {
    fn default() -> Self {
        Self {
            base_path: "/v1".to_string(),
            catalog: true,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Non-stream request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Streaming session configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    /// Hard lifetime of a stream session in seconds.
    pub timeout_secs: u64,

    /// Interval between websocket pings.
    pub ping_period_ms: u64,

    /// How long to wait for a pong after a ping.
    pub pong_wait_ms: u64,

    /// Websocket handshake budget.
    pub handshake_timeout_ms: u64,

    pub read_buffer_size: usize,

    pub write_buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            ping_period_ms: 4_500,
            pong_wait_ms: 5_000,
            handshake_timeout_ms: 5_000,
            read_buffer_size: 4_096,
            write_buffer_size: 4_096,
        }
    }
}

impl StreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable per-client rate limiting.
    pub enabled: bool,

    /// Sustained requests per second per client IP.
    pub requests_per_second: u32,

    /// Burst allowance.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 100,
            burst_size: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ApiConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.stream, StreamConfig::default());
        assert_eq!(config.stream.timeout(), Duration::from_secs(600));
        assert_eq!(config.stream.ping_period(), Duration::from_millis(4_500));
        assert_eq!(config.api.base_path, "/v1");
    }

    #[test]
    fn test_partial_section() {
        let config: ApiConfig = toml::from_str(
            r#"
            [stream]
            pong_wait_ms = 100

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.stream.pong_wait_ms, 100);
        assert_eq!(config.stream.ping_period_ms, 4_500);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
