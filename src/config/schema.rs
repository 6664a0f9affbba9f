//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Tokio worker threads (0 = runtime default).
    pub threads: usize,

    /// Client-facing listener ("node" side).
    pub node: NodeConfig,

    /// Backend targets reached over TLS.
    pub targets: Vec<TargetConfig>,

    /// Client certificate presented to every target.
    pub tls: TlsConfig,

    /// Target selection and relay settings.
    pub balancing: BalancingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Numeric log level section (`{"log": {"logSetLevel": 3}}`).
    pub log: LogConfig,

    /// Monitoring API.
    pub admin: AdminConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,
}

/// Node (client-facing listener) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Listen endpoint (e.g., "0.0.0.0:7000").
    pub listen: String,

    /// Maximum concurrently admitted client connections.
    #[serde(alias = "maxConn")]
    pub max_connections: usize,

    /// Idle read timeout for client connections, in seconds.
    #[serde(alias = "timeout")]
    pub timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:7000".to_string(),
            max_connections: 10_000,
            timeout_secs: 300,
        }
    }
}

/// Backend target configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    /// Target endpoint (e.g., "10.0.0.5:8443").
    pub endpoint: String,

    /// Maximum concurrent pairs routed to this target.
    #[serde(default = "default_target_max_connections", alias = "maxConn")]
    pub max_connections: usize,

    /// Idle read timeout for connections to this target, in seconds.
    #[serde(default = "default_target_timeout_secs", alias = "timeout")]
    pub timeout_secs: u64,

    /// Inactive targets are never selected.
    #[serde(default = "default_active")]
    pub active: bool,
}

impl TargetConfig {
    /// An active target with default limits.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_connections: default_target_max_connections(),
            timeout_secs: default_target_timeout_secs(),
            active: default_active(),
        }
    }
}

fn default_target_max_connections() -> usize {
    1000
}

fn default_target_timeout_secs() -> u64 {
    300
}

fn default_active() -> bool {
    true
}

/// TLS client material (PEM files).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to the client certificate chain.
    #[serde(alias = "tlsCert")]
    pub cert_path: String,

    /// Path to the client private key.
    #[serde(alias = "tlsKey")]
    pub key_path: String,
}

/// Order in which eligible targets are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalancingStrategy {
    /// Lowest `current / max` ratio first.
    #[default]
    LeastLoaded,
    /// Lowest absolute connection count first.
    LeastConnections,
}

/// Target selection and relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BalancingConfig {
    pub strategy: BalancingStrategy,

    /// Bound on TCP connect plus TLS handshake for one dial attempt.
    pub connect_timeout_secs: u64,

    /// Bytes read per relay iteration.
    pub relay_buffer_size: usize,
}

impl Default for BalancingConfig {
    fn default() -> Self {
        Self {
            strategy: BalancingStrategy::default(),
            connect_timeout_secs: 5,
            relay_buffer_size: 32 * 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
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

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Numeric log level, `0` (errors only) through `4` (trace).
///
/// When set it takes precedence over `observability.log_level`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LogConfig {
    #[serde(rename = "logSetLevel", alias = "set_level")]
    pub set_level: Option<u8>,
}

impl LogConfig {
    /// Level name for `set_level`, if one was given.
    pub fn level_name(&self) -> Option<&'static str> {
        self.set_level.map(|level| match level {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        })
    }
}

/// Monitoring API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the monitoring API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Monitoring API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long established pairs may keep relaying after a shutdown signal.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 30,
        }
    }
}
