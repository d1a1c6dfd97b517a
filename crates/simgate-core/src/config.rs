//! Configuration loading and typed config structures for the Simgate
//! backend.
//!
//! The canonical configuration lives in `simgate.yaml` at the deployment
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads and validates the file.
//! Every field has a default, so an empty file (or no file at all) yields
//! a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level backend configuration.
///
/// Mirrors the structure of `simgate.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimgateConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Result cache sizing.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Admission control limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Bounded execution settings.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Push channel settings.
    #[serde(default)]
    pub websocket: WebSocketConfig,

    /// Metrics and request log settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Background cleanup cadence.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimgateConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `SIMGATE_HOST` overrides `server.host`
    /// - `SIMGATE_PORT` overrides `server.port`
    /// - `SIMGATE_LOG_DIR` overrides `monitor.log_dir`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml maps an empty document to unit, not to an empty map.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override selected values with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SIMGATE_HOST") {
            self.server.host = val;
        }
        if let Some(port) = std::env::var("SIMGATE_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
        {
            self.server.port = port;
        }
        if let Ok(val) = std::env::var("SIMGATE_LOG_DIR") {
            self.monitor.log_dir = PathBuf::from(val);
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Use the first `X-Forwarded-For` hop as the client identity.
    ///
    /// Only enable this behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            trust_forwarded_for: false,
        }
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached results.
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,

    /// Seconds a cached result stays valid.
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl CacheConfig {
    /// Time-to-live as a [`Duration`].
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            ttl_seconds: default_cache_ttl_seconds(),
        }
    }
}

/// Admission control configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RateLimitConfig {
    /// Whether REST requests are rate limited at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests per identity per 60 s window.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Requests per identity per 10 s burst window.
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// Requests across all identities per 60 s window.
    #[serde(default = "default_global_limit_per_minute")]
    pub global_limit_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: default_requests_per_minute(),
            burst_size: default_burst_size(),
            global_limit_per_minute: default_global_limit_per_minute(),
        }
    }
}

/// Bounded execution configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutorConfig {
    /// Deadline applied when the caller does not pick one.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Hard ceiling on any requested deadline.
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,

    /// Number of executor instances in the pool.
    #[serde(default = "default_instances")]
    pub instances: usize,

    /// Maximum compute workers alive at once, abandoned ones included.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl ExecutorConfig {
    /// Default deadline as a [`Duration`].
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Deadline ceiling as a [`Duration`].
    pub const fn max_timeout(&self) -> Duration {
        Duration::from_secs(self.max_timeout_seconds)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            max_timeout_seconds: default_max_timeout_seconds(),
            instances: default_instances(),
            max_workers: default_max_workers(),
        }
    }
}

/// Push channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebSocketConfig {
    /// Inbound messages accepted per connection per rolling second.
    #[serde(default = "default_max_messages_per_second")]
    pub max_messages_per_second: u32,

    /// Seconds between server pings.
    #[serde(default = "default_ping_interval_seconds")]
    pub ping_interval_seconds: u64,

    /// Seconds without inbound traffic before a connection is dropped.
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u64,

    /// Outbound frames buffered per connection before it counts as stalled.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl WebSocketConfig {
    /// Ping interval as a [`Duration`].
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_seconds)
    }

    /// Idle timeout as a [`Duration`].
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_messages_per_second: default_max_messages_per_second(),
            ping_interval_seconds: default_ping_interval_seconds(),
            idle_timeout_seconds: default_idle_timeout_seconds(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

/// Metrics and request log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonitorConfig {
    /// Directory holding `requests.log`.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Latency samples retained per endpoint.
    #[serde(default = "default_samples_per_endpoint")]
    pub samples_per_endpoint: usize,

    /// Whether to append every request to the durable log.
    #[serde(default = "default_true")]
    pub request_log: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            samples_per_endpoint: default_samples_per_endpoint(),
            request_log: true,
        }
    }
}

/// Background maintenance configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MaintenanceConfig {
    /// Seconds between cache and rate limiter sweeps.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

impl MaintenanceConfig {
    /// Sweep interval as a [`Duration`].
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG`
    /// is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

const fn default_true() -> bool {
    true
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8000
}

const fn default_cache_max_size() -> usize {
    10_000
}

const fn default_cache_ttl_seconds() -> u64 {
    300
}

const fn default_requests_per_minute() -> u32 {
    1000
}

const fn default_burst_size() -> u32 {
    100
}

const fn default_global_limit_per_minute() -> u32 {
    50_000
}

const fn default_timeout_seconds() -> u64 {
    30
}

const fn default_max_timeout_seconds() -> u64 {
    60
}

const fn default_instances() -> usize {
    1
}

const fn default_max_workers() -> usize {
    8
}

const fn default_max_messages_per_second() -> u32 {
    10
}

const fn default_ping_interval_seconds() -> u64 {
    30
}

const fn default_idle_timeout_seconds() -> u64 {
    60
}

const fn default_outbound_queue() -> usize {
    32
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

const fn default_samples_per_endpoint() -> usize {
    1000
}

const fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_log_level() -> String {
    String::from("info")
}
