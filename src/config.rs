//! Configuration management
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Every section is optional; a missing file means running with defaults.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming the push gateway host, overriding `exporter.push_url`
pub const PUSH_HOST_ENV: &str = "PUSHGATEWAY_HOST_IP";

/// Port used when the push gateway is addressed through [`PUSH_HOST_ENV`]
pub const DEFAULT_PUSH_PORT: u16 = 9091;

const MAX_SHUTDOWN_TIMEOUT_SECONDS: u64 = 300;
const MAX_PUSH_INTERVAL_SECONDS: u64 = 3600;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub exporter: ExporterConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long in-flight requests may run after a shutdown signal
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// Socket address to listen on
    ///
    /// Falls back to all interfaces if `host` is not an IP address.
    pub fn socket_addr(&self) -> SocketAddr {
        let ip = self.host.parse::<IpAddr>().unwrap_or_else(|_| {
            tracing::warn!(
                host = %self.host,
                "Server host is not an IP address, listening on all interfaces"
            );
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });
        SocketAddr::new(ip, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Push exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Base URL of the push gateway
    #[serde(default = "default_push_url")]
    pub push_url: String,
    /// Job name metrics are grouped under
    #[serde(default = "default_job")]
    pub job: String,
    /// Value of the `env` label attached to every metric
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            push_url: default_push_url(),
            job: default_job(),
            env: default_env(),
            interval_seconds: default_interval(),
        }
    }
}

impl ExporterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Push gateway base URL, honouring the [`PUSH_HOST_ENV`] override
    pub fn resolved_push_url(&self) -> String {
        self.push_url_with_host(std::env::var(PUSH_HOST_ENV).ok().as_deref())
    }

    /// Push gateway base URL given an optional host override
    pub fn push_url_with_host(&self, host: Option<&str>) -> String {
        match host.map(str::trim).filter(|h| !h.is_empty()) {
            Some(host) => format!("http://{}:{}", host, DEFAULT_PUSH_PORT),
            None => self.push_url.trim_end_matches('/').to_string(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_push_url() -> String {
    format!("http://localhost:{}", DEFAULT_PUSH_PORT)
}

fn default_job() -> String {
    "otel-example".to_string()
}

fn default_env() -> String {
    "local".to_string()
}

fn default_interval() -> u64 {
    10
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            crate::error::AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self = toml::from_str(&content).map_err(|source| {
            crate::error::AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| crate::error::AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Load configuration from `path`, or use defaults if the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> crate::error::AppResult<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()`, but can also be called
    /// explicitly when constructing Config via other means (e.g., in tests).
    pub fn validate(&self) -> crate::error::AppResult<()> {
        use crate::error::AppError;

        if self.server.host.parse::<IpAddr>().is_err() {
            return Err(AppError::Config(format!(
                "server.host must be an IP address, got '{}'",
                self.server.host
            )));
        }

        let shutdown = self.server.shutdown_timeout_seconds;
        if shutdown == 0 || shutdown > MAX_SHUTDOWN_TIMEOUT_SECONDS {
            return Err(AppError::Config(format!(
                "server.shutdown_timeout_seconds must be in 1..={}, got {}",
                MAX_SHUTDOWN_TIMEOUT_SECONDS, shutdown
            )));
        }

        let exporter = &self.exporter;
        if !(exporter.push_url.starts_with("http://") || exporter.push_url.starts_with("https://"))
        {
            return Err(AppError::Config(format!(
                "exporter.push_url must start with http:// or https://, got '{}'",
                exporter.push_url
            )));
        }

        if exporter.job.trim().is_empty() || exporter.job.contains('/') {
            return Err(AppError::Config(format!(
                "exporter.job must be non-empty and must not contain '/', got '{}'",
                exporter.job
            )));
        }

        if exporter.env.trim().is_empty() {
            return Err(AppError::Config(
                "exporter.env must not be empty".to_string(),
            ));
        }

        let interval = exporter.interval_seconds;
        if interval == 0 || interval > MAX_PUSH_INTERVAL_SECONDS {
            return Err(AppError::Config(format!(
                "exporter.interval_seconds must be in 1..={}, got {}",
                MAX_PUSH_INTERVAL_SECONDS, interval
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = crate::error::AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(toml_str).map_err(|source| {
            crate::error::AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            }
        })?;

        // Validate config before returning
        config.validate()?;
        Ok(config)
    }
}
