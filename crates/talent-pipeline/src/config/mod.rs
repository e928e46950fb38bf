use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::sourcing::DEFAULT_POLL_INTERVAL;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub sourcing: SourcingServiceConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let sourcing = SourcingServiceConfig {
            base_url: url_var("SOURCING_API_URL", "http://127.0.0.1:8000")?,
            resume_proxy_url: url_var("RESUME_PROXY_URL", "http://127.0.0.1:3001")?,
            poll_interval: seconds_var("SOURCING_POLL_INTERVAL_SECS", 5)?,
            request_timeout: seconds_var("SOURCING_REQUEST_TIMEOUT_SECS", 30)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            sourcing,
        })
    }
}

fn url_var(var: &'static str, default: &str) -> Result<String, ConfigError> {
    let raw = env::var(var).unwrap_or_else(|_| default.to_string());
    parse_service_url(var, &raw)
}

/// Validate an http(s) base URL and strip any trailing slash. `var` names the
/// setting in error messages.
pub fn parse_service_url(var: &'static str, raw: &str) -> Result<String, ConfigError> {
    let parsed = reqwest::Url::parse(raw.trim()).map_err(|err| ConfigError::InvalidUrl {
        var,
        reason: err.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            var,
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}

fn seconds_var(var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let seconds = match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidDuration { var })?,
        Err(_) => default,
    };
    if seconds == 0 {
        return Err(ConfigError::InvalidDuration { var });
    }
    Ok(Duration::from_secs(seconds))
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Endpoints and timing for the external job-processing service.
#[derive(Debug, Clone)]
pub struct SourcingServiceConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Base URL of the proxy that accepts resume uploads.
    pub resume_proxy_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for SourcingServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            resume_proxy_url: "http://127.0.0.1:3001".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidDuration { var: &'static str },
    InvalidUrl { var: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDuration { var } => {
                write!(f, "{var} must be a positive number of seconds")
            }
            ConfigError::InvalidUrl { var, reason } => {
                write!(f, "{var} must be an http(s) URL: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidDuration { .. }
            | ConfigError::InvalidUrl { .. } => None,
        }
    }
}
