use tracing::info;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, TelemetryConfig};

/// HTTP client internals that log every connection at `info` and below.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "h2"];

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("log filter '{directives}' is invalid: {source}")]
    Filter {
        directives: String,
        source: ParseError,
    },
    #[error("could not install the log subscriber: {0}")]
    Install(Box<dyn std::error::Error + Send + Sync>),
}

/// Directives for a configured level. A bare level also quiets the HTTP
/// client crates; anything with explicit targets is used as given.
pub fn directives(log_level: &str) -> String {
    let level = log_level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let mut directives = level.to_string();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    directives
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives = directives(&config.log_level);
            EnvFilter::try_new(&directives)
                .map_err(|source| TelemetryError::Filter { directives, source })?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(TelemetryError::Install)
}

/// One line describing where this process talks to and how often it polls.
pub fn log_startup(config: &AppConfig) {
    let sourcing = &config.sourcing;
    info!(
        environment = ?config.environment,
        sourcing_url = %sourcing.base_url,
        resume_proxy_url = %sourcing.resume_proxy_url,
        poll_interval_secs = sourcing.poll_interval.as_secs(),
        request_timeout_secs = sourcing.request_timeout.as_secs(),
        "talent pipeline configured"
    );
}
