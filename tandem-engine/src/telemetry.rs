//! Tracing initialization
//!
//! Structured logs go through `tracing`; this module installs the global
//! subscriber. Filtering follows `RUST_LOG` and the output format follows
//! `TANDEM_LOG_FORMAT` (`json` or `pretty`).

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tandem_core::{ConfigError, TandemError, TandemResult};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            _ => Err(ConfigError::InvalidValue {
                field: "log_format".to_string(),
                value: s.to_string(),
                reason: "expected json or pretty".to_string(),
            }),
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: std::env::var("TANDEM_LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(LogFormat::Json),
            default_filter: "tandem=info,info".to_string(),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> TandemResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let (json_layer, pretty_layer) = match config.log_format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer().pretty())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| {
            TandemError::Config(ConfigError::InvalidValue {
                field: "tracing_subscriber".to_string(),
                value: format!("{:?}", config.log_format),
                reason: format!("Failed to init subscriber: {}", e),
            })
        })?;

    tracing::info!(log_format = ?config.log_format, "Telemetry initialized");
    Ok(())
}
