//! Logging setup for the artifact runner.
//!
//! Every crate in the workspace logs through `tracing`; this module installs
//! the subscriber that decides where those events go.

use clap::ValueEnum;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Environment variable overriding the log level.
pub const LOG_LEVEL_ENV: &str = "FIWARE_LOG_LEVEL";
/// Environment variable narrowing output to one target, e.g. `subscription_manager`.
pub const LOG_TARGET_ENV: &str = "FIWARE_LOG_TARGET";

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LoggingMode {
    /// No output
    Silent,
    /// Compact stderr output
    Development,
    /// Verbose stderr diagnostics with source locations
    Debug,
    /// One JSON object per event on stderr, for log shippers
    Json,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid environment variable: {0}")]
    InvalidEnv(String),
}

/// Initialize logging with the specified mode.
///
/// Call once, before the artifacts start. Every mode writes to stderr; stdout
/// is reserved for relayed notifications.
///
/// # Environment Variables
///
/// - `FIWARE_LOG_LEVEL`: override the level (error, warn, info, debug, trace)
/// - `FIWARE_LOG_TARGET`: only show events from this target
///
/// `RUST_LOG` is honoured when `FIWARE_LOG_LEVEL` is unset.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .pretty()
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_writer(std::io::stderr),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Json => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(false)
                        .with_writer(std::io::stderr),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Build the event filter: `FIWARE_LOG_LEVEL`, then `RUST_LOG`, then
/// `default_level`, optionally restricted by `FIWARE_LOG_TARGET`.
fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let level = std::env::var(LOG_LEVEL_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    match std::env::var(LOG_TARGET_ENV) {
        Ok(target) if !target.trim().is_empty() => target_filter(target.trim(), &level),
        _ => Ok(EnvFilter::new(level)),
    }
}

/// Filter that only lets `target` through, at `level`.
fn target_filter(target: &str, level: &str) -> Result<EnvFilter, LoggingError> {
    let directive = format!("{target}={level}")
        .parse()
        .map_err(|e| LoggingError::InvalidEnv(format!("{LOG_TARGET_ENV}={target}: {e}")))?;
    Ok(EnvFilter::new("off").add_directive(directive))
}
