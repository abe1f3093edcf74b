//! Logging initialisation for the runtime
//!
//! Call one of the initialisers early, before services are registered.
//! Embedders that install their own `tracing` subscriber can skip this
//! module entirely.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// How much the runtime should log, and where
#[derive(Debug, Clone, Copy)]
pub enum LogMode {
    /// No output at all
    Silent,
    /// Compact stderr output for development
    Development,
    /// Verbose output with source locations
    Debug,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize tracing subscriber: {0}")]
    TracingInit(String),
}

/// Initialise logging with the given mode
///
/// # Environment Variables
///
/// - `KEEL_LOG_LEVEL`: override the log level (error, warn, info, debug, trace)
/// - `RUST_LOG`: standard fallback filter
pub fn init(mode: LogMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LogMode::Silent => Ok(()),
        LogMode::Development => {
            let subscriber = Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_file(false)
                        .with_line_number(false)
                        .compact(),
                )
                .with(env_filter("info"));

            subscriber
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LogMode::Debug => {
            let subscriber = Registry::default()
                .with(
                    fmt::layer()
                        .pretty()
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(env_filter("debug"));

            subscriber
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Initialise logging from `KEEL_LOG_MODE`
///
/// Accepts "silent", "development" and "debug"; anything else (including an
/// unset variable) means silent.
pub fn init_from_env() -> Result<(), LoggingError> {
    let mode = match std::env::var("KEEL_LOG_MODE").as_deref() {
        Ok("development") => LogMode::Development,
        Ok("debug") => LogMode::Debug,
        _ => LogMode::Silent,
    };
    init(mode)
}

/// Whether a global subscriber is already installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

fn env_filter(default_level: &str) -> EnvFilter {
    if let Ok(level) = std::env::var("KEEL_LOG_LEVEL") {
        EnvFilter::new(level)
    } else if let Ok(rust_log) = std::env::var("RUST_LOG") {
        EnvFilter::new(rust_log)
    } else {
        EnvFilter::new(default_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_mode_never_fails() {
        assert!(init(LogMode::Silent).is_ok());
    }
}
