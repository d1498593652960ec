//! # Structured Logging
//!
//! Installs the global `tracing` subscriber used by the assistant binary.
//! Library crates that still emit through the `log` facade are captured by
//! `tracing-subscriber`'s log bridge.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

// Flag to track if logging has been initialized
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Keeps the non-blocking file writer flushing for the life of the process
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to set global subscriber: {0}")]
    Subscriber(String),
}

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// The log level to use (trace, debug, info, warn, error)
    pub level: String,
    /// The service name, used as the log file prefix
    pub service_name: String,
    /// Whether to use JSON formatting
    pub json_format: bool,
    /// Directory for daily-rolling log files; `None` logs to stderr only
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "nova".to_string(),
            json_format: false,
            log_dir: None,
        }
    }
}

impl LoggingConfig {
    /// Filter directive built from the configured level. `RUST_LOG` wins when set.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Initializes the structured logging system.
///
/// Calling this more than once is a no-op.
pub fn init_logging(config: LoggingConfig) -> Result<(), LoggingError> {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    // Distinct boxed layers for JSON vs text output
    let console_layer = if config.json_format {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file_layer = config.log_dir.as_ref().map(|log_dir| {
        let file_appender =
            tracing_appender::rolling::daily(log_dir, format!("{}.log", config.service_name));
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = FILE_GUARD.set(guard);

        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .boxed()
    });

    let result = Registry::default()
        .with(config.env_filter())
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(e) = result {
        LOGGING_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(LoggingError::Subscriber(e.to_string()));
    }

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = %config.json_format,
        "Structured logging initialized"
    );

    Ok(())
}
