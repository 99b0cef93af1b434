//! Structured logging setup with console and file output.
//!
//! Provides daily rotating log files, build-dependent default levels, a
//! console-only fallback when the log directory is unusable, and an override
//! through `STRATA_LOG` or `RUST_LOG`.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::error::StrataError;

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "STRATA_LOG";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether stdout is a terminal; terminals get console output only
    pub is_pty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir, is_pty: atty::is(atty::Stream::Stdout), log_filter: None }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }
}

/// Guard that must be held for as long as logging is wanted.
///
/// Dropping it flushes pending file writes.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// Falls back to console-only output when the log directory cannot be used.
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: LogConfig) -> Result<LoggingGuard, StrataError> {
    if config.is_pty {
        return init_stdout_logging(config.log_filter.as_deref());
    }

    match file_appender(&config) {
        Ok(appender) => init_file_logging(&config, appender),
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {e}. Using console only.");
            init_stdout_logging(config.log_filter.as_deref())
        }
    }
}

/// Initialize with the default log directory.
pub fn init_logging_default() -> Result<LoggingGuard, StrataError> {
    init_logging(LogConfig::new(log_dir()))
}

fn init_stdout_logging(filter: Option<&str>) -> Result<LoggingGuard, StrataError> {
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(filter))
        .with_ansi(true)
        .with_target(false)
        .try_init()
        .map_err(|e| StrataError::internal(format!("Failed to install subscriber: {e}")))?;

    Ok(LoggingGuard { _worker_guard: None })
}

fn file_appender(config: &LogConfig) -> Result<RollingFileAppender, StrataError> {
    std::fs::create_dir_all(&config.log_dir).map_err(|e| {
        StrataError::io(format!("Failed to create {}", config.log_dir.display()), e)
    })?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("strata")
        .filename_suffix("log")
        .build(&config.log_dir)
        .map_err(|e| StrataError::config(format!("Failed to create log appender: {e}")))
}

fn init_file_logging(
    config: &LogConfig,
    appender: RollingFileAppender,
) -> Result<LoggingGuard, StrataError> {
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    // console gets INFO and above, the file gets whatever the filter allows
    let stdout = std::io::stdout.with_max_level(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_writer(stdout.and(non_blocking))
        .with_env_filter(build_env_filter(config.log_filter.as_deref()))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| StrataError::internal(format!("Failed to install subscriber: {e}")))?;

    Ok(LoggingGuard { _worker_guard: Some(guard) })
}

/// Priority: custom filter, then `STRATA_LOG`, then `RUST_LOG`, then the
/// build default.
fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// The default log filter for the build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "debug,strata_core=trace,tokio_postgres=warn,deadpool=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "info,strata_core=info,tokio_postgres=warn,deadpool=warn"
    }
}

/// The default log directory.
pub fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("strata"))
        .unwrap_or_else(|| PathBuf::from("./strata_data"))
        .join("logs")
}
