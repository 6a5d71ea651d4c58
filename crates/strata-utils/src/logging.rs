//! # Logging Utilities
//!
//! Logging bootstrap for Strata on `tracing`.
//!
//! A debugger host usually owns the terminal: the inferior's output and the
//! user's prompt share it, so diagnostics must be filterable, structured,
//! and redirectable to a file without touching the code that emits them.
//! This module provides:
//! - Pretty console output for development, JSON for machine consumption
//! - Environment variable configuration
//! - An optional file appender alongside or instead of the console
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata_utils::init_logging;
//!
//! // Initialize with default settings (reads from RUST_LOG env var)
//! init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("session starting");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: log level filter (e.g. `RUST_LOG=debug`, `RUST_LOG=strata_core=trace`)
//! - `STRATA_LOG_FORMAT`: output format (`json` or `pretty`, default: `pretty`)
//! - `STRATA_LOG_FILE`: optional path to a log file written alongside the console

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io, mem};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default for development)
    Pretty,
    /// JSON format (default for production)
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" => Ok(LogFormat::Pretty),
            "json" | "prod" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Initialize logging with default settings
///
/// Reads configuration from environment variables:
/// - `RUST_LOG`: log level filter (e.g. `debug`, `strata_core=trace`)
/// - `STRATA_LOG_FORMAT`: output format (`json` or `pretty`, default: `pretty`)
/// - `STRATA_LOG_FILE`: optional path to a log file
///
/// ## Errors
///
/// Returns an error if logging was already initialized.
pub fn init_logging() -> Result<(), LoggingError>
{
    // Read format from environment or default to pretty
    let format = env::var("STRATA_LOG_FORMAT")
        .ok()
        .and_then(|s| LogFormat::from_str(&s).ok())
        .unwrap_or(LogFormat::Pretty);

    // Read log level from RUST_LOG or default to INFO
    let default_level = env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse::<LogLevel>()
        .map(Into::into)
        .unwrap_or(Level::INFO);

    init_logging_internal(format, default_level)
}

/// Initialize logging with explicit level and format
///
/// ## Example
///
/// ```rust,no_run
/// use strata_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// init_logging_with_level(LogLevel::Debug, LogFormat::Pretty)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if logging was already initialized.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    init_logging_internal(format, level.into())
}

/// Initialize file-only logging for hosts that own the terminal
///
/// A host whose console carries the debugging conversation (prompts,
/// inferior output) cannot have log lines interleaved with it. This variant
/// writes to `~/.strata/YYYY-MM-DD-strata.log`, falling back to `/tmp` when
/// no home directory is available, and leaves stdout untouched. Returns the
/// path it chose.
///
/// `level` overrides `RUST_LOG`; when `None`, `RUST_LOG` applies and the
/// default is `INFO`.
///
/// ## Errors
///
/// Returns an error if logging was already initialized or the log directory
/// cannot be created.
pub fn init_logging_to_file(level: Option<LogLevel>) -> Result<PathBuf, LoggingError>
{
    let today = Utc::now().format("%Y-%m-%d");
    let log_file = if let Ok(home) = env::var("HOME") {
        let strata_dir = PathBuf::from(home).join(".strata");
        std::fs::create_dir_all(&strata_dir).map_err(LoggingError::FileError)?;
        strata_dir.join(format!("{today}-strata.log"))
    } else {
        PathBuf::from("/tmp").join(format!("{today}-strata.log"))
    };

    init_logging_file_only(&log_file, LogFormat::Pretty, level.map(Into::into))?;
    Ok(log_file)
}

fn init_logging_internal(format: LogFormat, default_level: Level) -> Result<(), LoggingError>
{
    // RUST_LOG can override the default level with more specific filters
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let log_file = env::var("STRATA_LOG_FILE").ok().map(PathBuf::from);

    match format {
        LogFormat::Pretty => {
            let console_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_writer(io::stdout)
                .with_filter(env_filter.clone());

            if let Some(path) = log_file {
                let file_layer = fmt::layer()
                    .with_writer(daily_writer(&path))
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false) // No ANSI in files
                    .with_filter(env_filter);
                finish(Registry::default().with(console_layer).with(file_layer))
            } else {
                finish(Registry::default().with(console_layer))
            }
        }
        LogFormat::Json => {
            let console_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(io::stdout)
                .with_filter(env_filter.clone());

            if let Some(path) = log_file {
                let file_layer = fmt::layer()
                    .json()
                    .with_writer(daily_writer(&path))
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_filter(env_filter);
                finish(Registry::default().with(console_layer).with(file_layer))
            } else {
                finish(Registry::default().with(console_layer))
            }
        }
    }
}

fn init_logging_file_only(log_file: &Path, format: LogFormat, explicit_level: Option<Level>) -> Result<(), LoggingError>
{
    // Filter priority: an explicit level from the caller, then RUST_LOG
    // (which may carry module-specific filters), then INFO.
    let env_filter = if let Some(level) = explicit_level {
        EnvFilter::new(level.to_string())
    } else if let Ok(rust_log) = env::var("RUST_LOG") {
        EnvFilter::try_new(&rust_log).unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
    } else {
        EnvFilter::new(Level::INFO.to_string())
    };

    // rolling::never, the date is already in the file name
    let writer = keep_alive(tracing_appender::non_blocking(tracing_appender::rolling::never(
        log_file.parent().unwrap_or(Path::new(".")),
        log_file.file_name().unwrap_or_default(),
    )));

    match format {
        LogFormat::Pretty => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false)
                .with_filter(env_filter);
            finish(Registry::default().with(file_layer))
        }
        LogFormat::Json => {
            let file_layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(true)
                .with_filter(env_filter);
            finish(Registry::default().with(file_layer))
        }
    }
}

fn daily_writer(path: &Path) -> NonBlocking
{
    keep_alive(tracing_appender::non_blocking(tracing_appender::rolling::daily(
        path.parent().unwrap_or(Path::new(".")),
        path.file_name().unwrap_or_default(),
    )))
}

/// The appender's worker thread stops when its guard drops. Logging lives
/// for the whole process, so the guard is leaked on purpose.
fn keep_alive((writer, guard): (NonBlocking, WorkerGuard)) -> NonBlocking
{
    mem::forget(guard);
    writer
}

fn finish(subscriber: impl SubscriberInitExt) -> Result<(), LoggingError>
{
    subscriber
        .try_init()
        .map_err(|error| LoggingError::InitializationFailed(error.to_string()))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("unknown log format {0:?}; use \"pretty\" or \"json\"")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("unknown log level {0:?}; use \"error\", \"warn\", \"info\", \"debug\", or \"trace\"")]
    InvalidLevel(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
