//! # Strata Utilities
//!
//! Shared utilities and the logging bootstrap for the Strata workspace.
//!
//! The core crates only *emit* diagnostics through `tracing`; everything
//! about where those diagnostics go (console, file, format, filtering) is
//! decided here, once, by the hosting binary.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{LogFormat, LogLevel, LoggingError, init_logging, init_logging_to_file, init_logging_with_level};
pub use tracing::{debug, error, info, trace, warn};
