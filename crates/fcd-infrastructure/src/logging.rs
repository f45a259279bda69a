//! Logging initialization
//!
//! One `tracing` subscriber for the whole process: `RUST_LOG`-style env
//! filter, compact stderr output, and an optional non-blocking file
//! appender for daemon mode. The returned guard must be held for the
//! process lifetime or buffered file output is lost.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use fcd_domain::error::{Error, Result};

/// Initialize the global subscriber.
///
/// `log_file` adds a non-blocking appender next to the stderr layer; the
/// daemon passes its configured log path, the CLI passes `None`.
///
/// # Errors
///
/// Returns an error when the log directory cannot be created or a global
/// subscriber is already set.
pub fn init(default_filter: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_owned()));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).compact();

    let (file_layer, guard) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::io_with_source(
                        format!("cannot create log directory {}", parent.display()),
                        e,
                    )
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    Error::io_with_source(format!("cannot open log file {}", path.display()), e)
                })?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::internal(format!("logging already initialized: {e}")))?;

    Ok(guard)
}
