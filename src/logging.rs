//! Logging configuration for the gateway.
//!
//! Logs go to stderr by default, or to a file when `--log-file` is given.
//! `RUST_LOG` controls the filter; the default level is `info`.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes logging to `path`, appending to an existing file.
///
/// Falls back to stderr if the file cannot be opened.
pub fn init_file_logging(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging();
            return;
        }
    }

    let log_file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file {}: {e}", path.display());
            init_stderr_logging();
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .init();
}

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

/// Default log file location.
///
/// Uses the XDG state directory on Linux
/// (`~/.local/state/ingest-gateway/gateway.log`), falling back to the config
/// directory and then the temp directory.
pub fn get_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("ingest-gateway").join("gateway.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("ingest-gateway").join("gateway.log");
    }

    std::env::temp_dir().join("ingest-gateway.log")
}
