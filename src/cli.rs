//! Command-line argument parsing.
//!
//! Flags override values from the config file.

use crate::config::{Config, JWT_SECRET_ENV};
use clap::Parser;
use std::path::PathBuf;

/// HTTP gateway moving data between ClickHouse tables and CSV files.
#[derive(Parser, Debug)]
#[command(name = "ingest-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short = 'H', long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Directory export files are written to
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    /// Rows per INSERT round-trip when importing
    #[arg(long, value_name = "ROWS")]
    pub batch_size: Option<usize>,

    /// Key used to verify access tokens
    #[arg(long, value_name = "SECRET", env = JWT_SECRET_ENV, hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Log to a file instead of stderr (default location if no path is given)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<Option<PathBuf>>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Log file requested with `--log-file`, if any.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(crate::logging::get_log_path))
    }

    /// Applies flag values on top of `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = &self.export_dir {
            config.server.export_dir = dir.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.store.insert_batch_size = batch_size;
        }
        if let Some(secret) = self.jwt_secret.as_ref().filter(|s| !s.is_empty()) {
            config.auth.secret = Some(secret.clone());
        }
    }
}
