//! CLI argument definitions for pktgate-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// pktgate packet admission daemon.
///
/// Hosts the decision engine, keeps its tables loaded, runs housekeeping,
/// and exports metrics.
#[derive(Parser, Debug)]
#[command(name = "pktgate-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to pktgate.toml configuration file.
    #[arg(short, long, default_value = "/etc/pktgate/pktgate.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the table file path from `[engine] tables_path`.
    #[arg(long)]
    pub tables: Option<PathBuf>,

    /// Validate configuration (and table file, if any) and exit.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut pktgate_core::PktgateConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file.clone_from(pid_file);
        }
        if let Some(tables) = &self.tables {
            config.engine.tables_path = tables.display().to_string();
        }
    }
}
