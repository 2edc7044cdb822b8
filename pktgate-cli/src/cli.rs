//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no I/O happens here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// pktgate -- packet admission control toolkit.
///
/// Use `pktgate <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "pktgate", version, about, long_about = None)]
pub struct Cli {
    /// Path to pktgate.toml.
    ///
    /// `config` commands default to `pktgate.toml`; `tables` and `classify`
    /// use built-in engine defaults when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level for diagnostics on stderr (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Config path for the `config` commands.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from("pktgate.toml"))
    }
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate or show pktgate.toml.
    Config(ConfigArgs),

    /// Validate or show a service/rule/token table file.
    Tables(TablesArgs),

    /// Classify hex-encoded Ethernet frames against a table file.
    Classify(ClassifyArgs),
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file (and its table file, if set).
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, metrics, engine, rate_limit, conntrack, ingress).
        #[arg(long)]
        section: Option<String>,
    },
}

// ---- tables ----

#[derive(Args, Debug)]
pub struct TablesArgs {
    #[command(subcommand)]
    pub action: TablesAction,
}

#[derive(Subcommand, Debug)]
pub enum TablesAction {
    /// Check a table file against the engine's entry rules and capacities.
    Validate {
        /// Table file (TOML).
        file: PathBuf,
    },
    /// List the entries of a table file.
    Show {
        /// Table file (TOML).
        file: PathBuf,
    },
}

// ---- classify ----

/// Run frames through a fresh decision engine.
///
/// Frames are classified in order against one engine instance, so rate
/// limiting and connection tracking see them as a sequence.
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Table file (TOML).
    #[arg(short, long)]
    pub tables: PathBuf,

    /// Read frames from a file, one hex frame per line ('#' starts a comment).
    #[arg(short, long, conflicts_with = "frames")]
    pub input: Option<PathBuf>,

    /// Hex-encoded frames. Whitespace, ':' and a leading 0x are ignored.
    #[arg(value_name = "HEX")]
    pub frames: Vec<String>,
}
