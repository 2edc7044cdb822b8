//! CLI error type and exit code mapping

use pktgate_core::error::{PktgateError, TableError};
use pktgate_engine::EngineError;

/// CLI error.
///
/// `exit_code()` maps each variant to the process exit status.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Table file could not be loaded or was rejected by the table store.
    #[error("table error: {0}")]
    Table(String),

    /// A frame argument or input line is not valid hex.
    #[error("invalid frame {index}: {source}")]
    Frame {
        index: usize,
        #[source]
        source: hex::FromHexError,
    },

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                        |
    /// |------|--------------------------------|
    /// | 0    | Success                        |
    /// | 1    | Command / table / frame error  |
    /// | 2    | Configuration error            |
    /// | 10   | IO error                       |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Io(_) => 10,
            Self::Command(_) | Self::Table(_) | Self::Frame { .. } | Self::JsonSerialize(_) => 1,
        }
    }
}

impl From<PktgateError> for CliError {
    fn from(e: PktgateError) -> Self {
        match e {
            PktgateError::Config(e) => Self::Config(e.to_string()),
            PktgateError::Table(e) => Self::Table(e.to_string()),
            PktgateError::Io(e) => Self::Io(e),
            other => Self::Command(other.to_string()),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Config { .. } => Self::Config(e.to_string()),
            other => Self::Table(other.to_string()),
        }
    }
}

impl From<TableError> for CliError {
    fn from(e: TableError) -> Self {
        Self::Table(e.to_string())
    }
}
