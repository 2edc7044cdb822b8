//! Command handlers -- one module per subcommand

pub mod classify;
pub mod config;
pub mod tables;

use std::path::Path;

use tracing::debug;

use pktgate_core::config::PktgateConfig;
use pktgate_engine::GateConfig;

use crate::error::CliError;

/// Engine settings from `--config`, or engine defaults when it was omitted.
pub(crate) async fn load_gate_config(config_path: Option<&Path>) -> Result<GateConfig, CliError> {
    match config_path {
        Some(path) => {
            let config = PktgateConfig::load(path).await?;
            Ok(GateConfig::from_core(&config)?)
        }
        None => {
            debug!("no --config given, using engine defaults");
            Ok(GateConfig::default())
        }
    }
}
