//! `pktgate config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use pktgate_core::config::PktgateConfig;
use pktgate_engine::{GateConfig, TableFile, TableStore};

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Section names accepted by `config show --section`.
const SECTIONS: [&str; 6] = ["general", "metrics", "engine", "rate_limit", "conntrack", "ingress"];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Load, validate, convert to engine settings, and check the referenced
/// table file.
///
/// # Errors
///
/// Returns `CliError::Config` after rendering the report when any step fails.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let errors = match validate_file(config_path).await {
        Ok(()) => Vec::new(),
        Err(e) => vec![e.to_string()],
    };
    let report = ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: errors.is_empty(),
        errors,
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

async fn validate_file(config_path: &Path) -> Result<(), CliError> {
    let config = PktgateConfig::load(config_path).await?;
    let gate = GateConfig::from_core(&config)?;
    if let Some(tables_path) = &gate.tables_path {
        let file = TableFile::load(tables_path).await?;
        TableStore::new(gate.limits, gate.rule_order).replace_all(file.into_table_set(0))?;
    }
    Ok(())
}

/// Show the effective configuration, optionally one section only.
///
/// # Errors
///
/// Returns `CliError::Config` if loading fails or `CliError::Command` for an
/// unknown section name.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = PktgateConfig::load(config_path).await?;
    let config_toml = match section.as_deref() {
        None => to_toml(&config)?,
        Some(name) => section_toml(&config, name)?,
    };

    writer.render(&ConfigReport {
        source: config_path.display().to_string(),
        section,
        config_toml,
    })
}

fn section_toml(config: &PktgateConfig, name: &str) -> Result<String, CliError> {
    match name {
        "general" => to_toml(&config.general),
        "metrics" => to_toml(&config.metrics),
        "engine" => to_toml(&config.engine),
        "rate_limit" => to_toml(&config.rate_limit),
        "conntrack" => to_toml(&config.conntrack),
        "ingress" => to_toml(&config.ingress),
        _ => Err(CliError::Command(format!(
            "unknown section: {} (expected: {})",
            name,
            SECTIONS.join(", ")
        ))),
    }
}

fn to_toml<T: Serialize>(value: &T) -> Result<String, CliError> {
    toml::to_string_pretty(value)
        .map_err(|e| CliError::Command(format!("failed to serialize config: {}", e)))
}

/// Effective configuration.
///
/// JSON output carries only the source and section; the TOML body is for
/// text rendering.
#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.section {
            Some(section) => writeln!(
                w,
                "Configuration {} (source: {})",
                format!("[{}]", section).bold(),
                self.source
            )?,
            None => writeln!(w, "Configuration (source: {})", self.source.bold())?,
        }
        writeln!(w)?;
        write!(w, "{}", self.config_toml)
    }
}

/// Configuration validation result.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}
