//! `pktgate tables` command handler

use std::io::Write;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use pktgate_engine::{AuthType, GateConfig, PortRange, RuleAction, TableFile, TableStore};

use crate::cli::{TablesAction, TablesArgs};
use crate::commands::load_gate_config;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `tables` command.
pub async fn execute(
    args: TablesArgs,
    config_path: Option<&Path>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let gate = load_gate_config(config_path).await?;
    match args.action {
        TablesAction::Validate { file } => execute_validate(&file, &gate, writer).await,
        TablesAction::Show { file } => execute_show(&file, writer).await,
    }
}

async fn execute_validate(
    path: &Path,
    gate: &GateConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %path.display(), "validating table file");

    let report = match check(path, gate).await {
        Ok(counts) => TablesValidationReport {
            source: path.display().to_string(),
            valid: true,
            counts: Some(counts),
            errors: Vec::new(),
        },
        Err(e) => TablesValidationReport {
            source: path.display().to_string(),
            valid: false,
            counts: None,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Table("table file is invalid".to_owned()));
    }
    Ok(())
}

/// Load the file and publish it into a scratch store with the configured
/// capacities, exactly as the daemon would.
async fn check(path: &Path, gate: &GateConfig) -> Result<TableCounts, CliError> {
    let file = TableFile::load(path).await?;
    let store = TableStore::new(gate.limits, gate.rule_order);
    store.replace_all(file.into_table_set(0))?;
    let tables = store.snapshot();
    Ok(TableCounts {
        services: tables.service_count(),
        rules: tables.rule_count(),
        tokens: tables.token_count(),
        fast_paths: tables.fast_path_count(),
    })
}

async fn execute_show(path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let file = TableFile::load(path).await?;
    writer.render(&TablesReport::from_file(path, &file))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub services: usize,
    pub rules: usize,
    pub tokens: usize,
    pub fast_paths: usize,
}

/// Table file validation result.
#[derive(Serialize)]
pub struct TablesValidationReport {
    pub source: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<TableCounts>,
    pub errors: Vec<String>,
}

impl Render for TablesValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Table Validation: {}", self.source.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
        }
        if let Some(c) = &self.counts {
            writeln!(
                w,
                "  services: {}  rules: {}  tokens: {}  fast paths: {}",
                c.services, c.rules, c.tokens, c.fast_paths
            )?;
        }
        for err in &self.errors {
            writeln!(w, "  Error: {}", err.red())?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct ServiceRow {
    pub service_id: u32,
    pub ip_addr: Ipv4Addr,
    pub ports: String,
    pub protocol: String,
    pub flags: Vec<&'static str>,
    pub fast_path: bool,
}

#[derive(Serialize)]
pub struct RuleRow {
    pub rule_id: u32,
    pub priority: i32,
    pub action: RuleAction,
    pub matches: String,
}

#[derive(Serialize)]
pub struct TokenRow {
    pub token_hash: String,
    pub service_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

/// Contents of a table file.
#[derive(Serialize)]
pub struct TablesReport {
    pub source: String,
    pub services: Vec<ServiceRow>,
    pub rules: Vec<RuleRow>,
    pub tokens: Vec<TokenRow>,
}

impl TablesReport {
    pub fn from_file(path: &Path, file: &TableFile) -> Self {
        let services = file
            .services
            .iter()
            .map(|s| {
                let mut flags = Vec::new();
                if s.requires_tls {
                    flags.push("tls");
                }
                if s.allows_websocket {
                    flags.push("websocket");
                }
                if s.grpc {
                    flags.push("grpc");
                }
                if s.inspect {
                    flags.push("inspect");
                }
                match s.auth_type {
                    AuthType::None => {}
                    AuthType::Simple => flags.push("auth:simple"),
                    AuthType::Complex => flags.push("auth:complex"),
                }
                ServiceRow {
                    service_id: s.service_id,
                    ip_addr: s.ip_addr,
                    ports: ports(s.ports()),
                    protocol: protocol_name(s.protocol),
                    flags,
                    fast_path: file.fast_paths.contains(&s.service_id),
                }
            })
            .collect();

        let rules = file
            .rules
            .iter()
            .map(|r| {
                let mut matches = Vec::new();
                if !r.src_mask.is_unspecified() {
                    matches.push(format!("src {}/{}", r.src_ip, r.src_mask));
                }
                if !r.dst_mask.is_unspecified() {
                    matches.push(format!("dst {}/{}", r.dst_ip, r.dst_mask));
                }
                if let Some(range) = r.src_ports {
                    matches.push(format!("sport {}", ports(range)));
                }
                if let Some(range) = r.dst_ports {
                    matches.push(format!("dport {}", ports(range)));
                }
                if r.protocol != 0 {
                    matches.push(protocol_name(r.protocol));
                }
                if r.auth_required {
                    matches.push("auth".to_owned());
                }
                RuleRow {
                    rule_id: r.rule_id,
                    priority: r.priority,
                    action: r.action,
                    matches: if matches.is_empty() {
                        "*".to_owned()
                    } else {
                        matches.join(" ")
                    },
                }
            })
            .collect();

        let tokens = file
            .tokens
            .iter()
            .map(|t| TokenRow {
                token_hash: format!("{:#010x}", t.token_hash),
                service_id: t.service_id,
                ttl_secs: t.ttl_secs,
            })
            .collect();

        Self {
            source: path.display().to_string(),
            services,
            rules,
            tokens,
        }
    }
}

fn ports(range: PortRange) -> String {
    if range.start == range.end {
        range.start.to_string()
    } else {
        format!("{}-{}", range.start, range.end)
    }
}

fn protocol_name(protocol: u8) -> String {
    match protocol {
        0 => "any".to_owned(),
        1 => "icmp".to_owned(),
        6 => "tcp".to_owned(),
        17 => "udp".to_owned(),
        other => other.to_string(),
    }
}

fn action_name(action: RuleAction) -> &'static str {
    match action {
        RuleAction::Drop => "drop",
        RuleAction::Allow => "allow",
        RuleAction::Redirect => "redirect",
    }
}

impl Render for TablesReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Tables (source: {})", self.source.bold())?;

        writeln!(w)?;
        writeln!(w, "Services: {}", self.services.len().to_string().bold())?;
        if !self.services.is_empty() {
            writeln!(
                w,
                "  {:<8} {:<16} {:<12} {:<6} {:<5} FLAGS",
                "ID", "ADDRESS", "PORTS", "PROTO", "FAST"
            )?;
            for s in &self.services {
                writeln!(
                    w,
                    "  {:<8} {:<16} {:<12} {:<6} {:<5} {}",
                    s.service_id,
                    s.ip_addr.to_string(),
                    s.ports,
                    s.protocol,
                    if s.fast_path { "yes" } else { "-" },
                    s.flags.join(",")
                )?;
            }
        }

        writeln!(w)?;
        writeln!(w, "Rules: {}", self.rules.len().to_string().bold())?;
        if !self.rules.is_empty() {
            writeln!(w, "  {:<8} {:<9} {:<9} MATCH", "ID", "PRIORITY", "ACTION")?;
            for r in &self.rules {
                let action = match r.action {
                    RuleAction::Drop => action_name(r.action).red(),
                    RuleAction::Allow => action_name(r.action).green(),
                    RuleAction::Redirect => action_name(r.action).yellow(),
                };
                writeln!(
                    w,
                    "  {:<8} {:<9} {:<9} {}",
                    r.rule_id, r.priority, action, r.matches
                )?;
            }
        }

        writeln!(w)?;
        writeln!(w, "Tokens: {}", self.tokens.len().to_string().bold())?;
        for t in &self.tokens {
            let ttl = t
                .ttl_secs
                .map_or_else(|| "never".to_owned(), |s| format!("{s}s"));
            writeln!(
                w,
                "  {} service {} expires {}",
                t.token_hash, t.service_id, ttl
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
fast_paths = [1]

[[services]]
service_id = 1
ip_addr = "10.0.0.5"
port_start = 443
port_end = 443
protocol = 6
requires_tls = true

[[services]]
service_id = 2
ip_addr = "10.0.0.6"
port_start = 8000
port_end = 8099
auth_type = "simple"

[[rules]]
rule_id = 10
src_ip = "203.0.113.0"
src_mask = "255.255.255.0"
dst_ports = { start = 22, end = 22 }
action = "drop"
priority = 100

[[rules]]
rule_id = 11
action = "allow"

[[tokens]]
token_hash = 0xfeedf00d
service_id = 2
"#;

    fn render(report: &impl Render) -> String {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        String::from_utf8(buffer).expect("valid UTF-8")
    }

    // =============================================================================
    // Show
    // =============================================================================

    #[test]
    fn test_report_rows() {
        let file = TableFile::parse(SAMPLE).expect("valid table file");
        let report = TablesReport::from_file(Path::new("tables.toml"), &file);

        assert_eq!(report.services.len(), 2);
        assert_eq!(report.services[0].ports, "443");
        assert_eq!(report.services[0].protocol, "tcp");
        assert_eq!(report.services[0].flags, vec!["tls"]);
        assert!(report.services[0].fast_path);
        assert_eq!(report.services[1].ports, "8000-8099");
        assert_eq!(report.services[1].protocol, "any");
        assert_eq!(report.services[1].flags, vec!["auth:simple"]);

        assert_eq!(report.rules[0].matches, "src 203.0.113.0/255.255.255.0 dport 22");
        assert_eq!(report.rules[1].matches, "*");
        assert_eq!(report.tokens[0].token_hash, "0xfeedf00d");
    }

    #[test]
    fn test_report_text() {
        let file = TableFile::parse(SAMPLE).expect("valid table file");
        let text = render(&TablesReport::from_file(Path::new("tables.toml"), &file));
        assert!(text.contains("Services: 2"));
        assert!(text.contains("Rules: 2"));
        assert!(text.contains("0xfeedf00d service 2 expires never"));
    }

    // =============================================================================
    // Validate
    // =============================================================================

    #[tokio::test]
    async fn test_check_counts_entries() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("tables.toml");
        std::fs::write(&path, SAMPLE).expect("write tables");

        let counts = check(&path, &GateConfig::default()).await.expect("valid");
        assert_eq!(
            counts,
            TableCounts {
                services: 2,
                rules: 2,
                tokens: 1,
                fast_paths: 1
            }
        );
    }

    #[tokio::test]
    async fn test_check_enforces_configured_capacity() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("tables.toml");
        std::fs::write(&path, SAMPLE).expect("write tables");

        let mut gate = GateConfig::default();
        gate.limits.max_services = 1;
        let err = check(&path, &gate).await.expect_err("over capacity");
        assert!(matches!(err, CliError::Table(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_check_rejects_inverted_port_range() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("tables.toml");
        std::fs::write(
            &path,
            "[[services]]\nservice_id = 1\nip_addr = \"10.0.0.1\"\nport_start = 90\nport_end = 80\n",
        )
        .expect("write tables");

        assert!(check(&path, &GateConfig::default()).await.is_err());
    }
}
