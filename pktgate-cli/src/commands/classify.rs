//! `pktgate classify` command handler
//!
//! Runs hex-encoded frames through a fresh decision engine built from a table
//! file. The engine clock is frozen, so the result depends only on the frame
//! sequence and the tables.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use pktgate_engine::{
    Clock, Decision, DecisionEngine, ManualClock, Reason, SniffedProtocol, TableFile, Verdict,
};

use crate::cli::ClassifyArgs;
use crate::commands::load_gate_config;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Engine clock start for offline runs.
const START_NS: u64 = 1_000_000_000;

/// Execute the `classify` command.
pub async fn execute(
    args: ClassifyArgs,
    config_path: Option<&Path>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let frames = match &args.input {
        Some(path) => parse_input(&tokio::fs::read_to_string(path).await?)?,
        None => args
            .frames
            .iter()
            .enumerate()
            .map(|(index, hex)| decode_hex(hex).map_err(|source| CliError::Frame { index, source }))
            .collect::<Result<Vec<_>, _>>()?,
    };
    if frames.is_empty() {
        return Err(CliError::Command(
            "no frames given (pass HEX arguments or --input)".to_owned(),
        ));
    }

    let gate = load_gate_config(config_path).await?;
    let table_file = TableFile::load(&args.tables).await?;

    let clock = Arc::new(ManualClock::new(START_NS));
    let engine = DecisionEngine::new(&gate, clock.clone());
    let generation = engine
        .tables()
        .replace_all(table_file.into_table_set(clock.now_ns()))?;
    info!(
        tables = %args.tables.display(),
        generation,
        frames = frames.len(),
        "classifying frames"
    );

    let report = ClassifyReport::new(
        args.tables.display().to_string(),
        frames.iter().map(|f| (f.len(), engine.classify(f))),
    );
    writer.render(&report)
}

/// One hex frame per non-empty line. `#` starts a comment.
fn parse_input(content: &str) -> Result<Vec<Vec<u8>>, CliError> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| decode_hex(line).map_err(|source| CliError::Frame { index, source }))
        .collect()
}

/// Decode hex, ignoring whitespace, `:` separators, and a leading `0x`.
pub(crate) fn decode_hex(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = body
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && *c != ':')
        .collect();
    hex::decode(digits)
}

#[derive(Debug, Serialize)]
pub struct FrameDecision {
    pub index: usize,
    pub len: usize,
    pub verdict: Verdict,
    pub reason: Reason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sniffed: Option<SniffedProtocol>,
}

#[derive(Debug, Default, Serialize)]
pub struct VerdictSummary {
    pub pass: usize,
    pub drop: usize,
    pub redirect_fast: usize,
    pub redirect_slow: usize,
}

/// Per-frame decisions plus verdict totals.
#[derive(Debug, Serialize)]
pub struct ClassifyReport {
    pub tables: String,
    pub decisions: Vec<FrameDecision>,
    pub summary: VerdictSummary,
}

impl ClassifyReport {
    pub fn new(tables: String, results: impl Iterator<Item = (usize, Decision)>) -> Self {
        let mut summary = VerdictSummary::default();
        let decisions = results
            .enumerate()
            .map(|(index, (len, d))| {
                match d.verdict {
                    Verdict::Pass => summary.pass += 1,
                    Verdict::Drop => summary.drop += 1,
                    Verdict::RedirectFast => summary.redirect_fast += 1,
                    Verdict::RedirectSlow => summary.redirect_slow += 1,
                }
                FrameDecision {
                    index,
                    len,
                    verdict: d.verdict,
                    reason: d.reason,
                    service_id: d.service_id,
                    rule_id: d.rule_id,
                    sniffed: d.sniffed,
                }
            })
            .collect();
        Self {
            tables,
            decisions,
            summary,
        }
    }
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_owned(), |v| v.to_string())
}

impl Render for ClassifyReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Classification (tables: {})", self.tables.bold())?;
        writeln!(
            w,
            "{:<5} {:<6} {:<14} {:<22} {:<8} {:<6} SNIFFED",
            "#", "LEN", "VERDICT", "REASON", "SERVICE", "RULE"
        )?;
        writeln!(w, "{}", "-".repeat(76))?;

        for d in &self.decisions {
            let verdict = format!("{:<14}", d.verdict.as_str());
            let verdict = match d.verdict {
                Verdict::Pass => verdict.green(),
                Verdict::Drop => verdict.red(),
                Verdict::RedirectFast => verdict.cyan(),
                Verdict::RedirectSlow => verdict.yellow(),
            };
            writeln!(
                w,
                "{:<5} {:<6} {} {:<22} {:<8} {:<6} {}",
                d.index,
                d.len,
                verdict,
                d.reason.as_str(),
                opt(d.service_id),
                opt(d.rule_id),
                opt(d.sniffed.map(SniffedProtocol::as_str)),
            )?;
        }

        writeln!(w)?;
        writeln!(
            w,
            "pass: {}  drop: {}  redirect_fast: {}  redirect_slow: {}",
            self.summary.pass, self.summary.drop, self.summary.redirect_fast, self.summary.redirect_slow
        )
    }
}
