//! Output formatting for CLI commands.
//!
//! Every command renders either human-readable text or JSON. Text goes to
//! stdout; logs and warnings go to stderr through `tracing`.

use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::agent::TriageOutcome;
use crate::core::{AgentDescriptor, IcdSource, TargetSystem, ValidationSet};

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name, defaulting to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes a value as pretty JSON with a trailing newline.
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        serde_json::to_string_pretty(value)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}\n"))
    }
}

/// Where the kept codes were written.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary<'a> {
    /// Destination file.
    pub path: &'a Path,
    /// Rows written.
    pub rows: usize,
}

/// Formats the agent listing.
#[must_use]
pub fn format_agents(agents: &[AgentDescriptor], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if agents.is_empty() {
                return "No agents available.\n".to_string();
            }
            let mut out = format!("{} agent(s):\n", agents.len());
            for agent in agents {
                let _ = writeln!(out, "  {:<32} {}", agent.id, agent.label());
            }
            out
        }
        OutputFormat::Json => format.to_json(agents),
    }
}

/// Formats the preset ICD sources.
#[must_use]
pub fn format_sources(format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            for source in IcdSource::ALL {
                let _ = writeln!(
                    out,
                    "  {:<12} {:<28} {}",
                    source.key(),
                    source.label(),
                    source.url_str()
                );
            }
            out
        }
        OutputFormat::Json => {
            let rows: Vec<_> = IcdSource::ALL
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "key": s.key(),
                        "label": s.label(),
                        "url": s.url_str(),
                        "language": s.language(),
                    })
                })
                .collect();
            format.to_json(&rows)
        }
    }
}

/// Formats an analysis: candidates with selection marks, recap, warnings.
#[must_use]
pub fn format_analysis(
    outcome: &TriageOutcome,
    review: &ValidationSet,
    target: TargetSystem,
    export: Option<&ExportSummary<'_>>,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            if review.is_empty() {
                out.push_str("The agent suggested no ICD-10 codes.\n");
            } else {
                for (i, row) in review.rows().iter().enumerate() {
                    let c = &row.candidate;
                    let mark = if row.selected { 'x' } else { ' ' };
                    let _ = writeln!(out, "[{mark}] {:>2}. {:<8} {}", i + 1, c.code.as_str(), c.description);
                    if let Some(extract) = &c.extract {
                        let _ = writeln!(out, "              \"{extract}\"");
                    }
                    if let Some(url) = &c.url {
                        let _ = writeln!(out, "              {url}");
                    }
                }
            }

            let recap = review.recap(target);
            let _ = write!(
                out,
                "\n---\nTarget: {} | Kept: {} | Rejected: {} | Polls: {} | Time: {:.1}s",
                recap.target,
                recap.codes.len(),
                recap.rejected,
                outcome.polls,
                outcome.elapsed.as_secs_f64()
            );
            if outcome.skipped_lines > 0 {
                let _ = write!(out, " | Unread lines: {}", outcome.skipped_lines);
            }
            out.push('\n');
            if let Some(export) = export {
                let _ = writeln!(
                    out,
                    "Exported {} code(s) to {}",
                    export.rows,
                    export.path.display()
                );
            }
            out
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "agent_id": outcome.agent_id,
                "thread_id": outcome.thread_id,
                "run_id": outcome.run_id,
                "candidates": outcome.candidates,
                "skipped_lines": outcome.skipped_lines,
                "warning": outcome.warning,
                "elapsed_secs": outcome.elapsed.as_secs_f64(),
                "recap": review.recap(target),
                "export": export,
            });
            format.to_json(&json)
        }
    }
}
