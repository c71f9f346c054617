//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// icd-triage: ICD-10 code suggestions for clinical notes.
///
/// Sends a doctor's note to a hosted AI agent, lists the ICD-10 codes it
/// proposes, and exports the ones you keep.
#[derive(Parser, Debug)]
#[command(name = "icd-triage")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    ///
    /// `RUST_LOG` takes precedence when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// Agent service provider (azure, openai).
    #[arg(long, env = "ICD_TRIAGE_PROVIDER", global = true)]
    pub provider: Option<String>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List agents deployed on the configured service.
    #[command(after_help = r#"Examples:
  icd-triage agents                         # Azure AI Foundry (default)
  icd-triage --provider openai agents       # OpenAI assistants
  icd-triage --format json agents | jq '.[].id'
"#)]
    Agents,

    /// List the built-in ICD-10 reference sources.
    Sources,

    /// Print the prompt that would be sent for a note.
    #[command(after_help = r#"Examples:
  icd-triage prompt                                  # Template with a placeholder note
  icd-triage prompt --icd-source who-2025-fr "Note"  # French 2025 browser
  icd-triage prompt --prompt-file ./my-prompt.md
"#)]
    Prompt {
        /// Note text. Defaults to a placeholder.
        note: Option<String>,

        #[command(flatten)]
        reference: ReferenceArgs,

        /// Prompt template file overriding the built-in instructions.
        #[arg(long, env = "ICD_TRIAGE_PROMPT_FILE")]
        prompt_file: Option<PathBuf>,
    },

    /// Analyze a note and review the suggested codes.
    ///
    /// The note is taken from the argument, `--note-file`, or stdin.
    #[command(after_help = r#"Examples:
  icd-triage analyze "Type 2 diabetes, hypertension." --agent asst_abc
  icd-triage analyze --note-file note.txt --select 1,3-4 --export codes.csv
  cat note.txt | icd-triage analyze --icd-source who-2019-fr --target dedalus
  icd-triage --format json analyze --note-file note.txt | jq '.candidates'
"#)]
    Analyze(AnalyzeArgs),
}

/// ICD source and response language.
#[derive(clap::Args, Debug, Clone)]
pub struct ReferenceArgs {
    /// ICD-10 reference: a preset key (see `sources`) or an http(s) URL.
    #[arg(long, default_value = "who-2019-en")]
    pub icd_source: String,

    /// Response language (en, fr). Defaults to the preset's language.
    #[arg(long)]
    pub language: Option<String>,
}

/// Arguments for `analyze`.
#[derive(clap::Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Note text. Read from stdin when neither this nor `--note-file` is given.
    pub note: Option<String>,

    /// Read the note from a file.
    #[arg(short = 'f', long, conflicts_with = "note")]
    pub note_file: Option<PathBuf>,

    /// Agent id. Falls back to `AZURE_AI_AGENT_AGENT`.
    #[arg(short, long)]
    pub agent: Option<String>,

    #[command(flatten)]
    pub reference: ReferenceArgs,

    /// Rows to keep: `all`, `none`, or 1-based rows like `1,3-5`.
    #[arg(short, long, default_value = "all")]
    pub select: String,

    /// Target system recorded in the recap and export.
    #[arg(short, long, default_value = "hospital-management")]
    pub target: String,

    /// Write the kept codes to this file.
    #[arg(short, long)]
    pub export: Option<PathBuf>,

    /// Export file format.
    #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
    pub export_format: ExportFormat,

    /// Prompt template file overriding the built-in instructions.
    #[arg(long, env = "ICD_TRIAGE_PROMPT_FILE")]
    pub prompt_file: Option<PathBuf>,

    /// Seconds to wait for the agent run before giving up.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Milliseconds between run status polls.
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Delete the remote thread once the analysis is done.
    #[arg(long)]
    pub cleanup: bool,
}

/// Export file formats.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// Pretty-printed JSON recap.
    Json,
}
