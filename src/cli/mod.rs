//! CLI layer for icd-triage.
//!
//! Provides the command-line interface using clap, with commands for
//! listing agents and sources, previewing the prompt, and analyzing notes.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{AnalyzeArgs, Cli, Commands, ExportFormat, ReferenceArgs};
