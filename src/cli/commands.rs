//! CLI command implementations.
//!
//! Contains the business logic for each CLI command. The library is async;
//! commands that talk to the agent service bridge through a tokio runtime.

use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{
    AgentConfig, AgentConfigBuilder, AgentService, Orchestrator, PromptTemplate, create_service,
};
use crate::cli::output::{
    ExportSummary, OutputFormat, format_agents, format_analysis, format_sources,
};
use crate::cli::parser::{AnalyzeArgs, Cli, Commands, ExportFormat, ReferenceArgs};
use crate::core::{IcdSource, Language, Provider, RequestConfig, TargetSystem, ValidationSet};
use crate::error::{CommandError, Result};

/// Placeholder note used by `prompt` when no note is given.
const PLACEHOLDER_NOTE: &str = "<clinical note text>";

/// Executes the CLI command.
///
/// Returns the text to print on stdout.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Agents => cmd_agents(cli, format),
        Commands::Sources => Ok(format_sources(format)),
        Commands::Prompt {
            note,
            reference,
            prompt_file,
        } => cmd_prompt(note.as_deref(), reference, prompt_file.as_deref(), format),
        Commands::Analyze(args) => cmd_analyze(cli, args, format),
    }
}

/// Config builder seeded from global flags and the environment.
fn config_builder(cli: &Cli) -> AgentConfigBuilder {
    let mut builder = AgentConfig::builder();
    if let Some(provider) = &cli.provider {
        builder = builder.provider(provider);
    }
    builder.from_env()
}

fn build_service(config: &AgentConfig) -> Result<Arc<dyn AgentService>> {
    Ok(create_service(config)?)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

/// Resolves the ICD source URL and the response language.
///
/// Without `--language`, presets use their own language and custom URLs
/// use English.
fn resolve_reference(reference: &ReferenceArgs) -> Result<(url::Url, Language)> {
    let url = IcdSource::resolve(&reference.icd_source).map_err(CommandError::InvalidArgument)?;
    let language = match &reference.language {
        Some(raw) => raw.parse().map_err(CommandError::InvalidArgument)?,
        None => IcdSource::ALL
            .iter()
            .find(|s| s.key() == reference.icd_source.trim())
            .map_or_else(Language::default, IcdSource::language),
    };
    Ok((url, language))
}

/// Reads the note from the argument, a file, or stdin.
fn read_note(args: &AnalyzeArgs) -> Result<String> {
    if let Some(note) = &args.note {
        return Ok(note.clone());
    }
    if let Some(path) = &args.note_file {
        return std::fs::read_to_string(path).map_err(|e| {
            CommandError::ExecutionFailed(format!("Failed to read {}: {e}", path.display()))
                .into()
        });
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(CommandError::InvalidArgument(
            "no note given (pass it as an argument, with --note-file, or on stdin)".to_string(),
        )
        .into());
    }
    let mut note = String::new();
    stdin.lock().read_to_string(&mut note)?;
    Ok(note)
}

fn cmd_agents(cli: &Cli, format: OutputFormat) -> Result<String> {
    let config = config_builder(cli).build()?;
    let service = build_service(&config)?;
    let orchestrator = Orchestrator::new(service, config);

    let agents = runtime()?.block_on(orchestrator.list_agents())?;
    Ok(format_agents(&agents, format))
}

fn cmd_prompt(
    note: Option<&str>,
    reference: &ReferenceArgs,
    prompt_file: Option<&Path>,
    format: OutputFormat,
) -> Result<String> {
    let (url, language) = resolve_reference(reference)?;
    let request = RequestConfig::new(note.unwrap_or(PLACEHOLDER_NOTE), Provider::Azure, "")
        .with_icd_website(url)
        .with_language(language);
    let prompt = PromptTemplate::load(prompt_file).build(&request);

    match format {
        OutputFormat::Text => Ok(format!("{prompt}\n")),
        OutputFormat::Json => Ok(format.to_json(&serde_json::json!({
            "icd_website": request.icd_website,
            "language": request.language,
            "prompt": prompt,
        }))),
    }
}

fn cmd_analyze(cli: &Cli, args: &AnalyzeArgs, format: OutputFormat) -> Result<String> {
    let note = read_note(args)?;
    let (url, language) = resolve_reference(&args.reference)?;
    let target: TargetSystem = args.target.parse().map_err(CommandError::InvalidArgument)?;

    let mut builder = config_builder(cli);
    if let Some(path) = &args.prompt_file {
        builder = builder.prompt_file(path);
    }
    if let Some(secs) = args.timeout {
        builder = builder.run_timeout(Duration::from_secs(secs));
    }
    if let Some(ms) = args.poll_interval {
        builder = builder.poll_interval(Duration::from_millis(ms));
    }
    if args.cleanup {
        builder = builder.cleanup_threads(true);
    }
    let config = builder.build()?;

    let agent_id = args
        .agent
        .clone()
        .or_else(|| config.default_agent_id.clone())
        .ok_or_else(|| {
            CommandError::InvalidArgument(
                "no agent selected (pass --agent or set AZURE_AI_AGENT_AGENT)".to_string(),
            )
        })?;

    let request = RequestConfig::new(note, config.provider(), agent_id)
        .with_icd_website(url)
        .with_language(language);

    let service = build_service(&config)?;
    let orchestrator = Orchestrator::new(service, config);

    let cancel = CancellationToken::new();
    let outcome = runtime()?.block_on(async {
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });
        orchestrator.submit_with_cancel(&request, &cancel).await
    })?;

    if let Some(warning) = &outcome.warning {
        warn!(%warning, "agent reply only partly understood");
    }

    let mut review = ValidationSet::new(outcome.candidates.clone());
    review.apply_selection(&args.select)?;

    let export = match &args.export {
        Some(path) => {
            let rows = write_export(&review, path, args.export_format, target)?;
            info!(path = %path.display(), rows, "exported validated codes");
            Some(ExportSummary {
                path: path.as_path(),
                rows,
            })
        }
        None => None,
    };

    Ok(format_analysis(
        &outcome,
        &review,
        target,
        export.as_ref(),
        format,
    ))
}

fn write_export(
    review: &ValidationSet,
    path: &Path,
    format: ExportFormat,
    target: TargetSystem,
) -> Result<usize> {
    let file = File::create(path).map_err(crate::error::ValidationError::Export)?;
    let writer = BufWriter::new(file);
    let rows = match format {
        ExportFormat::Csv => review.export_csv(writer, target)?,
        ExportFormat::Json => review.export_json(writer, target)?,
    };
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(source: &str, language: Option<&str>) -> ReferenceArgs {
        ReferenceArgs {
            icd_source: source.to_string(),
            language: language.map(str::to_string),
        }
    }

    #[test]
    fn test_resolve_reference_uses_preset_language() {
        let (url, language) =
            resolve_reference(&reference("who-2019-fr", None)).unwrap_or_else(|_| unreachable!());
        assert_eq!(url, IcdSource::Who2019Fr.url());
        assert_eq!(language, Language::Fr);
    }

    #[test]
    fn test_resolve_reference_explicit_language() {
        let (_, language) = resolve_reference(&reference("who-2019-fr", Some("en")))
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(language, Language::En);
    }

    #[test]
    fn test_resolve_reference_custom_url() {
        let (url, language) = resolve_reference(&reference("https://example.org/icd10", None))
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(url.as_str(), "https://example.org/icd10");
        assert_eq!(language, Language::En);
    }

    #[test]
    fn test_resolve_reference_rejects_garbage() {
        assert!(resolve_reference(&reference("ftp://example.org", None)).is_err());
        assert!(resolve_reference(&reference("who-2019-en", Some("de"))).is_err());
    }

    #[test]
    fn test_prompt_command_text() {
        let out = cmd_prompt(
            Some("Cough for three weeks."),
            &reference("who-2025-en", None),
            None,
            OutputFormat::Text,
        )
        .unwrap_or_else(|_| unreachable!());
        assert!(out.contains("<note>\nCough for three weeks.\n</note>"));
    }

    #[test]
    fn test_export_writes_csv() {
        use crate::core::{CodeCandidate, IcdCode};

        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("codes.csv");
        let mut review = ValidationSet::new(vec![CodeCandidate::new(
            IcdCode::parse("I10").unwrap_or_else(|| unreachable!()),
            "hypertension",
        )]);
        review.set_all(true);

        let rows = write_export(&review, &path, ExportFormat::Csv, TargetSystem::Cegedim)
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(rows, 1);
        let text = std::fs::read_to_string(&path).unwrap_or_else(|_| unreachable!());
        assert!(text.starts_with("target,code,description,extract,url\n"));
        assert!(text.contains("I10,hypertension"));
    }
}
