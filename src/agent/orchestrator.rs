//! Request orchestrator for single-exchange agent analyses.
//!
//! Turns one [`RequestConfig`] into an ordered list of [`CodeCandidate`]s
//! through exactly one remote conversation: validate → create thread and
//! run → poll → read reply → parse. Nothing is retained between calls.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::parser::parse_response;
use super::prompt::PromptTemplate;
use super::run::{RunPhase, wait_for_terminal};
use super::service::{AgentService, RunHandle};
use crate::core::{AgentDescriptor, CodeCandidate, RequestConfig};
use crate::error::TriageError;

/// Non-fatal condition reported alongside a successful analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriageWarning {
    /// Part of the reply could not be read as codes.
    ParseDegraded {
        /// Entries skipped by the parser.
        skipped: usize,
        /// Candidates recovered.
        recognized: usize,
    },
}

impl std::fmt::Display for TriageWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParseDegraded {
                skipped,
                recognized: 0,
            } => write!(
                f,
                "no codes recognized in the agent reply ({skipped} unreadable entries)"
            ),
            Self::ParseDegraded {
                skipped,
                recognized,
            } => write!(
                f,
                "{skipped} entries of the agent reply could not be read ({recognized} codes recognized)"
            ),
        }
    }
}

/// Result of one successful analysis.
#[derive(Debug, Clone, Serialize)]
pub struct TriageOutcome {
    /// Candidates in the order the agent gave them.
    pub candidates: Vec<CodeCandidate>,
    /// Reply entries the parser skipped.
    pub skipped_lines: usize,
    /// Agent that produced the reply.
    pub agent_id: String,
    /// Remote thread used for the exchange.
    pub thread_id: String,
    /// Remote run id.
    pub run_id: String,
    /// Status reads performed while waiting.
    pub polls: u32,
    /// Wall-clock time from submission to parsed result.
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    /// Parse quality warning, if the threshold was reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<TriageWarning>,
}

impl TriageOutcome {
    /// Whether the agent ran fine but suggested nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_duration<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_f64(d.as_secs_f64())
}

/// Decides whether a parse is degraded enough to warn about.
///
/// Any skip with nothing recognized warns. Otherwise the skipped share of
/// all entries must reach `ratio`.
#[must_use]
pub fn degraded_warning(skipped: usize, recognized: usize, ratio: f32) -> Option<TriageWarning> {
    if skipped == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let share = skipped as f32 / (skipped + recognized) as f32;
    (recognized == 0 || share >= ratio).then_some(TriageWarning::ParseDegraded {
        skipped,
        recognized,
    })
}

/// Orchestrates analyses against one remote agent service.
pub struct Orchestrator {
    service: Arc<dyn AgentService>,
    config: AgentConfig,
    prompt: PromptTemplate,
}

impl Orchestrator {
    /// Creates an orchestrator with the given service and configuration.
    ///
    /// Loads the prompt template from [`AgentConfig::prompt_file`], falling
    /// back to the compiled-in default.
    pub fn new(service: Arc<dyn AgentService>, config: AgentConfig) -> Self {
        let prompt = PromptTemplate::load(config.prompt_file.as_deref());
        Self {
            service,
            config,
            prompt,
        }
    }

    /// Replaces the prompt template.
    #[must_use]
    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    /// The prompt template in use.
    #[must_use]
    pub const fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    /// The service configuration.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Lists agents currently available on the service.
    ///
    /// Always asks the service; an empty list is a valid answer.
    pub async fn list_agents(&self) -> Result<Vec<AgentDescriptor>, TriageError> {
        let agents = self.service.list_agents(self.config.list_limit).await?;
        debug!(count = agents.len(), "listed agents");
        Ok(agents)
    }

    /// Runs one analysis to completion.
    pub async fn submit(&self, request: &RequestConfig) -> Result<TriageOutcome, TriageError> {
        self.submit_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Runs one analysis, abandoning it when `cancel` fires.
    ///
    /// # Steps
    ///
    /// 1. Validate the request locally (no remote calls on failure)
    /// 2. Confirm the agent still exists on the service
    /// 3. Create a thread, post the prompt, start a run
    /// 4. Poll until a terminal phase, timeout, or cancellation
    /// 5. Read and parse the latest assistant message
    ///
    /// On timeout or cancellation the run is cancelled and the thread
    /// deleted on a best-effort basis.
    pub async fn submit_with_cancel(
        &self,
        request: &RequestConfig,
        cancel: &CancellationToken,
    ) -> Result<TriageOutcome, TriageError> {
        self.validate(request)?;

        let agents = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TriageError::Cancelled),
            listed = self.list_agents() => listed?,
        };
        if !agents.iter().any(|a| a.id == request.agent_id) {
            return Err(TriageError::config_invalid(format!(
                "agent {} is not available on the {} service",
                request.agent_id,
                self.service.provider()
            )));
        }

        if cancel.is_cancelled() {
            return Err(TriageError::Cancelled);
        }

        let start = Instant::now();
        let prompt = self.prompt.build(request);
        let run = self.start_run(&request.agent_id, prompt, cancel).await?;
        info!(
            agent_id = %request.agent_id,
            thread_id = %run.thread_id,
            run_id = %run.run_id,
            language = %request.language,
            "started agent run"
        );

        let outcome = match wait_for_terminal(
            &*self.service,
            &run,
            self.config.poll_interval,
            self.config.run_timeout,
            cancel,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(TriageError::Cancelled) => {
                warn!(thread_id = %run.thread_id, "analysis cancelled, cleaning up");
                self.cleanup(&run, true).await;
                return Err(TriageError::Cancelled);
            }
            Err(e) => return Err(e),
        };

        match outcome.phase {
            RunPhase::Completed => {}
            RunPhase::TimedOut => {
                warn!(
                    thread_id = %run.thread_id,
                    run_id = %run.run_id,
                    polls = outcome.polls,
                    "agent run timed out"
                );
                self.cleanup(&run, true).await;
                return Err(TriageError::Timeout {
                    elapsed: outcome.elapsed,
                });
            }
            RunPhase::Failed { status, message } => {
                warn!(run_id = %run.run_id, %status, %message, "agent run failed");
                self.finish(&run).await;
                return Err(TriageError::RunFailed { status, message });
            }
            phase @ (RunPhase::Cancelled | RunPhase::Expired) => {
                warn!(run_id = %run.run_id, %phase, "agent run ended remotely");
                self.finish(&run).await;
                return Err(TriageError::RunFailed {
                    status: phase.to_string(),
                    message: format!("run was {phase} by the service"),
                });
            }
            phase @ (RunPhase::Queued | RunPhase::Running) => {
                return Err(TriageError::RunFailed {
                    status: phase.to_string(),
                    message: "poll loop stopped on a non-terminal phase".to_string(),
                });
            }
        }

        let reply = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.cleanup(&run, false).await;
                return Err(TriageError::Cancelled);
            }
            reply = self.service.fetch_message(&run) => reply?,
        };
        self.finish(&run).await;

        let parsed = reply.as_deref().map(parse_response).unwrap_or_default();
        let warning = degraded_warning(
            parsed.skipped,
            parsed.candidates.len(),
            self.config.degraded_ratio,
        );
        if reply.is_none() {
            info!(thread_id = %run.thread_id, "agent completed without a reply");
        }
        info!(
            candidates = parsed.candidates.len(),
            skipped = parsed.skipped,
            polls = outcome.polls,
            "analysis complete"
        );

        Ok(TriageOutcome {
            candidates: parsed.candidates,
            skipped_lines: parsed.skipped,
            agent_id: request.agent_id.clone(),
            thread_id: run.thread_id,
            run_id: run.run_id,
            polls: outcome.polls,
            elapsed: start.elapsed(),
            warning,
        })
    }

    /// Submits the conversation on its own task so cancellation returns at
    /// once. A submission that lands after cancellation is discarded in the
    /// background.
    async fn start_run(
        &self,
        agent_id: &str,
        prompt: String,
        cancel: &CancellationToken,
    ) -> Result<RunHandle, TriageError> {
        let service = Arc::clone(&self.service);
        let agent_id = agent_id.to_string();
        let mut submission =
            tokio::spawn(async move { service.submit_conversation(&agent_id, &prompt).await });

        tokio::select! {
            biased;
            joined = &mut submission => joined
                .map_err(|e| TriageError::transport("submit conversation", e.to_string()))?,
            () = cancel.cancelled() => {
                let service = Arc::clone(&self.service);
                tokio::spawn(async move {
                    if let Ok(Ok(run)) = submission.await {
                        discard(&*service, &run, true).await;
                    }
                });
                Err(TriageError::Cancelled)
            }
        }
    }

    /// Checks everything that can be checked without the network.
    fn validate(&self, request: &RequestConfig) -> Result<(), TriageError> {
        if request.note_text.trim().is_empty() {
            return Err(TriageError::config_invalid("note is empty"));
        }
        if request.agent_id.trim().is_empty() {
            return Err(TriageError::config_invalid("no agent selected"));
        }
        let provider = self.service.provider();
        if request.provider != provider {
            return Err(TriageError::config_invalid(format!(
                "provider {} requested but the configured service is {provider}",
                request.provider
            )));
        }
        if request.note_text.len() > self.config.max_note_bytes {
            return Err(TriageError::config_invalid(format!(
                "note exceeds maximum length ({} bytes, max {})",
                request.note_text.len(),
                self.config.max_note_bytes
            )));
        }
        Ok(())
    }

    /// Deletes the thread after a finished run when configured to.
    async fn finish(&self, run: &RunHandle) {
        if self.config.cleanup_threads {
            self.cleanup(run, false).await;
        }
    }

    async fn cleanup(&self, run: &RunHandle, cancel_run: bool) {
        discard(&*self.service, run, cancel_run).await;
    }
}

/// Best-effort removal of remote state. Failures are only logged.
async fn discard(service: &dyn AgentService, run: &RunHandle, cancel_run: bool) {
    if cancel_run && let Err(e) = service.cancel_run(run).await {
        debug!(run_id = %run.run_id, error = %e, "run cancellation failed");
    }
    if let Err(e) = service.delete_thread(&run.thread_id).await {
        warn!(thread_id = %run.thread_id, error = %e, "thread cleanup failed");
    }
}
