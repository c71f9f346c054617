//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use icd_triage::agent::{
    AgentConfig, AgentPage, AgentService, Orchestrator, PromptTemplate, RemoteRunStatus,
    RunHandle, collect_pages,
};
use icd_triage::core::{AgentDescriptor, Provider, RequestConfig};
use icd_triage::error::TriageError;

/// Agent id the scripted service reports by default.
pub const AGENT_ID: &str = "asst_triage01";

/// Counts calls per remote operation.
#[derive(Debug, Default)]
pub struct Calls {
    pub list: AtomicUsize,
    pub submit: AtomicUsize,
    pub poll: AtomicUsize,
    pub fetch: AtomicUsize,
    pub cancel: AtomicUsize,
    pub delete: AtomicUsize,
    /// Listing pages served; not part of [`Calls::total`].
    pub pages: AtomicUsize,
}

impl Calls {
    /// Total remote calls of any kind.
    pub fn total(&self) -> usize {
        [
            &self.list,
            &self.submit,
            &self.poll,
            &self.fetch,
            &self.cancel,
            &self.delete,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// An [`AgentService`] that replays a fixed script.
///
/// Statuses are handed out one per poll; the last one repeats forever.
#[derive(Debug)]
pub struct ScriptedService {
    provider: Provider,
    agents: Vec<AgentDescriptor>,
    statuses: Mutex<VecDeque<RemoteRunStatus>>,
    reply: Option<String>,
    list_error: bool,
    submit_delay: Duration,
    pub calls: Calls,
    pub prompts: Mutex<Vec<String>>,
}

impl Default for ScriptedService {
    fn default() -> Self {
        Self {
            provider: Provider::Azure,
            agents: vec![AgentDescriptor::new(AGENT_ID, "ICD-10 coder")],
            statuses: Mutex::new(VecDeque::from([
                RemoteRunStatus::Queued,
                RemoteRunStatus::InProgress,
                RemoteRunStatus::Completed,
            ])),
            reply: None,
            list_error: false,
            submit_delay: Duration::ZERO,
            calls: Calls::default(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = Some(reply.to_string());
        self
    }

    pub fn with_statuses(self, statuses: impl IntoIterator<Item = RemoteRunStatus>) -> Self {
        *self.statuses.lock().unwrap_or_else(PoisonError::into_inner) =
            statuses.into_iter().collect();
        self
    }

    pub fn with_agents(mut self, agents: Vec<AgentDescriptor>) -> Self {
        self.agents = agents;
        self
    }

    pub const fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub const fn failing_list(mut self) -> Self {
        self.list_error = true;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn bump(counter: &AtomicUsize) -> usize {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

#[async_trait]
impl AgentService for ScriptedService {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn list_agents(&self, page_size: u32) -> Result<Vec<AgentDescriptor>, TriageError> {
        bump(&self.calls.list);
        if self.list_error {
            return Err(TriageError::TransportFailure {
                operation: "list agents",
                message: "503 Service Unavailable".to_string(),
                status: Some(503),
            });
        }
        let size = usize::try_from(page_size).unwrap_or(usize::MAX).max(1);
        collect_pages(|after| {
            bump(&self.calls.pages);
            let start = after
                .and_then(|id| self.agents.iter().position(|a| a.id == id))
                .map_or(0, |i| i + 1);
            let agents: Vec<_> = self.agents.iter().skip(start).take(size).cloned().collect();
            let page = AgentPage {
                has_more: start + agents.len() < self.agents.len(),
                last_id: agents.last().map(|a| a.id.clone()),
                agents,
            };
            async move { Ok(page) }
        })
        .await
    }

    async fn submit_conversation(
        &self,
        _agent_id: &str,
        prompt: &str,
    ) -> Result<RunHandle, TriageError> {
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        let n = bump(&self.calls.submit);
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());
        Ok(RunHandle {
            thread_id: format!("thread_{n}"),
            run_id: format!("run_{n}"),
        })
    }

    async fn poll_run(&self, _run: &RunHandle) -> Result<RemoteRunStatus, TriageError> {
        bump(&self.calls.poll);
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(status.unwrap_or(RemoteRunStatus::InProgress))
    }

    async fn fetch_message(&self, _run: &RunHandle) -> Result<Option<String>, TriageError> {
        bump(&self.calls.fetch);
        Ok(self.reply.clone())
    }

    async fn cancel_run(&self, _run: &RunHandle) -> Result<(), TriageError> {
        bump(&self.calls.cancel);
        Ok(())
    }

    async fn delete_thread(&self, _thread_id: &str) -> Result<(), TriageError> {
        bump(&self.calls.delete);
        Ok(())
    }
}

/// Azure configuration with fast polling and a short timeout.
pub fn config() -> AgentConfig {
    AgentConfig::builder()
        .provider("azure")
        .tenant_id("tenant")
        .client_id("client")
        .client_secret("secret")
        .endpoint("https://hub.services.ai.azure.com/api/projects/icd")
        .poll_interval(Duration::from_millis(500))
        .run_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| unreachable!())
}

/// Orchestrator over `service` with the built-in prompt.
pub fn orchestrator(service: &Arc<ScriptedService>, config: AgentConfig) -> Orchestrator {
    let service: Arc<dyn AgentService> = Arc::clone(service) as Arc<dyn AgentService>;
    Orchestrator::new(service, config).with_prompt(PromptTemplate::default())
}

/// A request for `note` against the default scripted agent.
pub fn request(note: &str) -> RequestConfig {
    RequestConfig::new(note, Provider::Azure, AGENT_ID)
}
