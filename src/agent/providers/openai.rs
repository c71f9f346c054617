//! `OpenAI` Assistants backend using the `async-openai` crate.
//!
//! Assistants play the role of agents; the thread/message/run protocol is
//! the same one Azure AI Foundry exposes. Supports `OpenAI`-compatible
//! APIs via the base URL override in [`AgentConfig`].

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    CreateMessageRequestArgs, CreateMessageRequestContent, CreateRunRequestArgs,
    CreateThreadRequestArgs, MessageContent, MessageObject, MessageRole, RunObject, RunStatus,
};
use async_trait::async_trait;

use crate::agent::config::{AgentConfig, ServiceSettings};
use crate::agent::service::{AgentPage, AgentService, RemoteRunStatus, RunHandle, collect_pages};
use crate::core::{AgentDescriptor, Provider};
use crate::error::{ConfigError, TriageError};

/// Messages read when looking for the assistant reply.
const MESSAGE_PAGE: &str = "20";

/// `OpenAI` Assistants agent service.
pub struct OpenAiAgentService {
    client: Client<OpenAIConfig>,
}

impl OpenAiAgentService {
    async fn agent_page(
        &self,
        page_size: u32,
        after: Option<String>,
    ) -> Result<AgentPage, TriageError> {
        let mut query = vec![("limit", page_size.to_string())];
        if let Some(after) = after {
            query.push(("after", after));
        }
        let page = self
            .client
            .assistants()
            .list(&query)
            .await
            .map_err(transport("list agents"))?;
        Ok(AgentPage {
            agents: page
                .data
                .into_iter()
                .map(|a| AgentDescriptor::new(a.id, a.name.unwrap_or_default()))
                .collect(),
            has_more: page.has_more,
            last_id: page.last_id,
        })
    }

    /// Creates a service from `OpenAI` connection settings.
    pub fn new(config: &AgentConfig) -> Result<Self, ConfigError> {
        let ServiceSettings::OpenAi { api_key, base_url } = &config.service else {
            return Err(ConfigError::UnsupportedProvider {
                name: config.provider().to_string(),
            });
        };

        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Ok(Self {
            client: Client::with_config(openai_config),
        })
    }
}

impl std::fmt::Debug for OpenAiAgentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAgentService")
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

fn transport(operation: &'static str) -> impl FnOnce(OpenAIError) -> TriageError {
    move |e| match e {
        OpenAIError::ApiError(api) => TriageError::transport(operation, api.message),
        other => TriageError::transport(operation, other.to_string()),
    }
}

fn run_status(run: RunObject) -> RemoteRunStatus {
    match run.status {
        RunStatus::Queued => RemoteRunStatus::Queued,
        RunStatus::InProgress => RemoteRunStatus::InProgress,
        RunStatus::RequiresAction => RemoteRunStatus::RequiresAction,
        RunStatus::Cancelling => RemoteRunStatus::Cancelling,
        RunStatus::Cancelled => RemoteRunStatus::Cancelled,
        RunStatus::Failed => RemoteRunStatus::Failed {
            message: run.last_error.map(|e| e.message).unwrap_or_default(),
        },
        RunStatus::Completed => RemoteRunStatus::Completed,
        RunStatus::Incomplete => RemoteRunStatus::Incomplete,
        RunStatus::Expired => RemoteRunStatus::Expired,
        #[allow(unreachable_patterns)]
        other => RemoteRunStatus::Unknown(format!("{other:?}").to_lowercase()),
    }
}

/// Text of the newest assistant message, preferring the one tied to `run_id`.
fn latest_reply(messages: &[MessageObject], run_id: &str) -> Option<String> {
    let assistant = |m: &&MessageObject| matches!(m.role, MessageRole::Assistant);
    let message = messages
        .iter()
        .filter(assistant)
        .find(|m| m.run_id.as_deref() == Some(run_id))
        .or_else(|| messages.iter().find(assistant))?;

    let text = message
        .content
        .iter()
        .filter_map(|part| match part {
            MessageContent::Text(t) => Some(t.text.value.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    (!text.trim().is_empty()).then_some(text)
}

#[async_trait]
impl AgentService for OpenAiAgentService {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn list_agents(&self, page_size: u32) -> Result<Vec<AgentDescriptor>, TriageError> {
        collect_pages(|after| self.agent_page(page_size, after)).await
    }

    async fn submit_conversation(
        &self,
        agent_id: &str,
        prompt: &str,
    ) -> Result<RunHandle, TriageError> {
        let thread = self
            .client
            .threads()
            .create(
                CreateThreadRequestArgs::default()
                    .build()
                    .map_err(transport("create thread"))?,
            )
            .await
            .map_err(transport("create thread"))?;

        let message = CreateMessageRequestArgs::default()
            .role(MessageRole::User)
            .content(CreateMessageRequestContent::Content(prompt.to_string()))
            .build()
            .map_err(transport("post message"))?;
        let run = CreateRunRequestArgs::default()
            .assistant_id(agent_id)
            .build()
            .map_err(transport("create run"))?;

        let threads = self.client.threads();
        let started = async {
            threads
                .messages(&thread.id)
                .create(message)
                .await
                .map_err(transport("post message"))?;
            threads
                .runs(&thread.id)
                .create(run)
                .await
                .map_err(transport("create run"))
        }
        .await;

        match started {
            Ok(run) => Ok(RunHandle {
                thread_id: thread.id,
                run_id: run.id,
            }),
            Err(e) => {
                if let Err(cleanup) = self.delete_thread(&thread.id).await {
                    tracing::debug!(thread_id = %thread.id, error = %cleanup, "orphaned thread not deleted");
                }
                Err(e)
            }
        }
    }

    async fn poll_run(&self, run: &RunHandle) -> Result<RemoteRunStatus, TriageError> {
        let object = self
            .client
            .threads()
            .runs(&run.thread_id)
            .retrieve(&run.run_id)
            .await
            .map_err(transport("poll run"))?;
        Ok(run_status(object))
    }

    async fn fetch_message(&self, run: &RunHandle) -> Result<Option<String>, TriageError> {
        let page = self
            .client
            .threads()
            .messages(&run.thread_id)
            .list(&[("order", "desc"), ("limit", MESSAGE_PAGE)])
            .await
            .map_err(transport("fetch message"))?;
        Ok(latest_reply(&page.data, &run.run_id))
    }

    async fn cancel_run(&self, run: &RunHandle) -> Result<(), TriageError> {
        self.client
            .threads()
            .runs(&run.thread_id)
            .cancel(&run.run_id)
            .await
            .map_err(transport("cancel run"))?;
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), TriageError> {
        self.client
            .threads()
            .delete(thread_id)
            .await
            .map_err(transport("delete thread"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig::builder()
            .provider("openai")
            .api_key("sk-test")
            .base_url("http://localhost:4010/v1")
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn test_new_from_openai_settings() {
        let service = OpenAiAgentService::new(&config()).unwrap_or_else(|_| unreachable!());
        assert_eq!(service.provider(), Provider::OpenAi);
        assert!(format!("{service:?}").contains("OpenAiAgentService"));
    }

    #[test]
    fn test_rejects_azure_settings() {
        let config = AgentConfig::builder()
            .provider("azure")
            .tenant_id("t")
            .client_id("c")
            .client_secret("s")
            .endpoint("https://hub.services.ai.azure.com/api/projects/icd")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(OpenAiAgentService::new(&config).is_err());
    }

    #[test]
    fn test_transport_maps_errors() {
        let err = transport("create run")(OpenAIError::InvalidArgument("bad".into()));
        assert!(matches!(
            err,
            TriageError::TransportFailure {
                operation: "create run",
                ..
            }
        ));
    }
}
