//! Azure AI Foundry Agents backend over the REST API.
//!
//! Authenticates with Microsoft Entra ID client credentials and drives the
//! `threads` / `messages` / `runs` endpoints of a Foundry project. Access
//! tokens are cached until shortly before they expire.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::agent::config::{AZURE_AI_SCOPE, AgentConfig, AzureCredentials, ServiceSettings};
use crate::agent::service::{AgentPage, AgentService, RemoteRunStatus, RunHandle, collect_pages};
use crate::core::{AgentDescriptor, Provider};
use crate::error::{ConfigError, TriageError};

/// Tokens are refreshed this long before their stated expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// Messages read when looking for the assistant reply.
const MESSAGE_PAGE: &str = "20";
/// Longest error body kept in a transport message.
const MAX_ERROR_BODY: usize = 300;

/// Azure AI Foundry agent service.
pub struct AzureAgentService {
    http: Client,
    endpoint: Url,
    api_version: String,
    credentials: AzureCredentials,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl AzureAgentService {
    async fn agent_page(
        &self,
        page_size: u32,
        after: Option<String>,
    ) -> Result<AgentPage, TriageError> {
        let mut query = vec![("limit", page_size.to_string())];
        if let Some(after) = after {
            query.push(("after", after));
        }
        let request = self
            .request(Method::GET, "assistants")
            .await?
            .query(&query);
        let page: ListResponse<AgentObject> = self.send("list agents", request).await?;
        Ok(page.into_agent_page())
    }

    /// Creates a service from Azure connection settings.
    pub fn new(config: &AgentConfig) -> Result<Self, ConfigError> {
        let ServiceSettings::Azure {
            endpoint,
            api_version,
            credentials,
        } = &config.service
        else {
            return Err(ConfigError::UnsupportedProvider {
                name: config.provider().to_string(),
            });
        };

        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                name: "http client",
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            endpoint: endpoint.clone(),
            api_version: api_version.clone(),
            credentials: credentials.clone(),
            token: Mutex::new(None),
        })
    }

    /// Returns a valid bearer token, fetching a new one when needed.
    async fn access_token(&self) -> Result<String, TriageError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at
        {
            return Ok(token.value.clone());
        }

        let url = token_url(&self.credentials.authority, &self.credentials.tenant_id);
        let response = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("scope", AZURE_AI_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| TriageError::transport("authenticate", e.to_string()))?;
        let token: TokenResponse = decode("authenticate", response).await?;

        debug!(expires_in = token.expires_in, "acquired Entra access token");
        let value = token.access_token;
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    /// Starts an authenticated request against the project endpoint.
    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, TriageError> {
        let token = self.access_token().await?;
        Ok(self
            .http
            .request(method, api_url(&self.endpoint, path))
            .bearer_auth(token)
            .query(&[("api-version", self.api_version.as_str())]))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, TriageError> {
        let response = request
            .send()
            .await
            .map_err(|e| TriageError::transport(operation, e.to_string()))?;
        decode(operation, response).await
    }

    async fn start_run(&self, thread_id: &str, agent_id: &str, prompt: &str) -> Result<String, TriageError> {
        let message = self
            .request(Method::POST, &format!("threads/{thread_id}/messages"))
            .await?
            .json(&json!({ "role": "user", "content": prompt }));
        let _: IdObject = self.send("post message", message).await?;

        let run = self
            .request(Method::POST, &format!("threads/{thread_id}/runs"))
            .await?
            .json(&json!({ "assistant_id": agent_id }));
        let run: IdObject = self.send("create run", run).await?;
        Ok(run.id)
    }
}

impl std::fmt::Debug for AzureAgentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureAgentService")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_version", &self.api_version)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AgentService for AzureAgentService {
    fn provider(&self) -> Provider {
        Provider::Azure
    }

    async fn list_agents(&self, page_size: u32) -> Result<Vec<AgentDescriptor>, TriageError> {
        collect_pages(|after| self.agent_page(page_size, after)).await
    }

    async fn submit_conversation(
        &self,
        agent_id: &str,
        prompt: &str,
    ) -> Result<RunHandle, TriageError> {
        let request = self.request(Method::POST, "threads").await?.json(&json!({}));
        let thread: IdObject = self.send("create thread", request).await?;

        match self.start_run(&thread.id, agent_id, prompt).await {
            Ok(run_id) => Ok(RunHandle {
                thread_id: thread.id,
                run_id,
            }),
            Err(e) => {
                if let Err(cleanup) = self.delete_thread(&thread.id).await {
                    debug!(thread_id = %thread.id, error = %cleanup, "orphaned thread not deleted");
                }
                Err(e)
            }
        }
    }

    async fn poll_run(&self, run: &RunHandle) -> Result<RemoteRunStatus, TriageError> {
        let request = self
            .request(
                Method::GET,
                &format!("threads/{}/runs/{}", run.thread_id, run.run_id),
            )
            .await?;
        let object: RunObject = self.send("poll run", request).await?;
        Ok(object.status())
    }

    async fn fetch_message(&self, run: &RunHandle) -> Result<Option<String>, TriageError> {
        let request = self
            .request(Method::GET, &format!("threads/{}/messages", run.thread_id))
            .await?
            .query(&[("order", "desc"), ("limit", MESSAGE_PAGE)]);
        let page: ListResponse<MessageObject> = self.send("fetch message", request).await?;
        Ok(latest_reply(&page.data, &run.run_id))
    }

    async fn cancel_run(&self, run: &RunHandle) -> Result<(), TriageError> {
        let request = self
            .request(
                Method::POST,
                &format!("threads/{}/runs/{}/cancel", run.thread_id, run.run_id),
            )
            .await?;
        let _: serde_json::Value = self.send("cancel run", request).await?;
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), TriageError> {
        let request = self
            .request(Method::DELETE, &format!("threads/{thread_id}"))
            .await?;
        let _: serde_json::Value = self.send("delete thread", request).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

const fn default_expires_in() -> u64 {
    3_600
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

impl ListResponse<AgentObject> {
    fn into_agent_page(self) -> AgentPage {
        AgentPage {
            agents: self
                .data
                .into_iter()
                .map(|a| AgentDescriptor::new(a.id, a.name.unwrap_or_default()))
                .collect(),
            has_more: self.has_more,
            last_id: self.last_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AgentObject {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    status: String,
    #[serde(default)]
    last_error: Option<LastError>,
}

impl RunObject {
    fn status(self) -> RemoteRunStatus {
        match RemoteRunStatus::from_wire(&self.status) {
            RemoteRunStatus::Failed { .. } => RemoteRunStatus::Failed {
                message: self.last_error.map(LastError::describe).unwrap_or_default(),
            },
            other => other,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LastError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl LastError {
    fn describe(self) -> String {
        match (self.code, self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(s), None) | (None, Some(s)) => s,
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    role: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

fn token_url(authority: &Url, tenant_id: &str) -> String {
    format!(
        "{}/{tenant_id}/oauth2/v2.0/token",
        authority.as_str().trim_end_matches('/')
    )
}

fn api_url(endpoint: &Url, path: &str) -> String {
    format!("{}/{path}", endpoint.as_str().trim_end_matches('/'))
}

/// Text of the newest assistant message, preferring the one tied to `run_id`.
///
/// `messages` is expected newest first.
fn latest_reply(messages: &[MessageObject], run_id: &str) -> Option<String> {
    let assistant = |m: &&MessageObject| m.role == "assistant";
    let message = messages
        .iter()
        .filter(assistant)
        .find(|m| m.run_id.as_deref() == Some(run_id))
        .or_else(|| messages.iter().find(assistant))?;

    let text = message
        .content
        .iter()
        .filter_map(|part| part.text.as_ref())
        .map(|t| t.value.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    (!text.trim().is_empty()).then_some(text)
}

/// Pulls a readable message out of an error body.
fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY).collect());
    if detail.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", detail.trim())
    }
}

async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<T, TriageError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TriageError::TransportFailure {
            operation,
            message: error_message(status, &body),
            status: Some(status.as_u16()),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| TriageError::transport(operation, e.to_string()))?;
    let body = if body.trim().is_empty() { "null" } else { &body };
    serde_json::from_str(body).map_err(|e| TriageError::TransportFailure {
        operation,
        message: format!("unexpected response: {e}"),
        status: Some(status.as_u16()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(raw: &str) -> Vec<MessageObject> {
        serde_json::from_str::<ListResponse<MessageObject>>(raw)
            .unwrap_or_else(|_| unreachable!())
            .data
    }

    #[test]
    fn test_agent_list_page_cursor() {
        let raw = r#"{"object": "list", "data": [{"id": "asst_1", "name": "Coder"}, {"id": "asst_2", "name": null}], "first_id": "asst_1", "last_id": "asst_2", "has_more": true}"#;
        let page = serde_json::from_str::<ListResponse<AgentObject>>(raw)
            .unwrap_or_else(|_| unreachable!())
            .into_agent_page();
        assert_eq!(page.agents.len(), 2);
        assert_eq!(page.agents[1].display_name, "");
        assert!(page.has_more);
        assert_eq!(page.last_id.as_deref(), Some("asst_2"));

        let last = serde_json::from_str::<ListResponse<AgentObject>>(r#"{"data": []}"#)
            .unwrap_or_else(|_| unreachable!())
            .into_agent_page();
        assert!(!last.has_more);
    }

    #[test]
    fn test_urls() {
        let authority = Url::parse("https://login.microsoftonline.com/").unwrap_or_else(|_| unreachable!());
        assert_eq!(
            token_url(&authority, "tenant-1"),
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );

        let endpoint = Url::parse("https://hub.services.ai.azure.com/api/projects/triage")
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(
            api_url(&endpoint, "threads/t1/runs"),
            "https://hub.services.ai.azure.com/api/projects/triage/threads/t1/runs"
        );
    }

    #[test]
    fn test_latest_reply_prefers_run() {
        let data = messages(
            r#"{"data": [
                {"role": "assistant", "run_id": "run_other", "content": [{"type": "text", "text": {"value": "stale"}}]},
                {"role": "assistant", "run_id": "run_1", "content": [{"type": "text", "text": {"value": "E11.9 - diabetes"}}]},
                {"role": "user", "content": [{"type": "text", "text": {"value": "note"}}]}
            ]}"#,
        );
        assert_eq!(latest_reply(&data, "run_1").as_deref(), Some("E11.9 - diabetes"));
        assert_eq!(latest_reply(&data, "run_missing").as_deref(), Some("stale"));
    }

    #[test]
    fn test_latest_reply_none_without_text() {
        let data = messages(
            r#"{"data": [
                {"role": "assistant", "run_id": "run_1", "content": [{"type": "image_file"}]},
                {"role": "user", "content": [{"type": "text", "text": {"value": "note"}}]}
            ]}"#,
        );
        assert_eq!(latest_reply(&data, "run_1"), None);
        assert_eq!(latest_reply(&[], "run_1"), None);
    }

    #[test]
    fn test_run_status_carries_last_error() {
        let run: RunObject = serde_json::from_str(
            r#"{"status": "failed", "last_error": {"code": "rate_limit_exceeded", "message": "slow down"}}"#,
        )
        .unwrap_or_else(|_| unreachable!());
        assert_eq!(
            run.status(),
            RemoteRunStatus::Failed {
                message: "rate_limit_exceeded: slow down".to_string()
            }
        );

        let run: RunObject =
            serde_json::from_str(r#"{"status": "in_progress"}"#).unwrap_or_else(|_| unreachable!());
        assert_eq!(run.status(), RemoteRunStatus::InProgress);
    }

    #[test]
    fn test_error_message_extraction() {
        let msg = error_message(
            StatusCode::NOT_FOUND,
            r#"{"error": {"code": "NotFound", "message": "No assistant found"}}"#,
        );
        assert_eq!(msg, "404 Not Found: No assistant found");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "502 Bad Gateway");
    }

    #[test]
    fn test_rejects_openai_settings() {
        let config = AgentConfig::builder()
            .provider("openai")
            .api_key("sk-test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            AzureAgentService::new(&config),
            Err(ConfigError::UnsupportedProvider { .. })
        ));
    }
}
