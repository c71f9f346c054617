//! Pluggable remote agent service trait.
//!
//! Implementations translate the thread/message/run conversation protocol
//! into provider-specific calls. This keeps the orchestrator decoupled from
//! any particular vendor and lets tests substitute a scripted service.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{AgentDescriptor, Provider};
use crate::error::TriageError;

/// Identifies one run on one conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunHandle {
    /// Server-side thread id.
    pub thread_id: String,
    /// Server-side run id.
    pub run_id: String,
}

/// Run status as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRunStatus {
    /// Waiting for capacity.
    Queued,
    /// Executing.
    InProgress,
    /// The agent is waiting for tool outputs from the client.
    RequiresAction,
    /// Cancellation requested but not yet effective.
    Cancelling,
    /// Cancelled.
    Cancelled,
    /// Failed, with the service's error detail.
    Failed {
        /// Error detail, empty when the service gave none.
        message: String,
    },
    /// Finished successfully.
    Completed,
    /// Stopped early (token or turn limits).
    Incomplete,
    /// Exceeded the service-side deadline.
    Expired,
    /// A status this client does not know.
    Unknown(String),
}

impl RemoteRunStatus {
    /// Maps a wire status string to a status.
    ///
    /// `failed` carries no message here; providers attach `last_error`
    /// themselves.
    #[must_use]
    pub fn from_wire(status: &str) -> Self {
        match status {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "requires_action" => Self::RequiresAction,
            "cancelling" => Self::Cancelling,
            "cancelled" => Self::Cancelled,
            "failed" => Self::Failed {
                message: String::new(),
            },
            "completed" => Self::Completed,
            "incomplete" => Self::Incomplete,
            "expired" => Self::Expired,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The wire name of this status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed { .. } => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for RemoteRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of an agent listing.
#[derive(Debug, Clone, Default)]
pub struct AgentPage {
    /// Agents on this page.
    pub agents: Vec<AgentDescriptor>,
    /// Whether the server holds more agents after this page.
    pub has_more: bool,
    /// Cursor for the next page, when the server reports one.
    pub last_id: Option<String>,
}

/// Follows `after` cursors until the server reports no more pages.
///
/// `fetch` receives the cursor of the previous page (`None` for the first).
/// Stops early if a page is empty or repeats the previous cursor.
pub async fn collect_pages<F, Fut>(mut fetch: F) -> Result<Vec<AgentDescriptor>, TriageError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<AgentPage, TriageError>>,
{
    let mut agents = Vec::new();
    let mut after: Option<String> = None;
    loop {
        let page = fetch(after.clone()).await?;
        let next = page
            .last_id
            .or_else(|| page.agents.last().map(|a| a.id.clone()));
        let exhausted = !page.has_more || page.agents.is_empty();
        agents.extend(page.agents);

        match next {
            Some(cursor) if !exhausted && after.as_deref() != Some(cursor.as_str()) => {
                after = Some(cursor);
            }
            _ => return Ok(agents),
        }
    }
}

/// Trait for remote agent service backends.
///
/// Implementations handle the transport layer (HTTP, SDK calls, auth) for
/// one provider while presenting a uniform conversational interface to the
/// orchestrator. All failures surface as
/// [`TriageError::TransportFailure`].
#[async_trait]
pub trait AgentService: Send + Sync {
    /// The provider family this service talks to.
    fn provider(&self) -> Provider;

    /// Lists every agent currently deployed, requesting `page_size` per call.
    async fn list_agents(&self, page_size: u32) -> Result<Vec<AgentDescriptor>, TriageError>;

    /// Creates a fresh thread, posts `prompt` as the single user message,
    /// and starts one run of `agent_id` on it.
    async fn submit_conversation(
        &self,
        agent_id: &str,
        prompt: &str,
    ) -> Result<RunHandle, TriageError>;

    /// Reads the current status of a run.
    async fn poll_run(&self, run: &RunHandle) -> Result<RemoteRunStatus, TriageError>;

    /// Returns the text of the latest assistant message on the run's thread.
    ///
    /// `Ok(None)` means the run finished without producing assistant text.
    async fn fetch_message(&self, run: &RunHandle) -> Result<Option<String>, TriageError>;

    /// Requests cancellation of an in-flight run.
    async fn cancel_run(&self, run: &RunHandle) -> Result<(), TriageError>;

    /// Deletes a thread and everything on it.
    async fn delete_thread(&self, thread_id: &str) -> Result<(), TriageError>;
}
