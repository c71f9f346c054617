//! Remote agent integration for icd-triage.
//!
//! Sends one clinical note to a hosted agent and turns its reply into ICD-10
//! code candidates. The transport is a pluggable [`AgentService`] backed by
//! Azure AI Foundry Agents or the `OpenAI` Assistants API.
//!
//! # Architecture
//!
//! ```text
//! RequestConfig → Orchestrator
//!   ├── validate locally (note, agent, provider, size)
//!   ├── AgentService::list_agents (agent still deployed?)
//!   ├── PromptTemplate::build → AgentService::submit_conversation
//!   ├── wait_for_terminal (poll loop over run::transition)
//!   ├── AgentService::fetch_message
//!   └── parse_response → Vec<CodeCandidate>
//! ```

pub mod client;
pub mod config;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod providers;
pub mod run;
pub mod service;

// Re-export key types
pub use client::create_service;
pub use config::{AgentConfig, AgentConfigBuilder, AzureCredentials, ServiceSettings};
pub use orchestrator::{Orchestrator, TriageOutcome, TriageWarning};
pub use parser::{ParsedResponse, parse_response};
pub use prompt::PromptTemplate;
pub use run::{PollOutcome, RunPhase, transition, wait_for_terminal};
pub use service::{AgentPage, AgentService, RemoteRunStatus, RunHandle, collect_pages};
