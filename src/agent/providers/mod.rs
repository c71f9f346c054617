//! Concrete [`AgentService`](super::AgentService) backends.

pub mod azure;
#[cfg(feature = "openai")]
pub mod openai;

pub use azure::AzureAgentService;
#[cfg(feature = "openai")]
pub use openai::OpenAiAgentService;
