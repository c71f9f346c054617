//! Service registry and factory.
//!
//! Maps the configured provider to a concrete [`AgentService`].

use std::sync::Arc;

use crate::agent::config::AgentConfig;
use crate::agent::providers::AzureAgentService;
use crate::agent::service::AgentService;
use crate::core::Provider;
use crate::error::ConfigError;

/// Creates an [`AgentService`] for the configured provider.
///
/// # Supported Providers
///
/// - `"azure"` (default): Azure AI Foundry Agents over REST
/// - `"openai"`: `OpenAI` Assistants via `async-openai` (feature `openai`)
///
/// # Errors
///
/// Returns [`ConfigError::UnsupportedProvider`] when the provider's
/// backend was not compiled in.
pub fn create_service(config: &AgentConfig) -> Result<Arc<dyn AgentService>, ConfigError> {
    match config.provider() {
        Provider::Azure => Ok(Arc::new(AzureAgentService::new(config)?)),
        #[cfg(feature = "openai")]
        Provider::OpenAi => Ok(Arc::new(crate::agent::providers::OpenAiAgentService::new(
            config,
        )?)),
        #[cfg(not(feature = "openai"))]
        Provider::OpenAi => Err(ConfigError::UnsupportedProvider {
            name: "openai (built without the `openai` feature)".to_string(),
        }),
    }
}
