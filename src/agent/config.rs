//! Service configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.
//! The resulting [`AgentConfig`] is built once at startup and shared read-only.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::core::Provider;
use crate::error::ConfigError;

/// Default interval between run status polls.
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
/// Default bound on a run, matching the hosted agent call budget.
const DEFAULT_RUN_TIMEOUT_SECS: u64 = 120;
/// Default HTTP request timeout.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Default page size when listing agents.
const DEFAULT_LIST_LIMIT: u32 = 100;
/// Default cap on note size.
const DEFAULT_MAX_NOTE_BYTES: usize = 100_000;
/// Default share of skipped lines that turns a parse into a warning.
const DEFAULT_DEGRADED_RATIO: f32 = 0.25;
/// Default Azure AI Agents REST API version.
const DEFAULT_AZURE_API_VERSION: &str = "v1";
/// Token scope for Azure AI Foundry.
pub const AZURE_AI_SCOPE: &str = "https://ai.azure.com/.default";

/// Client credentials for Microsoft Entra ID.
#[derive(Clone)]
pub struct AzureCredentials {
    /// Directory (tenant) id.
    pub tenant_id: String,
    /// Application (client) id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Authority host, overridable for sovereign clouds.
    pub authority: Url,
}

impl fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authority", &self.authority.as_str())
            .finish()
    }
}

/// Connection settings for the selected provider.
#[derive(Clone)]
pub enum ServiceSettings {
    /// Azure AI Foundry project.
    Azure {
        /// Project endpoint, e.g. `https://<hub>.services.ai.azure.com/api/projects/<name>`.
        endpoint: Url,
        /// REST API version sent as `api-version`.
        api_version: String,
        /// Entra client credentials.
        credentials: AzureCredentials,
    },
    /// `OpenAI` Assistants API.
    OpenAi {
        /// API key.
        api_key: String,
        /// Optional base URL override (for proxies or compatible APIs).
        base_url: Option<String>,
    },
}

impl fmt::Debug for ServiceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Azure {
                endpoint,
                api_version,
                credentials,
            } => f
                .debug_struct("Azure")
                .field("endpoint", &endpoint.as_str())
                .field("api_version", api_version)
                .field("credentials", credentials)
                .finish(),
            Self::OpenAi { base_url, .. } => f
                .debug_struct("OpenAi")
                .field("api_key", &"<redacted>")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

/// Configuration for talking to the remote agent service.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Provider-specific connection settings.
    pub service: ServiceSettings,
    /// Agent used when the caller does not pick one.
    pub default_agent_id: Option<String>,
    /// Interval between run status polls.
    pub poll_interval: Duration,
    /// Bound on a single run from creation to terminal state.
    pub run_timeout: Duration,
    /// Timeout for individual HTTP requests.
    pub request_timeout: Duration,
    /// Page size when listing agents; every page is fetched.
    pub list_limit: u32,
    /// Largest note accepted, in bytes.
    pub max_note_bytes: usize,
    /// Share of skipped lines at which a parse is reported as degraded.
    pub degraded_ratio: f32,
    /// Delete the conversation thread after a completed run.
    pub cleanup_threads: bool,
    /// Prompt template file overriding the compiled-in instructions.
    pub prompt_file: Option<PathBuf>,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().from_env().build()
    }

    /// The provider these settings connect to.
    #[must_use]
    pub const fn provider(&self) -> Provider {
        match self.service {
            ServiceSettings::Azure { .. } => Provider::Azure,
            ServiceSettings::OpenAi { .. } => Provider::OpenAi,
        }
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    authority: Option<String>,
    endpoint: Option<String>,
    api_version: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    default_agent_id: Option<String>,
    poll_interval: Option<Duration>,
    run_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    list_limit: Option<u32>,
    max_note_bytes: Option<usize>,
    degraded_ratio: Option<f32>,
    cleanup_threads: Option<bool>,
    prompt_file: Option<PathBuf>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = env_var("ICD_TRIAGE_PROVIDER");
        }
        if self.tenant_id.is_none() {
            self.tenant_id = env_var("AZURE_TENANT_ID");
        }
        if self.client_id.is_none() {
            self.client_id = env_var("AZURE_CLIENT_ID");
        }
        if self.client_secret.is_none() {
            self.client_secret = env_var("AZURE_CLIENT_SECRET");
        }
        if self.authority.is_none() {
            self.authority = env_var("AZURE_AUTHORITY_HOST");
        }
        if self.endpoint.is_none() {
            self.endpoint = env_var("AZURE_AI_PROJECT_ENDPOINT");
        }
        if self.api_version.is_none() {
            self.api_version = env_var("AZURE_AI_API_VERSION");
        }
        if self.api_key.is_none() {
            self.api_key = env_var("OPENAI_API_KEY");
        }
        if self.base_url.is_none() {
            self.base_url = env_var("OPENAI_BASE_URL");
        }
        if self.default_agent_id.is_none() {
            self.default_agent_id = env_var("AZURE_AI_AGENT_AGENT")
                .or_else(|| env_var("ICD_TRIAGE_AGENT_ID"));
        }
        if self.poll_interval.is_none() {
            self.poll_interval = env_var("ICD_TRIAGE_POLL_INTERVAL_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis);
        }
        if self.run_timeout.is_none() {
            self.run_timeout = env_var("ICD_TRIAGE_RUN_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs);
        }
        if self.prompt_file.is_none() {
            self.prompt_file = env_var("ICD_TRIAGE_PROMPT_FILE").map(PathBuf::from);
        }
        self
    }

    /// Sets the provider name (`azure` or `openai`).
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the Entra tenant id.
    #[must_use]
    pub fn tenant_id(mut self, id: impl Into<String>) -> Self {
        self.tenant_id = Some(id.into());
        self
    }

    /// Sets the Entra client id.
    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Sets the Entra client secret.
    #[must_use]
    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the Entra authority host.
    #[must_use]
    pub fn authority(mut self, url: impl Into<String>) -> Self {
        self.authority = Some(url.into());
        self
    }

    /// Sets the Azure AI project endpoint.
    #[must_use]
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Sets the Azure REST API version.
    #[must_use]
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Sets the `OpenAI` API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the `OpenAI` base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the default agent id.
    #[must_use]
    pub fn default_agent_id(mut self, id: impl Into<String>) -> Self {
        self.default_agent_id = Some(id.into());
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Sets the run timeout.
    #[must_use]
    pub const fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the agent listing page size.
    #[must_use]
    pub const fn list_limit(mut self, n: u32) -> Self {
        self.list_limit = Some(n);
        self
    }

    /// Sets the maximum note size in bytes.
    #[must_use]
    pub const fn max_note_bytes(mut self, n: usize) -> Self {
        self.max_note_bytes = Some(n);
        self
    }

    /// Sets the degraded-parse warning ratio.
    #[must_use]
    pub const fn degraded_ratio(mut self, ratio: f32) -> Self {
        self.degraded_ratio = Some(ratio);
        self
    }

    /// Deletes threads after completed runs.
    #[must_use]
    pub const fn cleanup_threads(mut self, yes: bool) -> Self {
        self.cleanup_threads = Some(yes);
        self
    }

    /// Sets the prompt template file.
    #[must_use]
    pub fn prompt_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.prompt_file = Some(path.into());
        self
    }

    /// Builds the [`AgentConfig`].
    pub fn build(self) -> Result<AgentConfig, ConfigError> {
        let provider: Provider = self
            .provider
            .as_deref()
            .unwrap_or("azure")
            .parse()
            .map_err(|_| ConfigError::UnsupportedProvider {
                name: self.provider.clone().unwrap_or_default(),
            })?;

        let service = match provider {
            Provider::Azure => {
                let endpoint = self.endpoint.ok_or(ConfigError::Missing {
                    name: "project endpoint",
                    env: "AZURE_AI_PROJECT_ENDPOINT",
                })?;
                let endpoint = parse_url("project endpoint", &endpoint)?;
                let authority = parse_url(
                    "authority host",
                    self.authority
                        .as_deref()
                        .unwrap_or("https://login.microsoftonline.com"),
                )?;
                ServiceSettings::Azure {
                    endpoint,
                    api_version: self
                        .api_version
                        .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
                    credentials: AzureCredentials {
                        tenant_id: self.tenant_id.ok_or(ConfigError::Missing {
                            name: "tenant id",
                            env: "AZURE_TENANT_ID",
                        })?,
                        client_id: self.client_id.ok_or(ConfigError::Missing {
                            name: "client id",
                            env: "AZURE_CLIENT_ID",
                        })?,
                        client_secret: self.client_secret.ok_or(ConfigError::Missing {
                            name: "client secret",
                            env: "AZURE_CLIENT_SECRET",
                        })?,
                        authority,
                    },
                }
            }
            Provider::OpenAi => ServiceSettings::OpenAi {
                api_key: self.api_key.ok_or(ConfigError::Missing {
                    name: "API key",
                    env: "OPENAI_API_KEY",
                })?,
                base_url: self.base_url,
            },
        };

        let poll_interval = self
            .poll_interval
            .unwrap_or(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "poll interval",
                message: "must be greater than zero".to_string(),
            });
        }

        let degraded_ratio = self.degraded_ratio.unwrap_or(DEFAULT_DEGRADED_RATIO);
        if !(0.0..=1.0).contains(&degraded_ratio) {
            return Err(ConfigError::InvalidValue {
                name: "degraded ratio",
                message: format!("{degraded_ratio} is outside 0.0..=1.0"),
            });
        }

        Ok(AgentConfig {
            service,
            default_agent_id: self.default_agent_id,
            poll_interval,
            run_timeout: self
                .run_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS)),
            request_timeout: self
                .request_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            list_limit: self.list_limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 100),
            max_note_bytes: self.max_note_bytes.unwrap_or(DEFAULT_MAX_NOTE_BYTES),
            degraded_ratio,
            cleanup_threads: self.cleanup_threads.unwrap_or(false),
            prompt_file: self.prompt_file,
        })
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        name,
        message: e.to_string(),
    })
}
