//! Error types for icd-triage.
//!
//! Each layer has its own enum: [`ConfigError`] for service configuration,
//! [`TriageError`] for a single analysis request, and [`ValidationError`]
//! for the review/export surface. [`Error`] unifies them for callers that
//! do not care which layer failed.

use std::time::Duration;

use thiserror::Error;

/// Result alias using the crate-wide [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, Error)]
pub enum Error {
    /// Service configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An analysis request failed.
    #[error(transparent)]
    Triage(#[from] TriageError),

    /// Review or export failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A CLI command could not run.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O failure outside of export (reading notes, prompt files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// CLI command errors.
#[derive(Debug, Error)]
pub enum CommandError {
    /// An argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The command failed while running.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Output could not be rendered.
    #[error("output formatting failed: {0}")]
    OutputFormat(String),
}

/// Errors raised while building [`AgentConfig`](crate::agent::AgentConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting was neither given explicitly nor found in the environment.
    #[error("missing required setting {name} (set the {env} environment variable)")]
    Missing {
        /// Setting name.
        name: &'static str,
        /// Environment variable that supplies it.
        env: &'static str,
    },

    /// A URL setting did not parse.
    #[error("invalid URL for {name}: {message}")]
    InvalidUrl {
        /// Setting name.
        name: &'static str,
        /// Parser message.
        message: String,
    },

    /// The configured provider is not known or not compiled in.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name as given.
        name: String,
    },

    /// A numeric or duration setting was out of range.
    #[error("invalid value for {name}: {message}")]
    InvalidValue {
        /// Setting name.
        name: &'static str,
        /// Why it was rejected.
        message: String,
    },
}

/// Errors from a single `submit` or `list_agents` call.
///
/// Every variant is scoped to one call; none is fatal to the process and
/// none is retried automatically.
#[derive(Debug, Error)]
pub enum TriageError {
    /// The request was rejected before any remote call was made.
    #[error("invalid request: {reason}")]
    ConfigInvalid {
        /// Human-readable reason.
        reason: String,
    },

    /// The remote service could not be reached or answered with an error.
    #[error("{operation} failed: {message}")]
    TransportFailure {
        /// Remote operation that failed (e.g. `"create thread"`).
        operation: &'static str,
        /// Transport or API message.
        message: String,
        /// HTTP status, when one was received.
        status: Option<u16>,
    },

    /// The remote run ended in a non-successful terminal state.
    #[error("agent run ended with status {status}: {message}")]
    RunFailed {
        /// Terminal status as reported by the service.
        status: String,
        /// Error detail from the service, if any.
        message: String,
    },

    /// The run did not reach a terminal state within the configured bound.
    #[error("agent run did not finish within {}s", .elapsed.as_secs())]
    Timeout {
        /// Time spent polling.
        elapsed: Duration,
    },

    /// The caller abandoned the request while it was in flight.
    #[error("analysis cancelled")]
    Cancelled,
}

impl TriageError {
    /// Shorthand for [`TriageError::ConfigInvalid`].
    pub fn config_invalid(reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`TriageError::TransportFailure`] without a status.
    pub fn transport(operation: &'static str, message: impl Into<String>) -> Self {
        Self::TransportFailure {
            operation,
            message: message.into(),
            status: None,
        }
    }

    /// Whether re-submitting the same request could succeed.
    ///
    /// Configuration problems will fail again until the input changes.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportFailure { .. } | Self::RunFailed { .. } | Self::Timeout { .. }
        )
    }
}

/// Errors from the review/export surface.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A row index did not refer to a candidate.
    #[error("row {index} out of range ({len} candidates)")]
    OutOfRange {
        /// Requested row (0-based).
        index: usize,
        /// Number of rows available.
        len: usize,
    },

    /// A selection expression could not be parsed.
    #[error("invalid selection {input:?}: {message}")]
    InvalidSelection {
        /// Raw selection text.
        input: String,
        /// Parse problem.
        message: String,
    },

    /// Writing the export failed.
    #[error("export failed: {0}")]
    Export(#[from] std::io::Error),

    /// CSV encoding of the export failed.
    #[error("export encoding failed: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding of the export failed.
    #[error("export encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_invalid_display() {
        let err = TriageError::config_invalid("note is empty");
        assert_eq!(err.to_string(), "invalid request: note is empty");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_transport_display() {
        let err = TriageError::transport("create thread", "connection refused");
        assert_eq!(err.to_string(), "create thread failed: connection refused");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_timeout_display() {
        let err = TriageError::Timeout {
            elapsed: Duration::from_secs(120),
        };
        assert_eq!(err.to_string(), "agent run did not finish within 120s");
    }

    #[test]
    fn test_missing_setting_mentions_env() {
        let err = ConfigError::Missing {
            name: "tenant id",
            env: "AZURE_TENANT_ID",
        };
        assert!(err.to_string().contains("AZURE_TENANT_ID"));
    }

    #[test]
    fn test_command_error_display() {
        let err: Error = CommandError::InvalidArgument("no agent selected".to_string()).into();
        assert_eq!(err.to_string(), "invalid argument: no agent selected");
    }

    #[test]
    fn test_error_from_triage() {
        let err: Error = TriageError::Cancelled.into();
        assert_eq!(err.to_string(), "analysis cancelled");
    }
}
