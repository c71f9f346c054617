//! Candidate codes and agent descriptors.

use serde::{Deserialize, Serialize};
use url::Url;

use super::code::IcdCode;

/// An agent deployed on the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Service-assigned agent identifier.
    pub id: String,
    /// Human-readable agent name.
    pub display_name: String,
}

impl AgentDescriptor {
    /// Creates a descriptor.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// Label for selection lists: name plus a shortened id.
    #[must_use]
    pub fn label(&self) -> String {
        let short: String = self.id.chars().take(8).collect();
        if short.len() < self.id.len() {
            format!("{} ({short}...)", self.display_name)
        } else {
            format!("{} ({short})", self.display_name)
        }
    }
}

/// A code suggested by the agent, pending human validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeCandidate {
    /// The ICD-10 code.
    pub code: IcdCode,
    /// Short description of the code, in the requested language.
    pub description: String,
    /// Agent rationale or confidence, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Excerpt of the note the code was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<String>,
    /// Link to the code's page on the ICD-10 browser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
}

impl CodeCandidate {
    /// Creates a candidate with only a code and description.
    pub fn new(code: IcdCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            rationale: None,
            extract: None,
            url: None,
        }
    }
}
