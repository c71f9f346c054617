//! Per-analysis request settings.
//!
//! A [`RequestConfig`] is assembled once per analysis from user choices
//! and handed to the orchestrator by reference; nothing mutates it after
//! submission.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// Remote agent service family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Azure AI Foundry agents.
    Azure,
    /// `OpenAI` Assistants API.
    #[serde(rename = "openai")]
    OpenAi,
}

impl Provider {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Azure => "azure",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown provider {other:?} (expected azure or openai)")),
        }
    }
}

/// Language for code descriptions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English.
    #[default]
    En,
    /// French.
    Fr,
}

impl Language {
    /// ISO 639-1 code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Self::En),
            "fr" | "french" | "francais" | "français" => Ok(Self::Fr),
            other => Err(format!("unsupported language {other:?} (expected en or fr)")),
        }
    }
}

/// Published WHO ICD-10 browsers the agent can be pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcdSource {
    /// ICD-10 2019, English.
    Who2019En,
    /// ICD-10 2019, French.
    Who2019Fr,
    /// ICD 2025-01 MMS, English.
    Who2025En,
    /// ICD 2025-01 MMS, French.
    Who2025Fr,
}

impl IcdSource {
    /// All presets in display order.
    pub const ALL: [Self; 4] = [
        Self::Who2019En,
        Self::Who2019Fr,
        Self::Who2025En,
        Self::Who2025Fr,
    ];

    /// Short key used on the command line.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Who2019En => "who-2019-en",
            Self::Who2019Fr => "who-2019-fr",
            Self::Who2025En => "who-2025-en",
            Self::Who2025Fr => "who-2025-fr",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Who2019En => "ICD-10 2019 (EN)",
            Self::Who2019Fr => "ICD-10 2019 (FR)",
            Self::Who2025En => "ICD-10 2025 (EN)",
            Self::Who2025Fr => "ICD-10 2025 (FR)",
        }
    }

    /// Browser URL as text.
    #[must_use]
    pub const fn url_str(&self) -> &'static str {
        match self {
            Self::Who2019En => "https://icd.who.int/browse10/2019/en",
            Self::Who2019Fr => "https://icd.who.int/browse10/2019/fr",
            Self::Who2025En => "https://icd.who.int/browse/2025-01/mms/en",
            Self::Who2025Fr => "https://icd.who.int/browse/2025-01/mms/fr",
        }
    }

    /// Browser URL.
    #[must_use]
    pub fn url(&self) -> Url {
        Url::parse(self.url_str()).unwrap_or_else(|_| unreachable!())
    }

    /// Language the browser is published in.
    #[must_use]
    pub const fn language(&self) -> Language {
        match self {
            Self::Who2019En | Self::Who2025En => Language::En,
            Self::Who2019Fr | Self::Who2025Fr => Language::Fr,
        }
    }

    /// Resolves a preset key or a custom `http(s)` URL.
    pub fn resolve(input: &str) -> Result<Url, String> {
        let trimmed = input.trim();
        if let Some(preset) = Self::ALL.iter().find(|s| s.key() == trimmed) {
            return Ok(preset.url());
        }
        let url = Url::parse(trimmed)
            .map_err(|e| format!("{trimmed:?} is neither a known ICD source nor a URL: {e}"))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(format!("ICD source URL must be http(s), got {other}")),
        }
    }
}

/// Downstream system that validated codes are prepared for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetSystem {
    /// In-house hospital management.
    #[default]
    HospitalManagement,
    /// DEDALUS.
    Dedalus,
    /// CEGEDIM.
    Cegedim,
}

impl TargetSystem {
    /// Display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::HospitalManagement => "Hospital Management",
            Self::Dedalus => "DEDALUS",
            Self::Cegedim => "CEGEDIM",
        }
    }
}

impl fmt::Display for TargetSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "hospital-management" | "hospital" => Ok(Self::HospitalManagement),
            "dedalus" => Ok(Self::Dedalus),
            "cegedim" => Ok(Self::Cegedim),
            other => Err(format!(
                "unknown target system {other:?} (expected hospital-management, dedalus or cegedim)"
            )),
        }
    }
}

/// Everything needed to run one analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    /// Free-text clinical note.
    pub note_text: String,
    /// Service family the agent lives on.
    pub provider: Provider,
    /// ICD-10 browser the agent must restrict itself to.
    pub icd_website: Url,
    /// Language for descriptions.
    pub language: Language,
    /// Agent to run.
    pub agent_id: String,
}

impl RequestConfig {
    /// Creates a request using the 2019 English WHO browser.
    pub fn new(
        note_text: impl Into<String>,
        provider: Provider,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            note_text: note_text.into(),
            provider,
            icd_website: IcdSource::Who2019En.url(),
            language: Language::En,
            agent_id: agent_id.into(),
        }
    }

    /// Sets the ICD-10 browser.
    #[must_use]
    pub fn with_icd_website(mut self, url: Url) -> Self {
        self.icd_website = url;
        self
    }

    /// Sets the description language.
    #[must_use]
    pub const fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }
}
