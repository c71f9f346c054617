//! # icd-triage
//!
//! ICD-10 triage for clinical notes. A doctor's free-text note is sent to a
//! hosted AI agent (Azure AI Foundry Agents or `OpenAI` Assistants), the
//! reply is parsed into ICD-10 code candidates, and a reviewer keeps or
//! rejects each one before export to a hospital system.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use icd_triage::agent::{AgentConfig, Orchestrator, create_service};
//! use icd_triage::core::{IcdSource, RequestConfig};
//!
//! # async fn run() -> icd_triage::Result<()> {
//! let config = AgentConfig::from_env()?;
//! let service = create_service(&config)?;
//! let orchestrator = Orchestrator::new(service, config.clone());
//!
//! let request = RequestConfig::new(
//!     "Type 2 diabetes, hypertension.",
//!     config.provider(),
//!     "asst_abc123",
//! )
//! .with_icd_website(IcdSource::Who2019En.url());
//!
//! let outcome = orchestrator.submit(&request).await?;
//! for candidate in &outcome.candidates {
//!     println!("{} {}", candidate.code, candidate.description);
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod error;

pub use error::{Error, Result};
