//! Domain types shared by the orchestrator, the review surface, and the CLI.

pub mod candidate;
pub mod code;
pub mod request;
pub mod validation;

pub use candidate::{AgentDescriptor, CodeCandidate};
pub use code::IcdCode;
pub use request::{IcdSource, Language, Provider, RequestConfig, TargetSystem};
pub use validation::{Recap, ValidationSet, ValidationState};
