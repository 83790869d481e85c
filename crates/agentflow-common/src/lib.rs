//! agentflow-common — Shared types, errors, and traits used across all AgentFlow crates.

pub mod agent;
pub mod error;

pub use agent::{AgentConfig, AgentStore, AgentUpdate};
pub use error::{AgentFlowError, ApiError, Result};
