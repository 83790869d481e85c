//! agentflow-db — File-backed persistence for agent definitions.
//!
//! Agents live in `agents.json` under the data directory. The repository
//! seeds the five SLR stage agents on first open and implements
//! [`agentflow_common::AgentStore`] for the rest of the workspace.

pub mod agents;
pub mod database;
pub mod defaults;
pub mod error;

pub use agents::AgentRepository;
pub use database::Database;
pub use error::{DbError, Result};
