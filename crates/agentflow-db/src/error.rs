//! Database error types.

use agentflow_common::AgentFlowError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error in {file}: {source}")]
    Serialization {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No home directory available for the default data dir")]
    NoHomeDir,
}

impl From<DbError> for AgentFlowError {
    fn from(err: DbError) -> Self {
        AgentFlowError::Storage(err.to_string())
    }
}
