//! Human corrections folded back into agent instructions.

use std::sync::Arc;

use agentflow_common::{AgentFlowError, AgentStore, AgentUpdate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Abstract characters kept in an appended example.
pub const EXAMPLE_ABSTRACT_CHARS: usize = 500;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingExample {
    #[serde(default)]
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub corrected_output: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackReceipt {
    pub success: bool,
    pub agent_id: String,
    pub example_appended: bool,
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Agent {0} not found")]
    AgentNotFound(String),
    #[error(transparent)]
    Store(#[from] AgentFlowError),
}

pub struct FeedbackRecorder {
    agents: Arc<dyn AgentStore>,
}

impl FeedbackRecorder {
    pub fn new(agents: Arc<dyn AgentStore>) -> Self {
        Self { agents }
    }

    /// Append a corrected example to the agent's system prompt and persist it.
    pub async fn add_training_example(
        &self,
        agent_id: &str,
        example: TrainingExample,
    ) -> Result<FeedbackReceipt, FeedbackError> {
        if agent_id.trim().is_empty() {
            return Err(FeedbackError::MissingField("agentId"));
        }
        if example.title.trim().is_empty() {
            return Err(FeedbackError::MissingField("title"));
        }
        if example.corrected_output.is_null() {
            return Err(FeedbackError::MissingField("correctedOutput"));
        }

        // The store serialises this against other edits to the same agent.
        let block = format_example(&example);
        let append: AgentUpdate = Box::new(move |agent| {
            agent.system_prompt.push_str(&block);
            Ok(())
        });
        self.agents
            .update(agent_id, append)
            .await?
            .ok_or_else(|| FeedbackError::AgentNotFound(agent_id.to_string()))?;
        info!(agent_id, "training example appended");

        Ok(FeedbackReceipt { success: true, agent_id: agent_id.to_string(), example_appended: true })
    }
}

fn format_example(example: &TrainingExample) -> String {
    let abstract_text: String = example.abstract_text.chars().take(EXAMPLE_ABSTRACT_CHARS).collect();
    let output = serde_json::to_string_pretty(&example.corrected_output)
        .unwrap_or_else(|_| example.corrected_output.to_string());
    format!(
        "\n\n## Human-corrected example\nTitle: {}\nAbstract: {}\nCorrect output: {}",
        example.title.trim(),
        abstract_text,
        output
    )
}
