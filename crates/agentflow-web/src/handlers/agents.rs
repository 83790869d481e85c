//! Agent configuration endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{Map, Value};

use agentflow_common::{AgentConfig, AgentFlowError, AgentStore, AgentUpdate, ApiError};
use agentflow_db::agents::merge_patch;

use crate::state::SharedState;

pub async fn list_agents(State(state): State<SharedState>) -> Result<Json<Vec<AgentConfig>>, ApiError> {
    Ok(Json(state.agents.list().await?))
}

pub async fn get_agent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<AgentConfig>, ApiError> {
    state
        .agents
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AgentFlowError::AgentNotFound(id).into())
}

/// PUT /api/agents/{id} — merge the body's fields into the stored agent.
pub async fn update_agent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<Json<AgentConfig>, ApiError> {
    let fields = patch.len();
    let apply: AgentUpdate = Box::new(move |agent| {
        *agent = merge_patch(agent, &patch).map_err(|e| AgentFlowError::InvalidAgent(e.to_string()))?;
        Ok(())
    });
    let updated = state
        .agents
        .update(&id, apply)
        .await?
        .ok_or_else(|| AgentFlowError::AgentNotFound(id.clone()))?;
    tracing::info!(agent_id = %id, fields, "agent updated");
    Ok(Json(updated))
}
