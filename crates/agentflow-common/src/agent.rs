//! Agent definitions and the storage seam the pipeline reads them through.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A configured language-model agent.
///
/// `system_prompt` is mutable at runtime (the feedback loop appends to it),
/// so callers must re-fetch the config before every invocation instead of
/// holding on to a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Model selector, either a bare model name or `backend:model`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Fields this crate does not model, preserved across load/save.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>, role: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            role: role.into(),
            system_prompt: system_prompt.into(),
            model: None,
            model_override: None,
            icon: None,
            created_at: None,
            updated_at: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Model for one invocation: a per-run override wins over the agent's
    /// own override, which wins over its configured model.
    pub fn effective_model<'a>(&'a self, run_override: Option<&'a str>) -> Option<&'a str> {
        run_override
            .filter(|m| !m.trim().is_empty())
            .or(self.model_override.as_deref().filter(|m| !m.trim().is_empty()))
            .or(self.model.as_deref().filter(|m| !m.trim().is_empty()))
    }
}

/// Edit applied to a stored agent by [`AgentStore::update`].
pub type AgentUpdate = Box<dyn FnOnce(&mut AgentConfig) -> Result<()> + Send>;

/// Key-value access to agent definitions.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<AgentConfig>>;

    async fn list(&self) -> Result<Vec<AgentConfig>>;

    /// Insert or replace the agent with the same id. Returns the stored value.
    async fn save(&self, agent: AgentConfig) -> Result<AgentConfig>;

    /// Read, edit and write back one agent without another writer landing in
    /// between. `None` if the agent does not exist; nothing is written when
    /// `apply` fails. The id cannot be changed.
    async fn update(&self, id: &str, apply: AgentUpdate) -> Result<Option<AgentConfig>>;
}
