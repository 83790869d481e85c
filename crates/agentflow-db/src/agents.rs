//! Repository for agent definitions (`agents.json`).

use agentflow_common::{AgentConfig, AgentFlowError, AgentStore, AgentUpdate};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::database::Database;
use crate::defaults::{default_agents, PLACEHOLDER_PROMPT};
use crate::error::{DbError, Result};

const AGENTS_FILE: &str = "agents.json";

/// File-backed [`AgentStore`]. Every read goes to disk so edits made by other
/// handles (or by hand) are picked up; writes are serialised.
pub struct AgentRepository {
    db: Database,
    write_lock: Mutex<()>,
}

impl AgentRepository {
    /// Open the repository, seeding defaults or upgrading stale agents.
    pub async fn open(db: Database) -> Result<Self> {
        let repo = Self { db, write_lock: Mutex::new(()) };
        repo.initialize().await?;
        Ok(repo)
    }

    async fn initialize(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let Some(mut agents) = self.db.read_json::<Vec<AgentConfig>>(AGENTS_FILE).await? else {
            info!(path = %self.db.path().display(), "seeding default agents");
            return self.db.write_json(AGENTS_FILE, &default_agents()).await;
        };

        let mut changed = false;
        for default in default_agents() {
            match agents.iter_mut().find(|a| a.id == default.id) {
                Some(existing) if existing.system_prompt == PLACEHOLDER_PROMPT => {
                    info!(agent_id = %existing.id, "upgrading placeholder prompt");
                    existing.system_prompt = default.system_prompt;
                    existing.role = default.role;
                    existing.extra.extend(default.extra);
                    changed = true;
                }
                Some(_) => {}
                None => {
                    info!(agent_id = %default.id, "adding missing default agent");
                    agents.push(default);
                    changed = true;
                }
            }
        }
        if changed {
            self.db.write_json(AGENTS_FILE, &agents).await?;
        }
        Ok(())
    }

    async fn load(&self) -> Result<Vec<AgentConfig>> {
        Ok(self.db.read_json(AGENTS_FILE).await?.unwrap_or_default())
    }

    async fn store(&self, agent: AgentConfig) -> Result<AgentConfig> {
        let _guard = self.write_lock.lock().await;
        let mut agents = self.load().await?;
        self.put(&mut agents, agent).await
    }

    /// Replace or append `agent` in `agents` and persist. Caller holds `write_lock`.
    async fn put(&self, agents: &mut Vec<AgentConfig>, mut agent: AgentConfig) -> Result<AgentConfig> {
        let now = Utc::now();
        agent.updated_at = Some(now);
        match agents.iter_mut().find(|a| a.id == agent.id) {
            Some(slot) => {
                agent.created_at = agent.created_at.or(slot.created_at);
                *slot = agent.clone();
            }
            None => {
                agent.created_at = Some(now);
                agents.push(agent.clone());
            }
        }
        self.db.write_json(AGENTS_FILE, &*agents).await?;
        debug!(agent_id = %agent.id, "agent saved");
        Ok(agent)
    }
}

/// Apply a partial JSON update to an agent. The id cannot change.
pub fn merge_patch(agent: &AgentConfig, patch: &serde_json::Map<String, serde_json::Value>) -> Result<AgentConfig> {
    let mut value = serde_json::to_value(agent)
        .map_err(|source| DbError::Serialization { file: AGENTS_FILE.to_string(), source })?;
    if let Some(obj) = value.as_object_mut() {
        for (k, v) in patch {
            if k != "id" {
                obj.insert(k.clone(), v.clone());
            }
        }
    }
    serde_json::from_value(value).map_err(|source| DbError::Serialization { file: AGENTS_FILE.to_string(), source })
}

#[async_trait]
impl AgentStore for AgentRepository {
    async fn get(&self, id: &str) -> agentflow_common::Result<Option<AgentConfig>> {
        let agents = self.load().await?;
        Ok(agents.into_iter().find(|a| a.id == id))
    }

    async fn list(&self) -> agentflow_common::Result<Vec<AgentConfig>> {
        Ok(self.load().await?)
    }

    async fn save(&self, agent: AgentConfig) -> agentflow_common::Result<AgentConfig> {
        self.store(agent).await.map_err(AgentFlowError::from)
    }

    async fn update(&self, id: &str, apply: AgentUpdate) -> agentflow_common::Result<Option<AgentConfig>> {
        let _guard = self.write_lock.lock().await;
        let mut agents = self.load().await?;
        let Some(mut agent) = agents.iter().find(|a| a.id == id).cloned() else {
            return Ok(None);
        };
        apply(&mut agent)?;
        agent.id = id.to_string();
        Ok(Some(self.put(&mut agents, agent).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn open_in(dir: &std::path::Path) -> AgentRepository {
        AgentRepository::open(Database::open(dir).await.unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn test_seeds_defaults_on_first_open() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_in(dir.path()).await;
        assert_eq!(repo.list().await.unwrap().len(), 5);
        assert!(repo.get("slr-meta-scorer").await.unwrap().is_some());
        assert!(repo.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_placeholder_prompt_upgraded_and_edits_kept() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).await.unwrap();
        let stale = vec![
            AgentConfig::new("slr-screener", "old", PLACEHOLDER_PROMPT),
            AgentConfig::new("slr-cg-tagger", "mine", "My own prompt"),
            AgentConfig::new("custom", "writer", "Write."),
        ];
        db.write_json(AGENTS_FILE, &stale).await.unwrap();

        let repo = AgentRepository::open(db).await.unwrap();
        let agents = repo.list().await.unwrap();
        assert_eq!(agents.len(), 6);

        let screener = repo.get("slr-screener").await.unwrap().unwrap();
        assert_ne!(screener.system_prompt, PLACEHOLDER_PROMPT);
        assert_eq!(screener.extra.get("_slrStep"), Some(&serde_json::json!(1)));

        let cg = repo.get("slr-cg-tagger").await.unwrap().unwrap();
        assert_eq!(cg.system_prompt, "My own prompt");
    }

    #[tokio::test]
    async fn test_save_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_in(dir.path()).await;

        let mut agent = repo.get("slr-screener").await.unwrap().unwrap();
        agent.system_prompt.push_str("\nExtra rule.");
        let saved = repo.save(agent).await.unwrap();
        assert!(saved.updated_at.is_some());

        let reopened = open_in(dir.path()).await;
        let agent = reopened.get("slr-screener").await.unwrap().unwrap();
        assert!(agent.system_prompt.ends_with("Extra rule."));
    }

    #[tokio::test]
    async fn test_save_new_agent_sets_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_in(dir.path()).await;
        let saved = repo.save(AgentConfig::new("new-one", "r", "p")).await.unwrap();
        assert!(saved.created_at.is_some());
        assert_eq!(repo.list().await.unwrap().len(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_keep_every_edit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = std::sync::Arc::new(open_in(dir.path()).await);

        let mut tasks = Vec::new();
        for i in 0..8 {
            let repo_a = repo.clone();
            tasks.push(tokio::spawn(async move {
                let append: AgentUpdate = Box::new(move |agent| {
                    agent.system_prompt.push_str(&format!("\nexample {i}"));
                    Ok(())
                });
                repo_a.update("slr-screener", append).await.unwrap();
            }));
            let repo = repo.clone();
            tasks.push(tokio::spawn(async move {
                let mut patch = serde_json::Map::new();
                patch.insert("role".into(), serde_json::json!(format!("role {i}")));
                let edit: AgentUpdate = Box::new(move |agent| {
                    *agent = merge_patch(agent, &patch).map_err(|e| AgentFlowError::InvalidAgent(e.to_string()))?;
                    Ok(())
                });
                repo.update("slr-screener", edit).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let agent = repo.get("slr-screener").await.unwrap().unwrap();
        for i in 0..8 {
            assert!(agent.system_prompt.contains(&format!("\nexample {i}")), "lost example {i}");
        }
        assert!(agent.role.starts_with("role "));
    }

    #[tokio::test]
    async fn test_failed_update_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_in(dir.path()).await;
        let before = repo.get("slr-path-classifier").await.unwrap().unwrap();

        let failing: AgentUpdate = Box::new(|agent| {
            agent.role = "half-applied".into();
            Err(AgentFlowError::InvalidAgent("rejected".into()))
        });
        let err = repo.update("slr-path-classifier", failing).await.unwrap_err();
        assert!(matches!(err, AgentFlowError::InvalidAgent(_)));
        assert_eq!(repo.get("slr-path-classifier").await.unwrap().unwrap(), before);

        let noop: AgentUpdate = Box::new(|_| Ok(()));
        assert!(repo.update("nobody", noop).await.unwrap().is_none());
    }

    #[test]
    fn test_merge_patch_keeps_id() {
        let agent = AgentConfig::new("slr-screener", "Screener", "p");
        let patch = serde_json::json!({"id": "hijack", "role": "New role", "modelOverride": "opus"});
        let merged = merge_patch(&agent, patch.as_object().unwrap()).unwrap();
        assert_eq!(merged.id, "slr-screener");
        assert_eq!(merged.role, "New role");
        assert_eq!(merged.model_override.as_deref(), Some("opus"));
    }
}
