//! Shared test doubles and fixtures for the agentflow workspace.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use agentflow_common::{AgentConfig, AgentStore, AgentUpdate};
use agentflow_ingestion::{Record, SourceDb};
use agentflow_llm::{LlmError, StageInvoker};
use async_trait::async_trait;
use rand::Rng;
use tokio::sync::RwLock;

pub const STAGE_AGENT_IDS: [&str; 5] =
    ["slr-screener", "slr-path-classifier", "slr-cg-tagger", "slr-esg-tagger", "slr-meta-scorer"];

/// One agent per SLR stage with a short JSON-asking prompt.
pub fn slr_agents() -> Vec<AgentConfig> {
    STAGE_AGENT_IDS
        .iter()
        .map(|id| AgentConfig::new(*id, format!("{id} role"), format!("You are {id}. Answer in JSON.")).with_model("sonnet"))
        .collect()
}

/// A record with a title, optional DOI and a short abstract.
pub fn record(source: SourceDb, title: &str, doi: &str) -> Record {
    let mut rec = Record::new(source)
        .with("Title", title)
        .with("Abstract", format!("Abstract of: {title}"));
    if !doi.is_empty() {
        rec.insert("DOI", doi);
    }
    rec
}

/// Five uploaded records: one shares a DOI with the WoS copy, one is a
/// near-identical retitling of another. Three survive dedup.
pub fn overlapping_upload() -> Vec<Record> {
    vec![
        record(SourceDb::Scopus, "A completely different title about supply chains", "https://doi.org/10.1000/ABC"),
        record(SourceDb::WoS, "Board independence and ESG disclosure quality in European listed firms", "10.1000/abc"),
        record(SourceDb::Scopus, "Ownership concentration and carbon performance evidence from Asia", "10.1000/own"),
        record(SourceDb::Other, "Ownership concentration and carbon performance: new evidence from Asia", ""),
        record(SourceDb::Other, "CEO duality and sustainability assurance in emerging markets", "10.1000/ceo"),
    ]
}

// ---------------------------------------------------------------------------
// Agent store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryAgentStore {
    agents: RwLock<Vec<AgentConfig>>,
}

impl InMemoryAgentStore {
    pub fn new(agents: Vec<AgentConfig>) -> Self {
        Self { agents: RwLock::new(agents) }
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn get(&self, id: &str) -> agentflow_common::Result<Option<AgentConfig>> {
        Ok(self.agents.read().await.iter().find(|a| a.id == id).cloned())
    }

    async fn list(&self) -> agentflow_common::Result<Vec<AgentConfig>> {
        Ok(self.agents.read().await.clone())
    }

    async fn save(&self, agent: AgentConfig) -> agentflow_common::Result<AgentConfig> {
        let mut agents = self.agents.write().await;
        match agents.iter_mut().find(|a| a.id == agent.id) {
            Some(slot) => *slot = agent.clone(),
            None => agents.push(agent.clone()),
        }
        Ok(agent)
    }

    async fn update(&self, id: &str, apply: AgentUpdate) -> agentflow_common::Result<Option<AgentConfig>> {
        let mut agents = self.agents.write().await;
        let Some(slot) = agents.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        let mut agent = slot.clone();
        apply(&mut agent)?;
        agent.id = id.to_string();
        *slot = agent.clone();
        Ok(Some(agent))
    }
}

// ---------------------------------------------------------------------------
// Scripted invoker
// ---------------------------------------------------------------------------

type Responder = dyn Fn(&AgentConfig, &str) -> Result<String, String> + Send + Sync;

/// A recorded stage call.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationCall {
    pub agent_id: String,
    pub model: Option<String>,
    pub correlation_id: String,
    /// Record index parsed from the trailing `-<n>` of the correlation id.
    pub index: Option<usize>,
    pub system_prompt: String,
}

/// [`StageInvoker`] that answers from a closure, optionally after a random
/// delay, and tracks how many calls overlap.
pub struct ScriptedInvoker {
    responder: Box<Responder>,
    jitter_ms: Option<(u64, u64)>,
    fail_index: Option<usize>,
    calls: Mutex<Vec<InvocationCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedInvoker {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&AgentConfig, &str) -> Result<String, String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            jitter_ms: None,
            fail_index: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Screens every record as `Include`; other stages return a small object.
    pub fn include_all() -> Self {
        Self::new(|agent, _| {
            if agent.id == "slr-screener" {
                Ok(r#"{"status": "Include", "reason": "in scope"}"#.to_string())
            } else {
                Ok(format!("```json\n{{\"agent\": \"{}\", \"ok\": true}}\n```", agent.id))
            }
        })
    }

    /// Sleep a random number of milliseconds in `min..=max` before answering.
    pub fn with_jitter(mut self, min: u64, max: u64) -> Self {
        self.jitter_ms = Some((min, max));
        self
    }

    /// Fail every stage call for the record at `index`.
    pub fn failing_for_index(mut self, index: usize) -> Self {
        self.fail_index = Some(index);
        self
    }

    pub fn calls(&self) -> Vec<InvocationCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of calls seen running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn correlation_index(correlation_id: &str) -> Option<usize> {
    correlation_id.rsplit('-').next().and_then(|s| s.parse().ok())
}

#[async_trait]
impl StageInvoker for ScriptedInvoker {
    async fn invoke(&self, agent: &AgentConfig, input: &str, correlation_id: &str) -> Result<String, LlmError> {
        let index = correlation_index(correlation_id);
        self.calls.lock().unwrap().push(InvocationCall {
            agent_id: agent.id.clone(),
            model: agent.effective_model(None).map(str::to_string),
            correlation_id: correlation_id.to_string(),
            index,
            system_prompt: agent.system_prompt.clone(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some((min, max)) = self.jitter_ms {
            let ms = rand::thread_rng().gen_range(min..=max);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        let outcome = match (self.fail_index, index) {
            (Some(fail), Some(i)) if fail == i => Err(format!("scripted failure for record {i}")),
            _ => (self.responder)(agent, input),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome.map_err(LlmError::Unavailable)
    }
}
