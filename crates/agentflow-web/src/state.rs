//! Shared application state for the web server.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use agentflow_common::AgentStore;
use agentflow_config::Config;
use agentflow_ingestion::Record;
use agentflow_llm::StageInvoker;
use agentflow_slr::{ArticleClassifier, BatchScheduler, FeedbackRecorder, InMemoryJobStore, JobEvent};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub agents: Arc<dyn AgentStore>,
    pub jobs: Arc<InMemoryJobStore>,
    pub scheduler: Arc<BatchScheduler>,
    pub feedback: FeedbackRecorder,
    /// Uploaded record sets waiting for a run, keyed by batch id.
    pub record_sets: RwLock<RecordSets>,
    /// Broadcast channel for SSE push events
    pub event_tx: broadcast::Sender<JobEvent>,
    pub config: Config,
}

impl AppState {
    pub fn new(agents: Arc<dyn AgentStore>, invoker: Arc<dyn StageInvoker>, config: Config) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let publisher = Arc::new(event_tx.clone());
        let jobs = Arc::new(InMemoryJobStore::with_retention(config.jobs.max_retained));
        let classifier = Arc::new(
            ArticleClassifier::new(agents.clone(), invoker, publisher.clone())
                .with_abstract_chars(config.batch.abstract_chars),
        );
        let scheduler = Arc::new(BatchScheduler::new(classifier, jobs.clone(), publisher));

        Self {
            feedback: FeedbackRecorder::new(agents.clone()),
            agents,
            jobs,
            scheduler,
            record_sets: RwLock::new(RecordSets::new(config.jobs.max_record_sets)),
            event_tx,
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }
}

pub type SharedState = Arc<AppState>;

/// Uploaded record sets, capped at `max` entries (0 = no cap). Inserting past
/// the cap drops the oldest upload; a run already started keeps its own copy.
#[derive(Debug, Default)]
pub struct RecordSets {
    sets: HashMap<Uuid, Vec<Record>>,
    order: VecDeque<Uuid>,
    max: usize,
}

impl RecordSets {
    pub fn new(max: usize) -> Self {
        Self { sets: HashMap::new(), order: VecDeque::new(), max }
    }

    pub fn insert(&mut self, id: Uuid, records: Vec<Record>) {
        if self.sets.insert(id, records).is_none() {
            self.order.push_back(id);
        }
        while self.max > 0 && self.order.len() > self.max {
            if let Some(oldest) = self.order.pop_front() {
                self.sets.remove(&oldest);
                tracing::debug!(batch_id = %oldest, "record set evicted");
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<&Vec<Record>> {
        self.sets.get(id)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_ingestion::SourceDb;

    fn set(title: &str) -> Vec<Record> {
        vec![Record::new(SourceDb::Other).with("Title", title)]
    }

    #[test]
    fn test_record_sets_drop_oldest_past_cap() {
        let mut sets = RecordSets::new(2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            sets.insert(*id, set(&format!("Upload number {i}")));
        }
        assert_eq!(sets.len(), 2);
        assert!(sets.get(&ids[0]).is_none());
        assert!(sets.get(&ids[1]).is_some() && sets.get(&ids[2]).is_some());
    }

    #[test]
    fn test_record_sets_uncapped_at_zero() {
        let mut sets = RecordSets::new(0);
        for i in 0..50 {
            sets.insert(Uuid::new_v4(), set(&format!("Upload number {i}")));
        }
        assert_eq!(sets.len(), 50);
    }
}
