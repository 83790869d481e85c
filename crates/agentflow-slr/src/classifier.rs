//! Drives one record through the five classification stages.

use std::sync::Arc;

use agentflow_common::{AgentConfig, AgentFlowError, AgentStore};
use agentflow_ingestion::Record;
use agentflow_llm::StageInvoker;
use tracing::{debug, instrument, warn};

use crate::events::{BatchEvent, EventPublisher, JobEvent, StepStatus};
use crate::extract::extract_structured;
use crate::job::JobId;
use crate::result::{ClassificationResult, StageOutcome};
use crate::stage::{gate, GateDecision, ScreenStatus, Stage};

/// Abstract characters included in the stage input.
pub const DEFAULT_ABSTRACT_CHARS: usize = 2000;

pub struct ArticleClassifier {
    agents: Arc<dyn AgentStore>,
    invoker: Arc<dyn StageInvoker>,
    events: Arc<dyn EventPublisher>,
    abstract_chars: usize,
}

impl ArticleClassifier {
    pub fn new(agents: Arc<dyn AgentStore>, invoker: Arc<dyn StageInvoker>, events: Arc<dyn EventPublisher>) -> Self {
        Self { agents, invoker, events, abstract_chars: DEFAULT_ABSTRACT_CHARS }
    }

    pub fn with_abstract_chars(mut self, chars: usize) -> Self {
        self.abstract_chars = chars;
        self
    }

    /// Stage input text for a record.
    pub fn record_summary(&self, record: &Record) -> String {
        let abstract_text: String = record.abstract_text().chars().take(self.abstract_chars).collect();
        format!(
            "Title: {}\nKeywords: {}\nAbstract: {}",
            record.title(),
            record.keywords(),
            abstract_text
        )
    }

    /// Classify one record. Every stage failure is captured in the returned
    /// result; this never fails as a whole.
    #[instrument(name = "classify", skip_all, fields(job_id = %job_id, index = index))]
    pub async fn classify(
        &self,
        record: Record,
        index: usize,
        job_id: JobId,
        model_override: Option<&str>,
    ) -> ClassificationResult {
        let input = self.record_summary(&record);
        let correlation_id = format!("slr-{job_id}-{index}");
        let mut result = ClassificationResult::new(record, index);
        let mut screen: Option<ScreenStatus> = None;

        for stage in Stage::ALL {
            if let GateDecision::Skip(reason) = gate(stage, screen.as_ref()) {
                debug!(%stage, %reason, "stage gated");
                result.step_results.insert(stage, StageOutcome::Skipped { reason });
                continue;
            }

            let agent = match self.load_agent(stage, model_override).await {
                Ok(agent) => agent,
                Err(error) => {
                    warn!(%stage, %error, "stage agent unavailable");
                    if stage == Stage::Screen {
                        screen = Some(ScreenStatus::Error);
                    }
                    result.step_results.insert(stage, StageOutcome::InvocationError { error });
                    continue;
                }
            };

            self.publish_step(job_id, index, stage, StepStatus::Started, None);
            let outcome = match self.invoker.invoke(&agent, &input, &correlation_id).await {
                Ok(raw) => {
                    let outcome = match extract_structured(&raw) {
                        Ok(output) => StageOutcome::Success { output },
                        Err(failure) => {
                            warn!(%stage, error = %failure.error, "stage output not parseable");
                            StageOutcome::ParseFailure { error: failure.error, raw: failure.raw_excerpt }
                        }
                    };
                    result.raw.insert(stage, raw);
                    outcome
                }
                Err(e) => {
                    warn!(%stage, %correlation_id, error = %e, "stage invocation failed");
                    StageOutcome::InvocationError { error: e.to_string() }
                }
            };

            if stage == Stage::Screen {
                screen = match &outcome {
                    StageOutcome::Success { output } => ScreenStatus::from_output(output),
                    StageOutcome::InvocationError { .. } => Some(ScreenStatus::Error),
                    _ => None,
                };
                debug!(status = screen.as_ref().map(ScreenStatus::as_str), "screened");
            }

            self.publish_step(job_id, index, stage, StepStatus::Done, Some(outcome.clone()));
            result.step_results.insert(stage, outcome);
        }
        result
    }

    /// Current config for a stage's agent, with the run's model override applied.
    async fn load_agent(&self, stage: Stage, model_override: Option<&str>) -> Result<AgentConfig, String> {
        let mut agent = match self.agents.get(stage.agent_id()).await {
            Ok(Some(agent)) => agent,
            Ok(None) => return Err(AgentFlowError::AgentNotFound(stage.agent_id().to_string()).to_string()),
            Err(e) => return Err(e.to_string()),
        };
        if let Some(model) = model_override.filter(|m| !m.trim().is_empty()) {
            agent.model_override = Some(model.to_string());
        }
        Ok(agent)
    }

    fn publish_step(&self, job_id: JobId, index: usize, stage: Stage, status: StepStatus, result: Option<StageOutcome>) {
        self.events.publish(JobEvent::new(
            job_id,
            BatchEvent::ItemStep { index, stage, agent_id: stage.agent_id().to_string(), status, result },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullPublisher;
    use agentflow_ingestion::SourceDb;
    use agentflow_test_utils::{slr_agents, InMemoryAgentStore, ScriptedInvoker};
    use tokio::sync::broadcast;

    fn record() -> Record {
        Record::new(SourceDb::Scopus)
            .with("Title", "Board gender diversity and carbon disclosure")
            .with("Author_Keywords", "board; carbon")
            .with("Abstract", "x".repeat(5000))
    }

    fn classifier(store: Arc<InMemoryAgentStore>, invoker: Arc<ScriptedInvoker>) -> ArticleClassifier {
        ArticleClassifier::new(store, invoker, Arc::new(NullPublisher))
    }

    #[test]
    fn test_summary_truncates_abstract() {
        let c = classifier(Arc::new(InMemoryAgentStore::new(vec![])), Arc::new(ScriptedInvoker::include_all()))
            .with_abstract_chars(100);
        let summary = c.record_summary(&record());
        assert!(summary.starts_with("Title: Board gender diversity and carbon disclosure\nKeywords: board; carbon\nAbstract: "));
        assert_eq!(summary.lines().last().unwrap().len(), "Abstract: ".len() + 100);
    }

    #[tokio::test]
    async fn test_include_runs_every_stage() {
        let invoker = Arc::new(ScriptedInvoker::include_all());
        let c = classifier(Arc::new(InMemoryAgentStore::new(slr_agents())), invoker.clone());
        let result = c.classify(record(), 0, JobId::new(), None).await;

        assert!(Stage::ALL.iter().all(|s| result.outcome(*s).unwrap().is_success()));
        assert_eq!(result.screen_status(), Some(ScreenStatus::Include));
        assert_eq!(result.raw.len(), 5);
        assert_eq!(invoker.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_exclude_skips_downstream_with_reason() {
        let invoker = Arc::new(ScriptedInvoker::new(|_, _| Ok(r#"{"status":"Exclude","exclusion_code":"E2"}"#.into())));
        let c = classifier(Arc::new(InMemoryAgentStore::new(slr_agents())), invoker.clone());
        let result = c.classify(record(), 0, JobId::new(), None).await;

        for stage in &Stage::ALL[1..] {
            match result.outcome(*stage).unwrap() {
                StageOutcome::Skipped { reason } => assert!(reason.contains("Exclude")),
                other => panic!("{stage}: {other:?}"),
            }
        }
        assert_eq!(invoker.calls().len(), 1);
        assert!(result.is_gated());
    }

    #[tokio::test]
    async fn test_screen_failure_skips_downstream_as_error() {
        let invoker = Arc::new(ScriptedInvoker::new(|_, _| Err("backend down".into())));
        let c = classifier(Arc::new(InMemoryAgentStore::new(slr_agents())), invoker);
        let result = c.classify(record(), 2, JobId::new(), None).await;

        assert!(result.outcome(Stage::Screen).unwrap().is_invocation_error());
        for stage in &Stage::ALL[1..] {
            match result.outcome(*stage).unwrap() {
                StageOutcome::Skipped { reason } => assert!(reason.contains("ERROR"), "{reason}"),
                other => panic!("{stage}: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_missing_agent_is_isolated_to_its_stage() {
        let agents: Vec<AgentConfig> = slr_agents().into_iter().filter(|a| a.id != "slr-cg-tagger").collect();
        let c = classifier(Arc::new(InMemoryAgentStore::new(agents)), Arc::new(ScriptedInvoker::include_all()));
        let result = c.classify(record(), 0, JobId::new(), None).await;

        match result.outcome(Stage::Cg).unwrap() {
            StageOutcome::InvocationError { error } => assert!(error.contains("slr-cg-tagger")),
            other => panic!("{other:?}"),
        }
        assert!(result.outcome(Stage::Esg).unwrap().is_success());
        assert!(result.outcome(Stage::Meta).unwrap().is_success());
    }

    #[tokio::test]
    async fn test_unparseable_screen_proceeds() {
        let invoker = Arc::new(ScriptedInvoker::new(|agent, _| {
            if agent.id == "slr-screener" {
                Ok("Looks relevant to me.".into())
            } else {
                Ok(r#"{"ok": true}"#.into())
            }
        }));
        let c = classifier(Arc::new(InMemoryAgentStore::new(slr_agents())), invoker);
        let result = c.classify(record(), 0, JobId::new(), None).await;

        match result.outcome(Stage::Screen).unwrap() {
            StageOutcome::ParseFailure { raw, .. } => assert_eq!(raw, "Looks relevant to me."),
            other => panic!("{other:?}"),
        }
        assert_eq!(result.raw[&Stage::Screen], "Looks relevant to me.");
        assert!(result.outcome(Stage::Path).unwrap().is_success());
    }

    #[tokio::test]
    async fn test_model_override_applies_without_mutating_store() {
        let store = Arc::new(InMemoryAgentStore::new(slr_agents()));
        let invoker = Arc::new(ScriptedInvoker::include_all());
        let c = classifier(store.clone(), invoker.clone());
        c.classify(record(), 0, JobId::new(), Some("opus")).await;

        assert!(invoker.calls().iter().all(|call| call.model.as_deref() == Some("opus")));
        let stored = store.get("slr-screener").await.unwrap().unwrap();
        assert_eq!(stored.model_override, None);
    }

    #[tokio::test]
    async fn test_correlation_id_and_step_events() {
        let (tx, mut rx) = broadcast::channel(64);
        let invoker = Arc::new(ScriptedInvoker::new(|_, _| Ok(r#"{"status":"Background"}"#.into())));
        let c = ArticleClassifier::new(Arc::new(InMemoryAgentStore::new(slr_agents())), invoker.clone(), Arc::new(tx));
        let job_id = JobId::new();
        c.classify(record(), 7, job_id, None).await;

        assert_eq!(invoker.calls()[0].correlation_id, format!("slr-{job_id}-7"));

        let mut steps = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.job_id, job_id);
            if let BatchEvent::ItemStep { stage, status, result, .. } = event.event {
                steps.push((stage, status, result.is_some()));
            }
        }
        assert_eq!(steps, vec![(Stage::Screen, StepStatus::Started, false), (Stage::Screen, StepStatus::Done, true)]);
    }
}
