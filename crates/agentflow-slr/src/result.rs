//! Per-record classification results and batch summary counts.

use std::collections::BTreeMap;

use agentflow_ingestion::Record;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::stage::{ScreenStatus, Stage};

/// What happened to one stage of one record.
///
/// Serialised with an `outcome` tag. A successful stage's parsed fields sit
/// under `output` so they can never collide with the tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    Success { output: Map<String, Value> },
    ParseFailure { error: String, raw: String },
    InvocationError { error: String },
    Skipped { reason: String },
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StageOutcome::Skipped { .. })
    }

    pub fn is_invocation_error(&self) -> bool {
        matches!(self, StageOutcome::InvocationError { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    #[serde(rename = "_original_row")]
    pub record: Record,
    #[serde(rename = "_index")]
    pub index: usize,
    pub step_results: BTreeMap<Stage, StageOutcome>,
    /// Raw text returned by each invoked stage.
    pub raw: BTreeMap<Stage, String>,
    /// Set when classification failed outside any single stage.
    #[serde(rename = "_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClassificationResult {
    pub fn new(record: Record, index: usize) -> Self {
        Self { record, index, step_results: BTreeMap::new(), raw: BTreeMap::new(), error: None }
    }

    /// Result for a record whose classification escaped its own error handling.
    pub fn scheduler_fatal(record: Record, index: usize, error: impl Into<String>) -> Self {
        Self { error: Some(error.into()), ..Self::new(record, index) }
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.step_results.get(&stage)
    }

    /// Screening status as parsed from the screen stage's output.
    pub fn screen_status(&self) -> Option<ScreenStatus> {
        match self.outcome(Stage::Screen)? {
            StageOutcome::Success { output } => ScreenStatus::from_output(output),
            StageOutcome::InvocationError { .. } => Some(ScreenStatus::Error),
            _ => None,
        }
    }

    pub fn is_errored(&self) -> bool {
        self.error.is_some() || self.step_results.values().any(StageOutcome::is_invocation_error)
    }

    /// Later stages were skipped by the screening gate.
    pub fn is_gated(&self) -> bool {
        Stage::ALL[1..]
            .iter()
            .any(|s| self.outcome(*s).is_some_and(StageOutcome::is_skipped))
    }

    pub fn has_parse_failure(&self) -> bool {
        self.step_results.values().any(|o| matches!(o, StageOutcome::ParseFailure { .. }))
    }
}

/// Counts shown alongside a job's results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub classified: usize,
    pub skipped: usize,
    pub errored: usize,
    pub parse_failures: usize,
    pub include: usize,
    pub maybe: usize,
    pub exclude: usize,
    pub background: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[Option<ClassificationResult>]) -> Self {
        let mut s = BatchSummary { total: results.len(), ..Default::default() };
        for result in results.iter().flatten() {
            s.completed += 1;
            if result.is_errored() {
                s.errored += 1;
            } else if result.is_gated() {
                s.skipped += 1;
            } else {
                s.classified += 1;
            }
            if result.has_parse_failure() {
                s.parse_failures += 1;
            }
            match result.screen_status() {
                Some(ScreenStatus::Include)    => s.include += 1,
                Some(ScreenStatus::Maybe)      => s.maybe += 1,
                Some(ScreenStatus::Exclude)    => s.exclude += 1,
                Some(ScreenStatus::Background) => s.background += 1,
                _ => {}
            }
        }
        s
    }
}
