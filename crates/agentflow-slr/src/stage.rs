//! Pipeline stages and the screening gate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One classification step. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Screen,
    Path,
    Cg,
    Esg,
    Meta,
}

impl Stage {
    pub const ALL: [Stage; 5] = [Stage::Screen, Stage::Path, Stage::Cg, Stage::Esg, Stage::Meta];

    pub fn key(&self) -> &'static str {
        match self {
            Stage::Screen => "screen",
            Stage::Path   => "path",
            Stage::Cg     => "cg",
            Stage::Esg    => "esg",
            Stage::Meta   => "meta",
        }
    }

    /// Id of the agent that runs this stage.
    pub fn agent_id(&self) -> &'static str {
        match self {
            Stage::Screen => "slr-screener",
            Stage::Path   => "slr-path-classifier",
            Stage::Cg     => "slr-cg-tagger",
            Stage::Esg    => "slr-esg-tagger",
            Stage::Meta   => "slr-meta-scorer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Resolved outcome of the screening stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenStatus {
    Include,
    Maybe,
    Exclude,
    Background,
    /// The screening stage itself could not be run.
    Error,
    /// A status string the pipeline does not recognise.
    Other(String),
}

impl ScreenStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "include"    => ScreenStatus::Include,
            "maybe"      => ScreenStatus::Maybe,
            "exclude"    => ScreenStatus::Exclude,
            "background" => ScreenStatus::Background,
            "error"      => ScreenStatus::Error,
            _ => ScreenStatus::Other(raw.trim().to_string()),
        }
    }

    /// Status from a parsed screening payload's `status` field.
    pub fn from_output(output: &serde_json::Map<String, serde_json::Value>) -> Option<Self> {
        output.get("status").and_then(|v| v.as_str()).map(Self::parse)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ScreenStatus::Include    => "Include",
            ScreenStatus::Maybe      => "Maybe",
            ScreenStatus::Exclude    => "Exclude",
            ScreenStatus::Background => "Background",
            ScreenStatus::Error      => "ERROR",
            ScreenStatus::Other(s)   => s,
        }
    }

    /// Whether stages after screening are skipped for this status.
    pub fn blocks_downstream(&self) -> bool {
        matches!(self, ScreenStatus::Exclude | ScreenStatus::Background | ScreenStatus::Error)
    }
}

impl fmt::Display for ScreenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Run,
    Skip(String),
}

/// Gate for `stage` given what screening resolved to so far.
pub fn gate(stage: Stage, screen: Option<&ScreenStatus>) -> GateDecision {
    if stage == Stage::Screen {
        return GateDecision::Run;
    }
    match screen {
        Some(status) if status.blocks_downstream() => {
            GateDecision::Skip(format!("Skipped: screening status is {status}"))
        }
        _ => GateDecision::Run,
    }
}

pub fn should_run(stage: Stage, screen: Option<&ScreenStatus>) -> bool {
    gate(stage, screen) == GateDecision::Run
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_always_runs() {
        for status in [ScreenStatus::Exclude, ScreenStatus::Error, ScreenStatus::Background] {
            assert!(should_run(Stage::Screen, Some(&status)));
        }
    }

    #[test]
    fn test_blocking_statuses_skip_downstream_with_reason() {
        for raw in ["Exclude", "background", "ERROR"] {
            let status = ScreenStatus::parse(raw);
            for stage in &Stage::ALL[1..] {
                match gate(*stage, Some(&status)) {
                    GateDecision::Skip(reason) => assert!(reason.contains(status.as_str()), "{reason}"),
                    GateDecision::Run => panic!("{stage} should be skipped for {raw}"),
                }
            }
        }
    }

    #[test]
    fn test_include_maybe_and_unknown_proceed() {
        for status in [ScreenStatus::Include, ScreenStatus::Maybe, ScreenStatus::parse("Unsure")] {
            assert!(Stage::ALL.iter().all(|s| should_run(*s, Some(&status))));
        }
        assert!(should_run(Stage::Meta, None));
    }

    #[test]
    fn test_stage_serialises_as_key() {
        assert_eq!(serde_json::to_string(&Stage::Cg).unwrap(), "\"cg\"");
        assert_eq!(Stage::Esg.agent_id(), "slr-esg-tagger");
    }
}
