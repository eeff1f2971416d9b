use crate::outcome::{ExecutionStatus, Outcome};
use crate::target::TargetKind;
use serde::Serialize;
use std::time::Duration;

/// The configuration that produced a session.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SessionConfig {
    pub generator: String,
    /// Number of cases requested; a corpus may supply fewer.
    pub case_count: usize,
    #[serde(with = "optional_millis")]
    pub timeout: Option<Duration>,
    pub target: String,
    pub target_kind: TargetKind,
    pub workers: usize,
}

mod optional_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }
}

/// The ordered outcomes of one runner invocation.
///
/// Outcomes are kept in input-draw order. A session has no mutating
/// accessors; once built it is only read and persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    config: SessionConfig,
    outcomes: Vec<Outcome>,
}

impl Session {
    pub fn new(config: SessionConfig, outcomes: Vec<Outcome>) -> Self {
        Self { config, outcomes }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn into_outcomes(self) -> Vec<Outcome> {
        self.outcomes
    }

    pub fn summary(&self) -> SessionSummary {
        let mut summary = SessionSummary {
            total: self.outcomes.len(),
            ..Default::default()
        };
        for outcome in &self.outcomes {
            match outcome.status() {
                ExecutionStatus::Ok(_) => summary.ok += 1,
                ExecutionStatus::Error(_) => summary.errors += 1,
                ExecutionStatus::Timeout => summary.timeouts += 1,
                ExecutionStatus::Exited(p) if p.success() => summary.clean_exits += 1,
                ExecutionStatus::Exited(_) => summary.failing_exits += 1,
            }
        }
        summary
    }
}

/// Per-status counts over a session.
#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct SessionSummary {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
    pub timeouts: usize,
    pub clean_exits: usize,
    pub failing_exits: usize,
}

impl SessionSummary {
    pub fn failures(&self) -> usize {
        self.errors + self.timeouts + self.failing_exits
    }

    /// Fraction of outcomes that failed; 0.0 for an empty session.
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failures() as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Input;
    use crate::outcome::ProcessOutput;

    fn config() -> SessionConfig {
        SessionConfig {
            generator: "random-string".into(),
            case_count: 5,
            timeout: Some(Duration::from_millis(250)),
            target: "processor".into(),
            target_kind: TargetKind::InProcess,
            workers: 1,
        }
    }

    #[test]
    fn summary_counts_each_status() {
        let exit = |code| {
            ExecutionStatus::Exited(ProcessOutput {
                exit_code: Some(code),
                ..Default::default()
            })
        };
        let outcomes = vec![
            Outcome::new(Input::from("a"), ExecutionStatus::Ok("A".into())),
            Outcome::new(Input::from("b"), ExecutionStatus::Error("bad".into())),
            Outcome::new(Input::from("c"), ExecutionStatus::Timeout),
            Outcome::new(Input::from("d"), exit(0)),
            Outcome::new(Input::from("e"), exit(1)),
        ];
        let session = Session::new(config(), outcomes);
        let summary = session.summary();
        assert_eq!(
            summary,
            SessionSummary {
                total: 5,
                ok: 1,
                errors: 1,
                timeouts: 1,
                clean_exits: 1,
                failing_exits: 1,
            }
        );
        assert_eq!(summary.failures(), 3);
        assert!((summary.failure_rate() - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_session_has_zero_failure_rate() {
        let session = Session::new(config(), Vec::new());
        assert!(session.is_empty());
        assert_eq!(session.summary().failure_rate(), 0.0);
    }

    #[test]
    fn config_serializes_timeout_in_millis() {
        let value = serde_json::to_value(config()).unwrap();
        assert_eq!(value["timeout"], serde_json::json!(250));
        assert_eq!(value["target-kind"], serde_json::json!("in-process"));
    }
}
