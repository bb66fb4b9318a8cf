//! Check/report sink.
//!
//! A [`Scenario`] accumulates named checks, notes and query evidence, grouped
//! into test cases and test steps. Failing a check never interrupts
//! execution; the only interruption is [`ScenarioCannotContinue`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fetch::Query;

pub type ParticipantId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Structural condition under which the remaining steps of a scenario would
/// produce meaningless results. Cleanup still runs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("test scenario cannot continue: {0}")]
pub struct ScenarioCannotContinue(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailedCheck {
    pub summary: String,
    pub severity: Severity,
    pub details: String,
    pub query_timestamps: Vec<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub name: String,
    pub participants: Vec<ParticipantId>,
    pub failures: Vec<FailedCheck>,
}

impl CheckRecord {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Check under evaluation, handed to the closure given to [`Scenario::check`].
#[derive(Debug)]
pub struct PendingCheck {
    failures: Vec<FailedCheck>,
}

impl PendingCheck {
    pub fn record_failed(
        &mut self,
        summary: impl Into<String>,
        severity: Severity,
        details: impl Into<String>,
        query_timestamps: Vec<DateTime<Utc>>,
    ) {
        self.failures.push(FailedCheck {
            summary: summary.into(),
            severity,
            details: details.into(),
            query_timestamps,
        });
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub key: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestStepReport {
    pub name: String,
    pub case: Option<String>,
    pub checks: Vec<CheckRecord>,
    pub queries: Vec<Query>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason")]
pub enum ScenarioOutcome {
    Passed,
    Failed,
    /// Execution was cancelled before all steps ran.
    Incomplete(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub outcome: ScenarioOutcome,
    pub steps: Vec<TestStepReport>,
    pub notes: Vec<Note>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ScenarioReport {
    pub fn checks(&self) -> impl Iterator<Item = &CheckRecord> {
        self.steps.iter().flat_map(|step| &step.checks)
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckRecord> {
        self.checks().filter(|check| !check.passed())
    }
}

/// Recorder for one scenario run.
#[derive(Debug)]
pub struct Scenario {
    name: String,
    case: Option<String>,
    current_step: Option<TestStepReport>,
    steps: Vec<TestStepReport>,
    notes: Vec<Note>,
    start_time: DateTime<Utc>,
}

impl Scenario {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        info!(scenario = %name, "Beginning test scenario");

        Self {
            name,
            case: None,
            current_step: None,
            steps: Vec::new(),
            notes: Vec::new(),
            start_time: Utc::now(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn begin_test_case(&mut self, name: impl Into<String>) {
        self.end_test_step();
        let name = name.into();
        info!(case = %name, "Beginning test case");
        self.case = Some(name);
    }

    pub fn end_test_case(&mut self) {
        self.end_test_step();
        self.case = None;
    }

    /// Opens a step; a step still open is closed first.
    pub fn begin_test_step(&mut self, name: impl Into<String>) {
        self.end_test_step();
        let name = name.into();
        debug!(step = %name, "Beginning test step");
        self.current_step = Some(TestStepReport {
            name,
            case: self.case.clone(),
            checks: Vec::new(),
            queries: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        });
    }

    pub fn end_test_step(&mut self) {
        if let Some(mut step) = self.current_step.take() {
            step.end_time = Some(Utc::now());
            self.steps.push(step);
        }
    }

    pub fn begin_cleanup(&mut self) {
        self.begin_test_case("Cleanup");
    }

    pub fn end_cleanup(&mut self) {
        self.end_test_case();
    }

    pub fn record_query(&mut self, query: &Query) {
        self.step_mut().queries.push(query.clone());
    }

    pub fn record_note(&mut self, key: impl Into<String>, message: impl Into<String>) {
        let note = Note {
            key: key.into(),
            message: message.into(),
            timestamp: Utc::now(),
        };
        info!(key = %note.key, message = %note.message, "Note recorded");
        self.notes.push(note);
    }

    /// Evaluates a check. `evaluate` records failures on the pending check;
    /// the check passes when it records none.
    pub fn check<P, F>(&mut self, name: &str, participants: P, evaluate: F) -> bool
    where
        P: IntoIterator,
        P::Item: Into<ParticipantId>,
        F: FnOnce(&mut PendingCheck),
    {
        let mut pending = PendingCheck {
            failures: Vec::new(),
        };
        evaluate(&mut pending);

        let record = CheckRecord {
            name: name.to_owned(),
            participants: participants.into_iter().map(Into::into).collect(),
            failures: pending.failures,
        };

        for failure in &record.failures {
            warn!(
                check = %record.name,
                participants = ?record.participants,
                severity = ?failure.severity,
                summary = %failure.summary,
                "Check failed"
            );
        }
        if record.passed() {
            debug!(check = %record.name, "Check passed");
        }

        let passed = record.passed();
        self.step_mut().checks.push(record);
        passed
    }

    /// Checks recorded so far, closed steps first.
    pub fn checks(&self) -> impl Iterator<Item = &CheckRecord> {
        self.steps
            .iter()
            .chain(&self.current_step)
            .flat_map(|step| &step.checks)
    }

    #[must_use]
    pub fn find_check(&self, name: &str) -> Option<&CheckRecord> {
        self.checks().find(|check| check.name == name)
    }

    #[must_use]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Closes any open step and produces the final report.
    #[must_use]
    pub fn finish(mut self, cancellation: Option<ScenarioCannotContinue>) -> ScenarioReport {
        self.end_test_case();

        let outcome = match cancellation {
            Some(ScenarioCannotContinue(reason)) => ScenarioOutcome::Incomplete(reason),
            None if self.checks().any(|check| !check.passed()) => ScenarioOutcome::Failed,
            None => ScenarioOutcome::Passed,
        };
        info!(scenario = %self.name, ?outcome, "Finished test scenario");

        ScenarioReport {
            name: self.name,
            outcome,
            steps: self.steps,
            notes: self.notes,
            start_time: self.start_time,
            end_time: Utc::now(),
        }
    }

    fn step_mut(&mut self) -> &mut TestStepReport {
        let case = self.case.clone();
        self.current_step.get_or_insert_with(|| TestStepReport {
            name: "(outside of a test step)".to_owned(),
            case,
            checks: Vec::new(),
            queries: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        })
    }
}
