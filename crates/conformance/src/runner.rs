//! Scenario execution with guaranteed cleanup.

use tracing::{info, warn};

use crate::report::{Scenario, ScenarioCannotContinue, ScenarioReport};

#[async_trait::async_trait]
pub trait TestScenario: Send {
    fn name(&self) -> &str;

    /// Runs the test cases. Returning an error skips the remaining ones.
    async fn run(&mut self, scenario: &mut Scenario) -> Result<(), ScenarioCannotContinue>;

    /// Releases whatever `run` created, however far it got.
    async fn cleanup(&mut self, scenario: &mut Scenario);
}

/// Runs `test_scenario` to completion or cancellation, then cleans up.
pub async fn run_scenario(test_scenario: &mut dyn TestScenario) -> ScenarioReport {
    let mut scenario = Scenario::new(test_scenario.name());

    let cancellation = test_scenario.run(&mut scenario).await.err();
    if let Some(reason) = &cancellation {
        warn!(scenario = %scenario.name(), %reason, "Scenario cancelled");
    }

    scenario.begin_cleanup();
    test_scenario.cleanup(&mut scenario).await;
    scenario.end_cleanup();

    let report = scenario.finish(cancellation);
    info!(
        scenario = %report.name,
        checks = report.checks().count(),
        failed = report.failed_checks().count(),
        "Scenario report ready"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ScenarioOutcome, Severity};

    #[derive(Debug, Default)]
    struct Scripted {
        cancel: bool,
        fail_check: bool,
        ran_after_cancel: bool,
        cleaned_up: bool,
    }

    #[async_trait::async_trait]
    impl TestScenario for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn run(&mut self, scenario: &mut Scenario) -> Result<(), ScenarioCannotContinue> {
            scenario.begin_test_case("Case");
            scenario.begin_test_step("Step");
            let fail = self.fail_check;
            let _ = scenario.check("Check", ["uss1"], |check| {
                if fail {
                    check.record_failed("bad", Severity::High, "details", Vec::new());
                }
            });

            if self.cancel {
                return Err(ScenarioCannotContinue("ambiguous".to_owned()));
            }
            self.ran_after_cancel = true;
            scenario.end_test_case();
            Ok(())
        }

        async fn cleanup(&mut self, scenario: &mut Scenario) {
            scenario.begin_test_step("Delete flights");
            let _ = scenario.check("Successful flight deletion", ["uss1"], |_| {});
            self.cleaned_up = true;
        }
    }

    #[tokio::test]
    async fn test_cleanup_runs_after_cancellation() {
        let mut scripted = Scripted {
            cancel: true,
            ..Scripted::default()
        };

        let report = run_scenario(&mut scripted).await;

        assert!(scripted.cleaned_up, "cleanup ran");
        assert!(!scripted.ran_after_cancel, "remaining steps skipped");
        assert_eq!(
            report.outcome,
            ScenarioOutcome::Incomplete("ambiguous".to_owned()),
            "cancelled scenario is incomplete"
        );
        let last = report.steps.last().unwrap();
        assert_eq!(last.case.as_deref(), Some("Cleanup"), "cleanup recorded in its own case");
    }

    #[tokio::test]
    async fn test_outcome_follows_checks() {
        let report = run_scenario(&mut Scripted::default()).await;
        assert_eq!(report.outcome, ScenarioOutcome::Passed, "all checks passed");

        let mut failing = Scripted {
            fail_check: true,
            ..Scripted::default()
        };
        let report = run_scenario(&mut failing).await;
        assert_eq!(report.outcome, ScenarioOutcome::Failed, "a check failed");
        assert!(failing.cleaned_up, "cleanup ran");
    }
}
