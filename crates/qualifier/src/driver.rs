use core::fmt::Write;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{bail, Result as EyreResult};
use tokio::fs::{create_dir_all, write};
use tracing::info;
use utm_conformance::dss::HttpDss;
use utm_conformance::mock_uss::MockUssClient;
use utm_conformance::planner::HttpFlightPlanner;
use utm_conformance::report::ScenarioOutcome;
use utm_conformance::schema::OpenApiSchemaValidator;
use utm_conformance::{run_scenario, ScenarioReport, TestScenario};

use crate::config::Config;
use crate::output::OutputWriter;
use crate::scenarios::{GetOpResponseDataValidationBySut, Resources};

#[derive(Debug)]
pub struct Driver {
    config: Config,
    output_dir: Utf8PathBuf,
    output_writer: OutputWriter,
}

impl Driver {
    pub const fn new(config: Config, output_dir: Utf8PathBuf, output_writer: OutputWriter) -> Self {
        Self {
            config,
            output_dir,
            output_writer,
        }
    }

    pub async fn run(&self) -> EyreResult<()> {
        create_dir_all(&self.output_dir).await?;

        let client = self.config.client()?;
        let dss = HttpDss::new(self.config.dss.session(&client));
        let sut = HttpFlightPlanner::new(self.config.sut.session(&client));
        let control_uss = HttpFlightPlanner::new(self.config.control_uss.session(&client));
        let mock_uss = MockUssClient::new(self.config.mock_uss.session(&client));
        let schemas = OpenApiSchemaValidator::new()?;
        let resources = Resources {
            sut: &sut,
            control_uss: &control_uss,
            dss: &dss,
            mock_uss: &mock_uss,
            schemas: &schemas,
        };

        let flight_intents = self.config.load_flight_intents().await?;
        info!(count = flight_intents.len(), "Loaded flight intents");

        let mut report = TestRunReport::default();

        let mut scenario = GetOpResponseDataValidationBySut::new(resources, &flight_intents)?;
        self.output_writer
            .write_header(&format!("Running scenario {}", scenario.name()), 1);
        let scenario_report = run_scenario(&mut scenario).await;
        self.write_scenario(&scenario_report);
        report.scenarios.push(scenario_report);

        if let Err(e) = report.result() {
            self.output_writer.write_str("Error occurred during test run:");
            self.output_writer.write_str(&e.to_string());
        }

        let report_file = report.store_to_file(&self.output_dir).await?;

        self.output_writer
            .write_str(&format!("Report file: {report_file:?}"));

        report.result()
    }

    fn write_scenario(&self, report: &ScenarioReport) {
        for step in &report.steps {
            let header = match &step.case {
                Some(case) => format!("{case}: {}", step.name),
                None => step.name.clone(),
            };
            self.output_writer.write_header(&header, 2);

            for check in &step.checks {
                self.output_writer.write_check(check);
            }
        }

        self.output_writer
            .write_header(&format!("Finished scenario {}: {:?}", report.name, report.outcome), 1);
    }
}

#[derive(Debug, Default)]
struct TestRunReport {
    scenarios: Vec<ScenarioReport>,
}

impl TestRunReport {
    fn result(&self) -> EyreResult<()> {
        let errors: Vec<String> = self
            .scenarios
            .iter()
            .filter_map(|scenario| match &scenario.outcome {
                ScenarioOutcome::Passed => None,
                ScenarioOutcome::Failed => Some(format!(
                    "{}: {} failed checks",
                    scenario.name,
                    scenario.failed_checks().count()
                )),
                ScenarioOutcome::Incomplete(reason) => {
                    Some(format!("{}: incomplete: {reason}", scenario.name))
                }
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            bail!("Errors occurred during test run: {:?}", errors)
        }
    }

    async fn store_to_file(&self, folder: &Utf8Path) -> EyreResult<Utf8PathBuf> {
        let json_file = folder.join("report.json");
        write(&json_file, serde_json::to_vec_pretty(&self.scenarios)?).await?;

        let report_file = folder.join("report.md");
        write(&report_file, self.to_markdown()?).await?;
        Ok(report_file)
    }

    fn to_markdown(&self) -> EyreResult<String> {
        let mut markdown = String::new();

        writeln!(&mut markdown, "## Conformance report")?;

        for scenario in &self.scenarios {
            writeln!(&mut markdown, "### Scenario: {}", scenario.name)?;
            match &scenario.outcome {
                ScenarioOutcome::Passed => writeln!(&mut markdown, "Outcome: :white_check_mark:")?,
                ScenarioOutcome::Failed => writeln!(&mut markdown, "Outcome: :x:")?,
                ScenarioOutcome::Incomplete(reason) => {
                    writeln!(&mut markdown, "Outcome: :fast_forward: ({reason})")?;
                }
            }
            writeln!(&mut markdown)?;

            writeln!(&mut markdown, "| Test case | Test step | Check | Participants | Result |")?;
            writeln!(&mut markdown, "| :--- | :--- | :--- | :--- | :---: |")?;
            for step in &scenario.steps {
                for check in &step.checks {
                    let result = if check.passed() {
                        ":white_check_mark:"
                    } else {
                        ":x:"
                    };
                    writeln!(
                        &mut markdown,
                        "| {} | {} | {} | {} | {result} |",
                        step.case.as_deref().unwrap_or_default(),
                        step.name,
                        check.name,
                        check.participants.join(", "),
                    )?;
                }
            }
            writeln!(&mut markdown)?;

            if scenario.failed_checks().next().is_some() {
                writeln!(&mut markdown, "#### Failures")?;
                for check in scenario.failed_checks() {
                    for failure in &check.failures {
                        writeln!(
                            &mut markdown,
                            "- **{}** ({:?}): {}. {}",
                            check.name, failure.severity, failure.summary, failure.details
                        )?;
                    }
                }
                writeln!(&mut markdown)?;
            }

            if !scenario.notes.is_empty() {
                writeln!(&mut markdown, "#### Notes")?;
                for note in &scenario.notes {
                    writeln!(&mut markdown, "- **{}**: {}", note.key, note.message)?;
                }
                writeln!(&mut markdown)?;
            }
        }

        Ok(markdown)
    }
}
