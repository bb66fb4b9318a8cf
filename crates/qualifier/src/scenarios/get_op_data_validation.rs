//! The SUT must retrieve the details of nearby operational intents before
//! planning, and must refuse to plan when the details it retrieves are
//! invalid.

use std::collections::BTreeMap;

use chrono::Utc;
use eyre::{bail, ensure, eyre, Result as EyreResult};
use serde_json::json;
use tracing::{debug, info};
use url::Position;
use utm_conformance::geometry::{BoundingVolume, Volume4D};
use utm_conformance::interactions::{
    validate_get_interactions, validate_no_post_interactions, validate_post_interactions,
};
use utm_conformance::model::{
    Capability, DeleteFlightResult, FlightIntent, InjectFlightResponse, MockUssFlightBehavior,
    OperationalIntentReference, OperationalIntentState,
};
use utm_conformance::planner::FlightPlanner;
use utm_conformance::steps::{
    check_capabilities, cleanup_flights, clear_area, delete_flight_intent, plan_flight_intent,
    plan_flight_intent_expect_failed,
    validate_sharing_operational_intent_with_invalid_interuss_data,
};
use utm_conformance::{OpIntentValidator, Scenario, ScenarioCannotContinue, TestScenario};

use super::Resources;

const NAME: &str = "Data exchange validation of GET operational intents by SUT";

const FLIGHT_1_PLANNED_A: &str = "flight_1_planned_time_range_A";
const FLIGHT_1_ACTIVATED_A: &str = "flight_1_activated_time_range_A";
const FLIGHT_1_PLANNED_B: &str = "flight_1_planned_time_range_B";
const FLIGHT_2_PLANNED_A: &str = "flight_2_planned_time_range_A";
const FLIGHT_2_ACTIVATED_A: &str = "flight_2_activated_time_range_A";
const FLIGHT_2_EQUAL_PRIO_PLANNED_B: &str = "flight_2_equal_prio_planned_time_range_B";

#[derive(Debug)]
pub struct GetOpResponseDataValidationBySut<'a> {
    resources: Resources<'a>,
    area: Volume4D,
    flight_1_planned_b: FlightIntent,
    flight_1_extent: Volume4D,
    flight_2_planned_a: FlightIntent,
    flight_2_extent: Volume4D,
    sut_flights: Vec<String>,
    control_flights: Vec<String>,
}

impl<'a> GetOpResponseDataValidationBySut<'a> {
    pub fn new(
        resources: Resources<'a>,
        flight_intents: &BTreeMap<String, FlightIntent>,
    ) -> EyreResult<Self> {
        let intent = |name: &str| {
            flight_intents.get(name).ok_or_else(|| {
                eyre!(
                    "`{NAME}` requirements for flight intents not met: missing flight intent {name}"
                )
            })
        };

        let mut all_intents = Vec::new();

        for (name, state) in [
            (FLIGHT_1_PLANNED_A, OperationalIntentState::Accepted),
            (FLIGHT_1_ACTIVATED_A, OperationalIntentState::Activated),
            (FLIGHT_1_PLANNED_B, OperationalIntentState::Accepted),
            (FLIGHT_2_PLANNED_A, OperationalIntentState::Accepted),
            (FLIGHT_2_ACTIVATED_A, OperationalIntentState::Activated),
            (FLIGHT_2_EQUAL_PRIO_PLANNED_B, OperationalIntentState::Accepted),
        ] {
            let flight_intent = intent(name)?;
            let actual = flight_intent.declared_state();
            ensure!(
                actual == state,
                "`{NAME}` requirements for flight intents not met: \
                 {name} must have state {state}, not {actual}"
            );
            all_intents.push(flight_intent);
        }

        let flight_1_planned_a = intent(FLIGHT_1_PLANNED_A)?;
        let flight_2_equal_prio = intent(FLIGHT_2_EQUAL_PRIO_PLANNED_B)?;
        ensure!(
            flight_2_equal_prio.priority() == flight_1_planned_a.priority(),
            "`{NAME}` requirements for flight intents not met: \
             flight_2 must have priority equal to flight_1"
        );

        let flight_1_bounds = bounds(FLIGHT_1_PLANNED_A, flight_1_planned_a)?;
        for name in [FLIGHT_2_PLANNED_A, FLIGHT_2_EQUAL_PRIO_PLANNED_B] {
            ensure!(
                !flight_1_bounds.intersects(&bounds(name, intent(name)?)?),
                "`{NAME}` requirements for flight intents not met: \
                 {FLIGHT_1_PLANNED_A} and {name} must not intersect"
            );
        }

        let Some(area) = BoundingVolume::of(all_intents.iter().flat_map(|i| i.volumes())) else {
            bail!(
                "`{NAME}` requirements for flight intents not met: no flight intent has volumes"
            );
        };

        let flight_1_planned_b = intent(FLIGHT_1_PLANNED_B)?.clone();
        let flight_2_planned_a = intent(FLIGHT_2_PLANNED_A)?.clone();

        Ok(Self {
            resources,
            area: area.to_volume4d(),
            flight_1_extent: bounds(FLIGHT_1_PLANNED_B, &flight_1_planned_b)?.to_volume4d(),
            flight_1_planned_b,
            flight_2_extent: bounds(FLIGHT_2_PLANNED_A, &flight_2_planned_a)?.to_volume4d(),
            flight_2_planned_a,
            sut_flights: Vec::new(),
            control_flights: Vec::new(),
        })
    }

    /// Returns whether the participants can take part in the scenario.
    async fn setup(&self, scenario: &mut Scenario) -> bool {
        let planners = [self.resources.sut, self.resources.control_uss];
        if !check_capabilities(
            scenario,
            "Check for necessary capabilities",
            &planners,
            Capability::BasicStrategicConflictDetection,
        )
        .await
        {
            return false;
        }

        let _ = clear_area(scenario, "Area clearing", &self.area, &planners).await;
        true
    }

    async fn sut_plans_deconflicted_flight_near_existing_flight(
        &mut self,
        scenario: &mut Scenario,
    ) -> Result<(), ScenarioCannotContinue> {
        let Resources {
            sut,
            control_uss,
            dss,
            mock_uss,
            schemas,
        } = self.resources;

        let validator = OpIntentValidator::new(
            control_uss.participant_id(),
            dss,
            schemas,
            "Validate flight 2 sharing",
            self.flight_2_extent.clone(),
        )
        .open()
        .await;
        let (resp_flight_2, flight_2_id) = plan_flight_intent(
            scenario,
            "Plan Control USS flight - flight 2",
            control_uss,
            &self.flight_2_planned_a,
        )
        .await?;
        track(&mut self.control_flights, resp_flight_2.as_ref(), &flight_2_id);
        let shared_flight_2 = validator
            .expect_shared(scenario, &self.flight_2_planned_a, false)
            .await?;
        let flight_2_op_intent_id = op_intent_id(resp_flight_2.as_ref(), shared_flight_2.as_ref());

        let since = Utc::now();

        let validator = OpIntentValidator::new(
            sut.participant_id(),
            dss,
            schemas,
            "Validate flight 1 sharing",
            self.flight_1_extent.clone(),
        )
        .open()
        .await;
        let (resp_flight_1, flight_1_id) =
            plan_flight_intent(scenario, "SUT plans flight 1", sut, &self.flight_1_planned_b)
                .await?;
        track(&mut self.sut_flights, resp_flight_1.as_ref(), &flight_1_id);
        let _ = validator
            .expect_shared(scenario, &self.flight_1_planned_b, false)
            .await?;

        let control_uss_domain = domain(control_uss);
        if let Some(op_intent_id) = &flight_2_op_intent_id {
            let _ = validate_get_interactions(
                scenario,
                mock_uss,
                since,
                &control_uss_domain,
                op_intent_id,
                "Validate flight2 GET",
            )
            .await;
        } else {
            note_missing_op_intent_id(scenario, control_uss, "Validate flight2 GET");
        }
        let _ = validate_post_interactions(
            scenario,
            mock_uss,
            since,
            &control_uss_domain,
            "Validate flight2 Notification",
        )
        .await;

        delete_flight(
            scenario,
            "Delete sut flight",
            sut,
            &mut self.sut_flights,
            &flight_1_id,
        )
        .await;
        delete_flight(
            scenario,
            "Delete control flight",
            control_uss,
            &mut self.control_flights,
            &flight_2_id,
        )
        .await;

        Ok(())
    }

    async fn sut_plans_deconflicted_flight_near_invalid_shared_existing_flight(
        &mut self,
        scenario: &mut Scenario,
    ) -> Result<(), ScenarioCannotContinue> {
        let Resources {
            sut,
            control_uss,
            dss,
            mock_uss,
            schemas,
        } = self.resources;

        let invalid_flight_2 = self.flight_2_planned_a.with_behavior(MockUssFlightBehavior {
            modify_sharing_methods: vec!["GET".to_owned(), "POST".to_owned()],
            modify_fields: json!({
                "operational_intent_reference": {"state": "Flying"},
                "operational_intent_details": {"priority": -1},
            }),
        });
        let (resp_flight_2, flight_2_id) = plan_flight_intent(
            scenario,
            "Plan Control USS flight - flight 2, sharing invalid interuss data",
            control_uss,
            &invalid_flight_2,
        )
        .await?;
        track(&mut self.control_flights, resp_flight_2.as_ref(), &flight_2_id);

        let flight_2_op_intent_id = op_intent_id(resp_flight_2.as_ref(), None);
        if let Some(op_intent_id) = &flight_2_op_intent_id {
            let _ = validate_sharing_operational_intent_with_invalid_interuss_data(
                scenario,
                control_uss,
                dss,
                schemas,
                "Validate flight 2 shared intent with invalid interuss data",
                &self.flight_2_planned_a,
                op_intent_id,
                false,
            )
            .await?;
        } else {
            note_missing_op_intent_id(
                scenario,
                control_uss,
                "Validate flight 2 shared intent with invalid interuss data",
            );
        }

        let since = Utc::now();

        let validator = OpIntentValidator::new(
            sut.participant_id(),
            dss,
            schemas,
            "Validate flight 1 not shared",
            self.flight_1_extent.clone(),
        )
        .open()
        .await;
        let (resp_flight_1, flight_1_id) = plan_flight_intent_expect_failed(
            scenario,
            "SUT attempts to plan flight 1, expect failure",
            sut,
            &self.flight_1_planned_b,
        )
        .await?;
        debug!(response = ?resp_flight_1, "Response on submission to SUT");
        track(&mut self.sut_flights, resp_flight_1.as_ref(), &flight_1_id);
        validator.expect_not_shared(scenario).await?;

        let control_uss_domain = domain(control_uss);
        if let Some(op_intent_id) = &flight_2_op_intent_id {
            let _ = validate_get_interactions(
                scenario,
                mock_uss,
                since,
                &control_uss_domain,
                op_intent_id,
                "Validate flight2 GET",
            )
            .await;
        } else {
            note_missing_op_intent_id(scenario, control_uss, "Validate flight2 GET");
        }
        let _ = validate_no_post_interactions(
            scenario,
            mock_uss,
            since,
            &control_uss_domain,
            "Validate flight2 Notification not sent",
        )
        .await;

        delete_flight(
            scenario,
            "Delete Control USS flight",
            control_uss,
            &mut self.control_flights,
            &flight_2_id,
        )
        .await;

        Ok(())
    }
}

#[async_trait::async_trait]
impl TestScenario for GetOpResponseDataValidationBySut<'_> {
    fn name(&self) -> &str {
        NAME
    }

    async fn run(&mut self, scenario: &mut Scenario) -> Result<(), ScenarioCannotContinue> {
        scenario.record_note("System Under Test", self.resources.sut.participant_id());
        scenario.record_note("Control USS", self.resources.control_uss.participant_id());

        scenario.begin_test_case("Setup");
        let ready = self.setup(scenario).await;
        scenario.end_test_case();
        if !ready {
            return Ok(());
        }

        scenario.begin_test_case("Attempt to plan no conflict flight - near existing flight");
        self.sut_plans_deconflicted_flight_near_existing_flight(scenario)
            .await?;
        scenario.end_test_case();

        scenario.begin_test_case(
            "Attempt to plan deconflicted flight - near a flight sharing invalid data",
        );
        self.sut_plans_deconflicted_flight_near_invalid_shared_existing_flight(scenario)
            .await?;
        scenario.end_test_case();

        Ok(())
    }

    async fn cleanup(&mut self, scenario: &mut Scenario) {
        scenario.begin_test_step("Cleanup flights");
        let Resources {
            sut, control_uss, ..
        } = self.resources;

        cleanup_flights(scenario, control_uss, &mut self.control_flights).await;
        cleanup_flights(scenario, sut, &mut self.sut_flights).await;

        if !self.control_flights.is_empty() || !self.sut_flights.is_empty() {
            info!(
                control = ?self.control_flights,
                sut = ?self.sut_flights,
                "Flights left behind after cleanup"
            );
        }
        scenario.end_test_step();
    }
}

fn bounds(name: &str, flight_intent: &FlightIntent) -> EyreResult<BoundingVolume> {
    let Some(bounds) = flight_intent.bounding_volume() else {
        bail!("`{NAME}` requirements for flight intents not met: {name} has no volumes");
    };
    Ok(bounds)
}

/// Scheme and authority of the planner's base URL, as the mock USS logs it.
fn domain(planner: &dyn FlightPlanner) -> String {
    format!("{}/", &planner.base_url()[..Position::BeforePath])
}

fn op_intent_id(
    response: Option<&InjectFlightResponse>,
    shared: Option<&OperationalIntentReference>,
) -> Option<String> {
    response
        .and_then(|response| response.operational_intent_id.clone())
        .or_else(|| shared.map(|reference| reference.id.clone()))
}

fn track(flights: &mut Vec<String>, response: Option<&InjectFlightResponse>, flight_id: &str) {
    if response.is_some() {
        flights.push(flight_id.to_owned());
    }
}

fn note_missing_op_intent_id(
    scenario: &mut Scenario,
    planner: &dyn FlightPlanner,
    test_step: &str,
) {
    scenario.record_note(
        planner.participant_id(),
        format!("No operational intent ID is known for the flight, skipping test step {test_step}"),
    );
}

async fn delete_flight(
    scenario: &mut Scenario,
    test_step: &str,
    planner: &dyn FlightPlanner,
    flights: &mut Vec<String>,
    flight_id: &str,
) {
    let response = delete_flight_intent(scenario, test_step, planner, flight_id).await;
    if response.is_some_and(|response| response.result == DeleteFlightResult::Closed) {
        flights.retain(|id| id != flight_id);
    }
}
