//! Reusable test steps shared by scenarios: planner capabilities, area
//! clearing, planning submissions, deletion, USS availability and validation
//! of deliberately invalid sharing.

use std::fmt::Write as _;

use tracing::{debug, info, warn};

use crate::dss::Dss;
use crate::fetch::Query;
use crate::geometry::Volume4D;
use crate::model::{
    Capability, DeleteFlightResponse, DeleteFlightResult, FlightIntent, InjectFlightResponse,
    InjectFlightResult, OperationalIntentState,
};
use crate::planner::FlightPlanner;
use crate::report::{Scenario, ScenarioCannotContinue, Severity};
use crate::schema::{SchemaId, SchemaValidator};
use crate::validator::{check_off_nominal, check_retrievable, check_vertices};

pub const VALID_CAPABILITIES_CHECK: &str = "Valid responses";
pub const AREA_CLEARED_CHECK: &str = "Area cleared successfully";
pub const AVAILABLE_CHECK: &str = "USS availability successfully set to 'Available'";
pub const DOWN_CHECK: &str = "USS availability successfully set to 'Down'";
pub const SUCCESSFUL_PLANNING_CHECK: &str = "Successful planning";
pub const PLANNING_FAILURE_CHECK: &str = "Failure";
pub const PLAN_SHOULD_FAIL_CHECK: &str = "Plan should fail";
pub const FAILURE_IF_PLANNED_CHECK: &str = "Failure If Planned";
pub const FAILURE_IF_CONFLICT_CHECK: &str = "Failure If Conflict";
pub const FAILURE_IF_REJECTED_CHECK: &str = "Failure If Rejected";
pub const SUCCESSFUL_DELETION_CHECK: &str = "Successful deletion";
pub const CLEANUP_CHECK: &str = "Successful flight deletion";
pub const DSS_RESPONSE_CHECK: &str = "DSS response";
pub const SHARED_WITH_DSS_CHECK: &str = "Operational intent shared with DSS";
pub const INVALID_DATA_FORMAT_CHECK: &str = "Operational intent details invalid data format";

/// Fresh identifier for a flight injected by the qualifier.
#[must_use]
pub fn new_flight_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Queries the capabilities of every planner in `planners`.
///
/// Returns whether all of them support `required`. When one does not, the
/// reason is noted and the scenario is expected to stop without failing.
pub async fn check_capabilities(
    scenario: &mut Scenario,
    test_step: &str,
    planners: &[&dyn FlightPlanner],
    required: Capability,
) -> bool {
    scenario.begin_test_step(test_step);
    let mut unsupported = Vec::new();

    for planner in planners {
        let participant = planner.participant_id();
        let (response, query) = planner.get_capabilities().await;
        scenario.record_query(&query);

        let _ = scenario.check(VALID_CAPABILITIES_CHECK, [participant], |check| {
            if response.is_none() {
                check.record_failed(
                    format!("Error from {participant} when querying capabilities"),
                    Severity::High,
                    transport_details(&query),
                    vec![query.timestamp()],
                );
            }
        });

        let supported = response
            .as_ref()
            .is_some_and(|response| response.capabilities.contains(&required));
        debug!(%participant, %required, supported, "Capabilities queried");
        if !supported {
            unsupported.push(participant);
        }
    }

    if !unsupported.is_empty() {
        let message = format!(
            "Flight planner(s) {} do not support the required capability {required}",
            unsupported.join(", ")
        );
        info!(%message, "Skipping scenario");
        scenario.record_note("Skip reason", message);
    }

    scenario.end_test_step();
    unsupported.is_empty()
}

/// Asks every planner in `planners` to remove its flights from `extent`.
pub async fn clear_area(
    scenario: &mut Scenario,
    test_step: &str,
    extent: &Volume4D,
    planners: &[&dyn FlightPlanner],
) -> bool {
    scenario.begin_test_step(test_step);
    let mut all_cleared = true;

    for planner in planners {
        let participant = planner.participant_id();
        let (response, query) = planner.clear_area(&new_flight_id(), extent).await;
        scenario.record_query(&query);

        let cleared = scenario.check(AREA_CLEARED_CHECK, [participant], |check| match &response {
            None => check.record_failed(
                format!("Error from {participant} when attempting to clear the area"),
                Severity::High,
                transport_details(&query),
                vec![query.timestamp()],
            ),
            Some(response) if !response.outcome.success => check.record_failed(
                "Area could not be cleared",
                Severity::High,
                format!(
                    "{participant} indicated: \"{}\"",
                    response.outcome.message.as_deref().unwrap_or_default()
                ),
                vec![query.timestamp()],
            ),
            Some(_) => {}
        });
        all_cleared &= cleared;
    }

    scenario.end_test_step();
    all_cleared
}

pub async fn set_uss_available(
    scenario: &mut Scenario,
    test_step: &str,
    dss: &dyn Dss,
    uss_sub: &str,
) -> Option<String> {
    set_uss_availability(scenario, test_step, dss, uss_sub, true).await
}

pub async fn set_uss_down(
    scenario: &mut Scenario,
    test_step: &str,
    dss: &dyn Dss,
    uss_sub: &str,
) -> Option<String> {
    set_uss_availability(scenario, test_step, dss, uss_sub, false).await
}

async fn set_uss_availability(
    scenario: &mut Scenario,
    test_step: &str,
    dss: &dyn Dss,
    uss_sub: &str,
    available: bool,
) -> Option<String> {
    scenario.begin_test_step(test_step);
    let (version, query) = dss.set_uss_availability(uss_sub, available).await;
    scenario.record_query(&query);

    let (check_name, target) = if available {
        (AVAILABLE_CHECK, "available")
    } else {
        (DOWN_CHECK, "down")
    };
    let _ = scenario.check(check_name, [dss.participant_id()], |check| {
        if version.is_none() {
            check.record_failed(
                format!("Availability of USS {uss_sub} could not be set to {target}"),
                Severity::High,
                format!(
                    "DSS responded code {}; error message: {}",
                    query.status_code(),
                    query.error_message().unwrap_or_default()
                ),
                vec![query.timestamp()],
            );
        }
    });

    scenario.end_test_step();
    version
}

/// Fails the scenario's test data, not a participant, when a flight intent
/// is not in the state a step requires.
pub fn expect_flight_intent_state(
    flight_intent: &FlightIntent,
    expected: OperationalIntentState,
    test_step: &str,
) -> Result<(), ScenarioCannotContinue> {
    let actual = flight_intent.declared_state();
    if actual == expected {
        return Ok(());
    }

    Err(ScenarioCannotContinue(format!(
        "error in test data: operational intent state for {test_step} is expected to be `{expected}`, but got `{actual}` instead"
    )))
}

/// Submits `flight_intent` under `flight_id` in its own test step.
///
/// The result must be one of `expected_results` for `success_check` to
/// pass. Each entry of `failed_checks` names a check that fails when the
/// planner answers with its result; every such check is recorded either way.
#[expect(clippy::too_many_arguments, reason = "one argument per step input")]
pub async fn submit_flight_intent(
    scenario: &mut Scenario,
    test_step: &str,
    success_check: &str,
    expected_results: &[InjectFlightResult],
    failed_checks: &[(InjectFlightResult, &str)],
    planner: &dyn FlightPlanner,
    flight_intent: &FlightIntent,
    flight_id: &str,
) -> Option<InjectFlightResponse> {
    scenario.begin_test_step(test_step);
    let participant = planner.participant_id();

    let (response, query) = planner.request_flight(flight_id, flight_intent).await;
    scenario.record_query(&query);

    let Some(response) = response else {
        warn!(%participant, flight_id, status = query.status_code(), "No usable planning response");
        let _ = scenario.check(success_check, [participant], |check| {
            check.record_failed(
                format!(
                    "Error from {participant} when attempting to submit a flight intent (flight ID: {flight_id})"
                ),
                Severity::High,
                transport_details(&query),
                vec![query.timestamp()],
            );
        });
        scenario.end_test_step();
        return None;
    };
    info!(%participant, flight_id, result = %response.result, "Flight intent submitted");

    let expected = expected_results
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" or ");
    let mut details = format!(
        "{participant} indicated {} rather than the expected {expected}",
        response.result
    );
    if let Some(notes) = response.notes.as_deref().filter(|n| !n.is_empty()) {
        let _ = write!(details, ": \"{notes}\"");
    }
    let summary = format!("Flight unexpectedly {}", response.result);

    for (unexpected, check_name) in failed_checks {
        let _ = scenario.check(check_name, [participant], |check| {
            if response.result == *unexpected {
                check.record_failed(
                    summary.clone(),
                    Severity::High,
                    details.clone(),
                    vec![query.timestamp()],
                );
            }
        });
    }

    let _ = scenario.check(success_check, [participant], |check| {
        if !expected_results.contains(&response.result) {
            check.record_failed(summary, Severity::High, details, vec![query.timestamp()]);
        }
    });

    scenario.end_test_step();
    Some(response)
}

/// Plans an Accepted flight intent under a new flight id, returned alongside
/// the planner's response.
pub async fn plan_flight_intent(
    scenario: &mut Scenario,
    test_step: &str,
    planner: &dyn FlightPlanner,
    flight_intent: &FlightIntent,
) -> Result<(Option<InjectFlightResponse>, String), ScenarioCannotContinue> {
    expect_flight_intent_state(flight_intent, OperationalIntentState::Accepted, test_step)?;

    let flight_id = new_flight_id();
    let response = submit_flight_intent(
        scenario,
        test_step,
        SUCCESSFUL_PLANNING_CHECK,
        &[InjectFlightResult::Planned],
        &[(InjectFlightResult::Failed, PLANNING_FAILURE_CHECK)],
        planner,
        flight_intent,
        &flight_id,
    )
    .await;

    Ok((response, flight_id))
}

/// Attempts to plan an Accepted flight intent that the planner must refuse
/// with a `Failed` result.
pub async fn plan_flight_intent_expect_failed(
    scenario: &mut Scenario,
    test_step: &str,
    planner: &dyn FlightPlanner,
    flight_intent: &FlightIntent,
) -> Result<(Option<InjectFlightResponse>, String), ScenarioCannotContinue> {
    expect_flight_intent_state(flight_intent, OperationalIntentState::Accepted, test_step)?;

    let flight_id = new_flight_id();
    let response = submit_flight_intent(
        scenario,
        test_step,
        PLAN_SHOULD_FAIL_CHECK,
        &[InjectFlightResult::Failed],
        &[
            (InjectFlightResult::Planned, FAILURE_IF_PLANNED_CHECK),
            (InjectFlightResult::ConflictWithFlight, FAILURE_IF_CONFLICT_CHECK),
            (InjectFlightResult::Rejected, FAILURE_IF_REJECTED_CHECK),
        ],
        planner,
        flight_intent,
        &flight_id,
    )
    .await;

    Ok((response, flight_id))
}

pub async fn delete_flight_intent(
    scenario: &mut Scenario,
    test_step: &str,
    planner: &dyn FlightPlanner,
    flight_id: &str,
) -> Option<DeleteFlightResponse> {
    scenario.begin_test_step(test_step);
    let participant = planner.participant_id();

    let (response, query) = planner.cleanup_flight(flight_id).await;
    scenario.record_query(&query);

    let _ = scenario.check(SUCCESSFUL_DELETION_CHECK, [participant], |check| match &response {
        None => check.record_failed(
            format!("Error from {participant} when attempting to delete a flight intent (flight ID: {flight_id})"),
            Severity::High,
            transport_details(&query),
            vec![query.timestamp()],
        ),
        Some(response) if response.result != DeleteFlightResult::Closed => {
            let mut details = format!(
                "{participant} indicated {:?} rather than the expected Closed",
                response.result
            );
            if let Some(notes) = response.notes.as_deref().filter(|n| !n.is_empty()) {
                let _ = write!(details, ": \"{notes}\"");
            }
            check.record_failed(
                format!("Flight deletion attempt unexpectedly {:?}", response.result),
                Severity::High,
                details,
                vec![query.timestamp()],
            );
        }
        Some(_) => {}
    });

    scenario.end_test_step();
    response
}

/// Deletes every flight in `flight_ids`, keeping only those that could not
/// be closed.
pub async fn cleanup_flights(
    scenario: &mut Scenario,
    planner: &dyn FlightPlanner,
    flight_ids: &mut Vec<String>,
) {
    let participant = planner.participant_id();
    let mut remaining = Vec::new();

    for flight_id in flight_ids.drain(..) {
        let (response, query) = planner.cleanup_flight(&flight_id).await;
        scenario.record_query(&query);

        let closed = scenario.check(CLEANUP_CHECK, [participant], |check| match &response {
            Some(response) if response.result == DeleteFlightResult::Closed => {}
            Some(response) => check.record_failed(
                "Failed to delete flight",
                Severity::Medium,
                format!(
                    "USS indicated: {}",
                    response.notes.as_deref().unwrap_or("(no notes)")
                ),
                vec![query.timestamp()],
            ),
            None => check.record_failed(
                "Failed to delete flight",
                Severity::Medium,
                transport_details(&query),
                vec![query.timestamp()],
            ),
        });

        if closed {
            debug!(%participant, %flight_id, "Flight cleaned up");
        } else {
            remaining.push(flight_id);
        }
    }

    *flight_ids = remaining;
}

/// Checks that the operational intent `op_intent_id` is shared with the DSS
/// while the details served for it are invalid.
///
/// Returns whether the operational intent was found and examined; `false`
/// without a failed check when it was not found and `skip_if_not_found` is
/// set.
#[expect(clippy::too_many_arguments, reason = "one argument per step input")]
pub async fn validate_sharing_operational_intent_with_invalid_interuss_data(
    scenario: &mut Scenario,
    planner: &dyn FlightPlanner,
    dss: &dyn Dss,
    schemas: &dyn SchemaValidator,
    test_step: &str,
    flight_intent: &FlightIntent,
    op_intent_id: &str,
    skip_if_not_found: bool,
) -> Result<bool, ScenarioCannotContinue> {
    let Some(extent) = flight_intent.extent() else {
        return Err(ScenarioCannotContinue(format!(
            "error in test data: flight intent for {test_step} has no volumes"
        )));
    };
    let participant = planner.participant_id();

    scenario.begin_test_step(test_step);
    let (refs, query) = dss.find_op_intent(&extent).await;
    scenario.record_query(&query);
    let _ = scenario.check(DSS_RESPONSE_CHECK, [dss.participant_id()], |check| {
        if !query.succeeded() {
            check.record_failed(
                "Failed to query DSS for operational intents",
                Severity::High,
                format!("Received status code {} from the DSS", query.status_code()),
                vec![query.timestamp()],
            );
        }
    });

    let Some(reference) = refs.iter().find(|r| r.id == op_intent_id) else {
        if skip_if_not_found {
            scenario.record_note(
                participant,
                format!(
                    "Operational intent reference with ID {op_intent_id} not found in DSS, instructed to skip test step."
                ),
            );
        } else {
            let _ = scenario.check(SHARED_WITH_DSS_CHECK, [participant], |check| {
                check.record_failed(
                    "Operational intent reference not found in DSS",
                    Severity::High,
                    format!(
                        "USS {participant} was supposed to have shared an operational intent with ID {op_intent_id}, but no operational intent references with that ID were found in the DSS in the area of the flight intent"
                    ),
                    vec![query.timestamp()],
                );
            });
        }
        scenario.end_test_step();
        return Ok(false);
    };
    let _ = scenario.check(SHARED_WITH_DSS_CHECK, [participant], |_| {});

    let (op_intent, query) = dss.get_full_op_intent(reference, Some(participant)).await;
    scenario.record_query(&query);
    check_retrievable(scenario, participant, op_intent_id, &query);

    if let Some(payload) = query.json() {
        let violations = schemas.validate(SchemaId::GetOperationalIntentDetailsResponse, payload);
        let _ = scenario.check(INVALID_DATA_FORMAT_CHECK, [participant], |check| {
            if violations.is_empty() {
                check.record_failed(
                    "Invalid Operational intent details response did not fail schema validation",
                    Severity::Medium,
                    "The response received from querying operational intent details has invalid data and should fail OpenAPI schema validation",
                    vec![query.timestamp()],
                );
            }
        });
    }

    if let Some(op_intent) = &op_intent {
        check_off_nominal(scenario, participant, op_intent, &query);
        check_vertices(scenario, participant, op_intent, &query);
    } else {
        debug!(id = op_intent_id, "Details not parsable, skipping semantic checks");
    }

    scenario.end_test_step();
    Ok(true)
}

fn transport_details(query: &Query) -> String {
    format!(
        "Received status code {} from {}: {}",
        query.status_code(),
        query.request.url,
        query.error_message().unwrap_or_else(|| "(no error message)".to_owned())
    )
}
