use core::fmt;

use tracing::debug;

use super::{
    CORRECT_DETAILS_CHECK, DATA_FORMAT_CHECK, OFF_NOMINAL_CHECK, RETRIEVABLE_CHECK, VERTICES_CHECK,
};
use crate::dss::Dss;
use crate::fetch::Query;
use crate::geometry::{off_nominal_volumes_allowed, total_vertices, BoundingVolume, MAX_VERTICES};
use crate::model::{
    FlightIntent, OperationalIntent, OperationalIntentDetails, OperationalIntentReference,
};
use crate::report::{Scenario, Severity};
use crate::schema::{SchemaId, SchemaValidator};

/// Retrieves the details shared for an operational intent and checks them
/// against the flight intent they were planned from.
///
/// Every check is recorded independently of the others. Checks that need a
/// payload are skipped when none could be retrieved.
pub struct EntityValidator<'a> {
    dss: &'a dyn Dss,
    schemas: &'a dyn SchemaValidator,
    participant_id: &'a str,
}

impl fmt::Debug for EntityValidator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityValidator")
            .field("participant_id", &self.participant_id)
            .finish_non_exhaustive()
    }
}

impl<'a> EntityValidator<'a> {
    #[must_use]
    pub const fn new(
        dss: &'a dyn Dss,
        schemas: &'a dyn SchemaValidator,
        participant_id: &'a str,
    ) -> Self {
        Self {
            dss,
            schemas,
            participant_id,
        }
    }

    /// Returns the reference as served by the managing USS when available,
    /// `reference` otherwise.
    pub async fn validate(
        &self,
        scenario: &mut Scenario,
        reference: &OperationalIntentReference,
        flight_intent: &FlightIntent,
    ) -> OperationalIntentReference {
        let participant = self.participant_id;
        let (op_intent, query) = self.dss.get_full_op_intent(reference, Some(participant)).await;
        scenario.record_query(&query);
        check_retrievable(scenario, participant, &reference.id, &query);

        if let Some(payload) = query.json().filter(|_| query.succeeded()) {
            let violations = self
                .schemas
                .validate(SchemaId::GetOperationalIntentDetailsResponse, payload);
            let _ = scenario.check(DATA_FORMAT_CHECK, [participant], |check| {
                if !violations.is_empty() {
                    let listed: Vec<_> = violations.iter().map(ToString::to_string).collect();
                    check.record_failed(
                        "Operational intent details response failed schema validation",
                        Severity::Medium,
                        format!(
                            "The response received from querying operational intent details failed validation against the required OpenAPI schema:\n{}",
                            listed.join("\n")
                        ),
                        vec![query.timestamp()],
                    );
                }
            });
        }

        let Some(op_intent) = op_intent else {
            debug!(id = %reference.id, "No parsed details, skipping semantic checks");
            return reference.clone();
        };

        let discrepancies = discrepancies(&op_intent.details, flight_intent);
        let _ = scenario.check(CORRECT_DETAILS_CHECK, [participant], |check| {
            if !discrepancies.is_empty() {
                check.record_failed(
                    "Operational intent details do not match user flight intent",
                    Severity::High,
                    discrepancies.join("\n"),
                    vec![query.timestamp()],
                );
            }
        });

        check_off_nominal(scenario, participant, &op_intent, &query);
        check_vertices(scenario, participant, &op_intent, &query);

        op_intent.reference
    }
}

/// Ways in which shared details fail to represent `flight_intent`. The
/// shared volumes may be larger than the intent's, never smaller.
fn discrepancies(details: &OperationalIntentDetails, flight_intent: &FlightIntent) -> Vec<String> {
    let mut problems = Vec::new();

    let expected_priority = flight_intent.priority();
    if details.priority != expected_priority {
        problems.push(format!(
            "Priority {} does not match the flight intent priority {expected_priority}",
            details.priority
        ));
    }

    match (
        flight_intent.bounding_volume(),
        BoundingVolume::of(details.all_volumes()),
    ) {
        (Some(expected), Some(shared)) => problems.extend(
            shared
                .uncovered(&expected)
                .into_iter()
                .map(|problem| {
                    format!("Shared volumes do not encompass the flight intent: {problem}")
                }),
        ),
        (Some(_), None) => problems.push("No volumes were shared for the flight intent".to_owned()),
        (None, _) => {}
    }

    problems
}

pub(crate) fn check_retrievable(
    scenario: &mut Scenario,
    participant: &str,
    id: &str,
    query: &Query,
) {
    let _ = scenario.check(RETRIEVABLE_CHECK, [participant], |check| {
        if !query.succeeded() {
            check.record_failed(
                "Operational intent details could not be retrieved from USS",
                Severity::High,
                format!(
                    "Received status code {} from {participant} when querying for details of operational intent {id}",
                    query.status_code()
                ),
                vec![query.timestamp()],
            );
        }
    });
}

pub(crate) fn off_nominal_violation(op_intent: &OperationalIntent) -> Option<String> {
    let state = op_intent.reference.state;
    let count = op_intent.details.off_nominal_volumes().len();

    (!off_nominal_volumes_allowed(state) && count > 0).then(|| {
        format!(
            "Operational intent {} was {state} and had {count} off-nominal volumes",
            op_intent.reference.id
        )
    })
}

pub(crate) fn vertices_violation(op_intent: &OperationalIntent) -> Option<String> {
    let n_vertices = total_vertices(op_intent.details.all_volumes());

    (n_vertices > MAX_VERTICES).then(|| {
        format!(
            "Operational intent {} had {n_vertices} vertices total",
            op_intent.reference.id
        )
    })
}

pub(crate) fn check_off_nominal(
    scenario: &mut Scenario,
    participant: &str,
    op_intent: &OperationalIntent,
    query: &Query,
) {
    let _ = scenario.check(OFF_NOMINAL_CHECK, [participant], |check| {
        if let Some(details) = off_nominal_violation(op_intent) {
            check.record_failed(
                "Accepted or Activated operational intents are not allowed off-nominal volumes",
                Severity::Medium,
                details,
                vec![query.timestamp()],
            );
        }
    });
}

pub(crate) fn check_vertices(
    scenario: &mut Scenario,
    participant: &str,
    op_intent: &OperationalIntent,
    query: &Query,
) {
    let _ = scenario.check(VERTICES_CHECK, [participant], |check| {
        if let Some(details) = vertices_violation(op_intent) {
            check.record_failed(
                "Too many vertices",
                Severity::Medium,
                details,
                vec![query.timestamp()],
            );
        }
    });
}
