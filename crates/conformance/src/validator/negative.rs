use core::fmt;

use serde_json::Value;
use tracing::debug;

use super::details::{check_retrievable, off_nominal_violation, vertices_violation};
use super::INVALID_DATA_CHECK;
use crate::dss::Dss;
use crate::model::{GetOperationalIntentDetailsResponse, OperationalIntentReference};
use crate::report::{Scenario, Severity};
use crate::schema::{SchemaId, SchemaValidator};

/// Confirms that a deliberately corrupted operational intent is served with
/// invalid details.
///
/// Finding nothing wrong is the failure: it means the fixture did not
/// exercise the negative path and the surrounding expectations are moot.
pub struct NegativeValidator<'a> {
    dss: &'a dyn Dss,
    schemas: &'a dyn SchemaValidator,
    participant_id: &'a str,
}

impl fmt::Debug for NegativeValidator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegativeValidator")
            .field("participant_id", &self.participant_id)
            .finish_non_exhaustive()
    }
}

impl<'a> NegativeValidator<'a> {
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

    /// Returns whether invalid data was found.
    pub async fn validate(
        &self,
        scenario: &mut Scenario,
        reference: &OperationalIntentReference,
    ) -> bool {
        let participant = self.participant_id;
        let (payload, query) = self
            .dss
            .get_full_op_intent_without_validation(reference, Some(participant))
            .await;
        scenario.record_query(&query);
        check_retrievable(scenario, participant, &reference.id, &query);

        let violations = self.violations(payload.as_ref());
        for violation in &violations {
            debug!(id = %reference.id, %violation, "Invalid data found");
        }

        let _ = scenario.check(INVALID_DATA_CHECK, [participant], |check| {
            if violations.is_empty() {
                check.record_failed(
                    "This negative test case requires invalid data shared with other USS in Operational intent details",
                    Severity::High,
                    "Data shared by Mock USS with other USSes had no invalid data. This test case required invalid data for testing.",
                    vec![query.timestamp()],
                );
            }
        });

        !violations.is_empty()
    }

    /// Everything wrong with a details payload. A payload that cannot be
    /// interpreted at all counts as invalid.
    #[must_use]
    pub fn violations(&self, payload: Option<&Value>) -> Vec<String> {
        let Some(payload) = payload else {
            return vec!["Response did not contain a JSON body".to_owned()];
        };

        let mut violations: Vec<String> = self
            .schemas
            .validate(SchemaId::GetOperationalIntentDetailsResponse, payload)
            .iter()
            .map(ToString::to_string)
            .collect();

        match serde_json::from_value::<GetOperationalIntentDetailsResponse>(payload.clone()) {
            Ok(response) => {
                let op_intent = response.operational_intent;
                violations.extend(off_nominal_violation(&op_intent));
                violations.extend(vertices_violation(&op_intent));
            }
            Err(err) => {
                violations.push(format!("Could not parse operational intent details: {err}"));
            }
        }

        violations
    }
}
