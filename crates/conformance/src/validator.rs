//! Snapshot differ around a planning action.
//!
//! An [`OpIntentValidator`] queries the DSS over a flight's extent before the
//! action ([`OpIntentValidator::open`]) and again after it, computes which
//! operational intents appeared, and resolves the one the action is
//! responsible for. The resolved reference is then handed to the
//! [`EntityValidator`] or the [`NegativeValidator`].
//!
//! The validator assumes that no third party mutates the DSS within the
//! extent while it is open, and that one planning action creates at most one
//! operational intent. More than one new operational intent is fatal for the
//! scenario.

use core::fmt;
use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::dss::Dss;
use crate::fetch::Query;
use crate::geometry::Volume4D;
use crate::model::{FlightIntent, OperationalIntentReference};
use crate::report::{Scenario, ScenarioCannotContinue, Severity};
use crate::schema::SchemaValidator;

mod details;
mod negative;

pub use details::EntityValidator;
pub(crate) use details::{check_off_nominal, check_retrievable, check_vertices};
pub use negative::NegativeValidator;

pub const DSS_RESPONSES_CHECK: &str = "DSS responses";
pub const NOT_SHARED_CHECK: &str = "Operational intent not shared";
pub const SHARED_CORRECTLY_CHECK: &str = "Operational intent shared correctly";
pub const ACTIVE_NOT_DELETED_CHECK: &str = "Operational intent for active flight not deleted";
pub const RETRIEVABLE_CHECK: &str = "Operational intent details retrievable";
pub const DATA_FORMAT_CHECK: &str = "Operational intent details data format";
pub const CORRECT_DETAILS_CHECK: &str = "Correct operational intent details";
pub const OFF_NOMINAL_CHECK: &str = "Off-nominal volumes";
pub const VERTICES_CHECK: &str = "Vertices";
pub const INVALID_DATA_CHECK: &str =
    "Invalid data in Operational intent details shared by Mock USS for negative test";

/// Operational intent references found in an extent at one instant.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub refs: Vec<OperationalIntentReference>,
    pub query: Query,
}

impl Snapshot {
    pub async fn capture(dss: &dyn Dss, extent: &Volume4D) -> Self {
        let (refs, query) = dss.find_op_intent(extent).await;
        Self { refs, query }
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&OperationalIntentReference> {
        self.refs.iter().find(|r| r.id == id)
    }

    #[must_use]
    pub fn ids(&self) -> BTreeSet<&str> {
        self.refs.iter().map(|r| r.id.as_str()).collect()
    }
}

/// Identifiers present after an action but not before it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delta {
    added: BTreeSet<String>,
}

impl Delta {
    #[must_use]
    pub fn between(before: &Snapshot, after: &Snapshot) -> Self {
        let before = before.ids();
        Self {
            added: after
                .ids()
                .into_iter()
                .filter(|id| !before.contains(id))
                .map(ToOwned::to_owned)
                .collect(),
        }
    }

    #[must_use]
    pub const fn added(&self) -> &BTreeSet<String> {
        &self.added
    }

    /// The new identifier, if any.
    ///
    /// A single submitted flight intent is assumed to produce at most one
    /// operational intent; more than one cannot be attributed and cancels
    /// the scenario.
    pub fn single_added(&self) -> Result<Option<&str>, ScenarioCannotContinue> {
        if self.added.len() > 1 {
            return Err(ScenarioCannotContinue(format!(
                "unexpectedly got more than 1 new operational intent after planning request was created (IDs: {:?}): the test scenario might be malformed or some external requests might have interfered",
                self.added
            )));
        }

        Ok(self.added.iter().next().map(String::as_str))
    }
}

/// Unopened snapshot differ. See the module documentation.
pub struct OpIntentValidator<'a> {
    planner_id: String,
    dss: &'a dyn Dss,
    schemas: &'a dyn SchemaValidator,
    test_step: String,
    extent: Volume4D,
    orig_oi_ref: Option<OperationalIntentReference>,
}

impl fmt::Debug for OpIntentValidator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpIntentValidator")
            .field("planner_id", &self.planner_id)
            .field("dss", &self.dss.participant_id())
            .field("test_step", &self.test_step)
            .field("orig_oi_ref", &self.orig_oi_ref.as_ref().map(|r| &r.id))
            .finish_non_exhaustive()
    }
}

impl<'a> OpIntentValidator<'a> {
    #[must_use]
    pub fn new(
        planner_id: impl Into<String>,
        dss: &'a dyn Dss,
        schemas: &'a dyn SchemaValidator,
        test_step: impl Into<String>,
        extent: Volume4D,
    ) -> Self {
        Self {
            planner_id: planner_id.into(),
            dss,
            schemas,
            test_step: test_step.into(),
            extent,
            orig_oi_ref: None,
        }
    }

    /// Validates a change to a pre-existing operational intent instead of the
    /// creation of a new one.
    #[must_use]
    pub fn modifying(mut self, orig_oi_ref: OperationalIntentReference) -> Self {
        self.orig_oi_ref = Some(orig_oi_ref);
        self
    }

    /// Captures the state before the action. Call before triggering it.
    pub async fn open(self) -> OpenedOpIntentValidator<'a> {
        let before = Snapshot::capture(self.dss, &self.extent).await;
        debug!(
            step = %self.test_step,
            count = before.refs.len(),
            "Captured operational intents before action"
        );

        OpenedOpIntentValidator {
            inner: self,
            before,
        }
    }
}

/// Snapshot differ between its two snapshots. Exactly one of the `expect_*`
/// methods closes it.
#[must_use = "an opened validator is closed by one of its `expect_*` methods"]
pub struct OpenedOpIntentValidator<'a> {
    inner: OpIntentValidator<'a>,
    before: Snapshot,
}

impl fmt::Debug for OpenedOpIntentValidator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedOpIntentValidator")
            .field("inner", &self.inner)
            .field("before", &self.before.ids())
            .finish()
    }
}

struct Closed {
    after: Snapshot,
    new_ref: Option<OperationalIntentReference>,
}

impl OpenedOpIntentValidator<'_> {
    #[must_use]
    pub const fn before(&self) -> &Snapshot {
        &self.before
    }

    /// Validates that the action shared nothing with the DSS.
    pub async fn expect_not_shared(
        self,
        scenario: &mut Scenario,
    ) -> Result<(), ScenarioCannotContinue> {
        let closed = self.close(scenario).await?;
        let planner = &self.inner.planner_id;
        let after_ts = closed.after.query.timestamp();

        let _ = scenario.check(NOT_SHARED_CHECK, [planner.as_str()], |check| {
            if let Some(new_ref) = &closed.new_ref {
                check.record_failed(
                    "Operational intent reference was incorrectly shared with DSS",
                    Severity::High,
                    format!(
                        "USS {planner} was not supposed to share an operational intent with the DSS, but the new operational intent with ID {} was found",
                        new_ref.id
                    ),
                    vec![after_ts],
                );
            }
        });

        scenario.end_test_step();
        Ok(())
    }

    /// Validates that the action shared an operational intent matching
    /// `flight_intent`, and that its details are correct.
    ///
    /// Returns `None` when no operational intent could be resolved; with
    /// `skip_if_not_found` this is noted rather than failed.
    pub async fn expect_shared(
        self,
        scenario: &mut Scenario,
        flight_intent: &FlightIntent,
        skip_if_not_found: bool,
    ) -> Result<Option<OperationalIntentReference>, ScenarioCannotContinue> {
        let closed = self.close(scenario).await?;
        let Some(reference) = self.resolve(scenario, &closed, flight_intent, skip_if_not_found)
        else {
            scenario.end_test_step();
            return Ok(None);
        };

        let entity_validator =
            EntityValidator::new(self.inner.dss, self.inner.schemas, &self.inner.planner_id);
        let validated = entity_validator
            .validate(scenario, &reference, flight_intent)
            .await;

        scenario.end_test_step();
        Ok(Some(validated))
    }

    /// Validates that the action shared an operational intent with the DSS,
    /// but that the details served for it are invalid, as a negative fixture
    /// requires.
    pub async fn expect_shared_with_invalid_data(
        self,
        scenario: &mut Scenario,
        flight_intent: &FlightIntent,
        skip_if_not_found: bool,
    ) -> Result<Option<OperationalIntentReference>, ScenarioCannotContinue> {
        let closed = self.close(scenario).await?;
        let Some(reference) = self.resolve(scenario, &closed, flight_intent, skip_if_not_found)
        else {
            scenario.end_test_step();
            return Ok(None);
        };

        let _ = NegativeValidator::new(self.inner.dss, self.inner.schemas, &self.inner.planner_id)
            .validate(scenario, &reference)
            .await;

        scenario.end_test_step();
        Ok(Some(reference))
    }

    async fn close(&self, scenario: &mut Scenario) -> Result<Closed, ScenarioCannotContinue> {
        let after = Snapshot::capture(self.inner.dss, &self.inner.extent).await;

        scenario.begin_test_step(&self.inner.test_step);
        scenario.record_query(&self.before.query);
        scenario.record_query(&after.query);

        let before_query = &self.before.query;
        let after_query = &after.query;
        let _ = scenario.check(DSS_RESPONSES_CHECK, [self.inner.dss.participant_id()], |check| {
            if !before_query.succeeded() {
                check.record_failed(
                    "Failed to query DSS for operational intents before planning request",
                    Severity::High,
                    format!(
                        "Received status code {} from the DSS",
                        before_query.status_code()
                    ),
                    vec![before_query.timestamp()],
                );
            }
            if !after_query.succeeded() {
                check.record_failed(
                    "Failed to query DSS for operational intents after planning request",
                    Severity::High,
                    format!(
                        "Received status code {} from the DSS",
                        after_query.status_code()
                    ),
                    vec![after_query.timestamp()],
                );
            }
        });

        let delta = Delta::between(&self.before, &after);
        let new_ref = match delta.single_added() {
            Ok(id) => id.and_then(|id| after.find(id)).cloned(),
            // Without a baseline every reference looks new.
            Err(_) if !before_query.succeeded() => {
                debug!(
                    step = %self.inner.test_step,
                    added = ?delta.added(),
                    "No baseline, new operational intent not attributable"
                );
                None
            }
            Err(err) => {
                warn!(step = %self.inner.test_step, added = ?delta.added(), "Ambiguous delta");
                scenario.end_test_step();
                return Err(err);
            }
        };
        debug!(
            step = %self.inner.test_step,
            new = ?new_ref.as_ref().map(|r| &r.id),
            "Captured operational intents after action"
        );

        Ok(Closed { after, new_ref })
    }

    fn resolve(
        &self,
        scenario: &mut Scenario,
        closed: &Closed,
        flight_intent: &FlightIntent,
        skip_if_not_found: bool,
    ) -> Option<OperationalIntentReference> {
        let planner = self.inner.planner_id.as_str();
        let after_ts = closed.after.query.timestamp();

        let Some(orig) = &self.inner.orig_oi_ref else {
            return match &closed.new_ref {
                Some(new_ref) => {
                    let _ = scenario.check(SHARED_CORRECTLY_CHECK, [planner], |_| {});
                    Some(new_ref.clone())
                }
                None if skip_if_not_found => {
                    scenario.record_note(
                        planner,
                        "New operational intent reference not found in DSS, instructed to skip test step.",
                    );
                    None
                }
                None => {
                    let _ = scenario.check(SHARED_CORRECTLY_CHECK, [planner], |check| {
                        check.record_failed(
                            "Operational intent reference not found in DSS",
                            Severity::High,
                            format!(
                                "USS {planner} was supposed to have shared a new operational intent with the DSS, but no matching operational intent references were found in the DSS in the area of the flight intent"
                            ),
                            vec![after_ts],
                        );
                    });
                    None
                }
            };
        };

        if let Some(new_ref) = &closed.new_ref {
            let duplicated = closed.after.find(&orig.id).is_some();
            let _ = scenario.check(SHARED_CORRECTLY_CHECK, [planner], |check| {
                if duplicated {
                    check.record_failed(
                        "Operational intent reference found duplicated in DSS",
                        Severity::High,
                        format!(
                            "USS {planner} was supposed to have shared with the DSS an updated operational intent by replacing it, but it ended up duplicating the operational intent in the DSS"
                        ),
                        vec![after_ts],
                    );
                }
            });
            return Some(new_ref.clone());
        }

        let not_found_details = format!(
            "USS {planner} was supposed to have shared with the DSS an updated operational intent by modifying it, but no matching operational intent references were found in the DSS in the area of the flight intent"
        );

        match closed.after.find(&orig.id) {
            Some(modified) => {
                let _ = scenario.check(SHARED_CORRECTLY_CHECK, [planner], |check| {
                    if modified.version < orig.version {
                        check.record_failed(
                            "Operational intent reference version went backwards",
                            Severity::High,
                            format!(
                                "Operational intent {} had version {} before the planning request but version {} after it",
                                orig.id, orig.version, modified.version
                            ),
                            vec![after_ts],
                        );
                    }
                });
                Some(modified.clone())
            }
            None if skip_if_not_found => {
                scenario.record_note(
                    planner,
                    format!(
                        "Operational intent reference with ID {} not found in DSS, instructed to skip test step.",
                        orig.id
                    ),
                );
                None
            }
            None if flight_intent.is_active() => {
                let _ = scenario.check(SHARED_CORRECTLY_CHECK, [planner], |_| {});
                let _ = scenario.check(ACTIVE_NOT_DELETED_CHECK, [planner], |check| {
                    check.record_failed(
                        "Operational intent reference for active flight not found in DSS",
                        Severity::High,
                        not_found_details,
                        vec![after_ts],
                    );
                });
                None
            }
            None => {
                let _ = scenario.check(SHARED_CORRECTLY_CHECK, [planner], |check| {
                    check.record_failed(
                        "Operational intent reference not found in DSS",
                        Severity::High,
                        not_found_details,
                        vec![after_ts],
                    );
                });
                None
            }
        }
    }
}
