//! Strategic coordination conformance engine.
//!
//! Validates that a USS under test correctly shares operational intents
//! through a DSS and exchanges data with other USSs, recording every
//! observation as a named check in a [`report::Scenario`].
//!
//! ## Core Concepts
//!
//! - **OpIntentValidator**: snapshots the DSS before and after a planning
//!   action and resolves the operational intent the action produced
//! - **EntityValidator**: checks the details a USS shares for an operational
//!   intent against the flight intent it planned
//! - **NegativeValidator**: confirms a deliberately corrupted fixture really
//!   serves invalid data
//! - **Interaction audit**: matches expected calls against a mock USS
//!   interaction log
//! - **Dss / FlightPlanner / InteractionLog**: collaborator traits, with
//!   HTTP implementations

pub mod dss;
pub mod fetch;
pub mod geometry;
pub mod interactions;
pub mod mock_uss;
pub mod model;
pub mod planner;
pub mod report;
pub mod runner;
pub mod schema;
pub mod steps;
#[cfg(test)]
mod testing;
pub mod validator;

#[cfg(test)]
use wiremock as _;

pub use report::{Scenario, ScenarioCannotContinue, ScenarioReport, Severity};
pub use runner::{run_scenario, TestScenario};
pub use validator::{OpIntentValidator, OpenedOpIntentValidator};
