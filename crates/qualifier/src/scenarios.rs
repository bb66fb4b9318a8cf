use core::fmt;

use utm_conformance::dss::Dss;
use utm_conformance::mock_uss::InteractionLog;
use utm_conformance::planner::FlightPlanner;
use utm_conformance::schema::SchemaValidator;

mod get_op_data_validation;

pub use get_op_data_validation::GetOpResponseDataValidationBySut;

/// Collaborators a scenario runs against.
#[derive(Clone, Copy)]
pub struct Resources<'a> {
    pub sut: &'a dyn FlightPlanner,
    pub control_uss: &'a dyn FlightPlanner,
    pub dss: &'a dyn Dss,
    pub mock_uss: &'a dyn InteractionLog,
    pub schemas: &'a dyn SchemaValidator,
}

impl fmt::Debug for Resources<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resources")
            .field("sut", &self.sut.participant_id())
            .field("control_uss", &self.control_uss.participant_id())
            .field("dss", &self.dss.participant_id())
            .field("mock_uss", &self.mock_uss.participant_id())
            .finish_non_exhaustive()
    }
}
