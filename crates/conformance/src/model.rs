//! Typed payloads exchanged with the DSS, USSes and flight planners.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geometry::{BoundingVolume, Time, Volume4D};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationalIntentState {
    Accepted,
    Activated,
    Nonconforming,
    Contingent,
    Closed,
}

impl fmt::Display for OperationalIntentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Directory entry for an operational intent, as returned by the DSS.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationalIntentReference {
    pub id: String,
    pub manager: String,
    pub version: i32,
    pub state: OperationalIntentState,
    pub uss_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ovn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uss_availability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_start: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_end: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

/// Details an owning USS shares about one of its operational intents.
///
/// Absent volume lists are equivalent to empty ones.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationalIntentDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    volumes: Option<Vec<Volume4D>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    off_nominal_volumes: Option<Vec<Volume4D>>,
    #[serde(default)]
    pub priority: i32,
}

impl OperationalIntentDetails {
    #[must_use]
    pub const fn new(
        volumes: Vec<Volume4D>,
        off_nominal_volumes: Vec<Volume4D>,
        priority: i32,
    ) -> Self {
        Self {
            volumes: Some(volumes),
            off_nominal_volumes: Some(off_nominal_volumes),
            priority,
        }
    }

    #[must_use]
    pub fn volumes(&self) -> &[Volume4D] {
        self.volumes.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn off_nominal_volumes(&self) -> &[Volume4D] {
        self.off_nominal_volumes.as_deref().unwrap_or_default()
    }

    /// Nominal volumes followed by off-nominal volumes.
    pub fn all_volumes(&self) -> impl Iterator<Item = &Volume4D> {
        self.volumes().iter().chain(self.off_nominal_volumes())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationalIntent {
    pub reference: OperationalIntentReference,
    pub details: OperationalIntentDetails,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetOperationalIntentDetailsResponse {
    pub operational_intent: OperationalIntent,
}

/// Directive asking a mock USS to corrupt what it shares about a flight.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MockUssFlightBehavior {
    /// HTTP methods (`GET`, `POST`) whose payloads get modified.
    #[serde(default)]
    pub modify_sharing_methods: Vec<String>,
    /// Field overrides merged into the shared reference and details.
    #[serde(default)]
    pub modify_fields: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InjectedOperationalIntent {
    pub state: OperationalIntentState,
    pub priority: i32,
    #[serde(default)]
    pub volumes: Vec<Volume4D>,
    #[serde(default)]
    pub off_nominal_volumes: Vec<Volume4D>,
}

/// Legacy flight injection request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InjectFlightRequest {
    pub operational_intent: InjectedOperationalIntent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_authorisation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_uss_flight_behavior: Option<MockUssFlightBehavior>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AirspaceUsageState {
    Planned,
    InUse,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UasState {
    Nominal,
    OffNominal,
    Contingent,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasicFlightPlanInformation {
    pub usage_state: AirspaceUsageState,
    pub uas_state: UasState,
    #[serde(default)]
    pub area: Vec<Volume4D>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AstmF3548FlightDetails {
    #[serde(default)]
    pub priority: i32,
}

/// Flight planning information in the flight_planning API shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlightInfo {
    pub basic_information: BasicFlightPlanInformation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub astm_f3548_21: Option<AstmF3548FlightDetails>,
}

/// A flight a test intends to plan, in either supported representation.
///
/// Call sites only use the accessors below and never match on the variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlightIntent {
    Injection(InjectFlightRequest),
    FlightInfo(FlightInfo),
}

impl FlightIntent {
    #[must_use]
    pub const fn injection(request: InjectFlightRequest) -> Self {
        Self::Injection(request)
    }

    #[must_use]
    pub const fn flight_info(info: FlightInfo) -> Self {
        Self::FlightInfo(info)
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        match self {
            Self::Injection(request) => request.operational_intent.priority,
            Self::FlightInfo(info) => info.astm_f3548_21.map_or(0, |d| d.priority),
        }
    }

    /// Every volume the flight declares, off-nominal ones included.
    #[must_use]
    pub fn volumes(&self) -> Vec<&Volume4D> {
        match self {
            Self::Injection(request) => request
                .operational_intent
                .volumes
                .iter()
                .chain(&request.operational_intent.off_nominal_volumes)
                .collect(),
            Self::FlightInfo(info) => info.basic_information.area.iter().collect(),
        }
    }

    #[must_use]
    pub fn bounding_volume(&self) -> Option<BoundingVolume> {
        BoundingVolume::of(self.volumes())
    }

    /// Query extent covering the whole flight.
    #[must_use]
    pub fn extent(&self) -> Option<Volume4D> {
        self.bounding_volume().map(|b| b.to_volume4d())
    }

    /// Operational intent state the flight is expected to be in once planned.
    #[must_use]
    pub const fn declared_state(&self) -> OperationalIntentState {
        match self {
            Self::Injection(request) => request.operational_intent.state,
            Self::FlightInfo(info) => match (
                info.basic_information.usage_state,
                info.basic_information.uas_state,
            ) {
                (AirspaceUsageState::Planned, _) => OperationalIntentState::Accepted,
                (AirspaceUsageState::InUse, UasState::Nominal) => OperationalIntentState::Activated,
                (AirspaceUsageState::InUse, UasState::OffNominal) => {
                    OperationalIntentState::Nonconforming
                }
                (AirspaceUsageState::InUse, UasState::Contingent) => {
                    OperationalIntentState::Contingent
                }
                (AirspaceUsageState::Closed, _) => OperationalIntentState::Closed,
            },
        }
    }

    /// Whether the flight is airborne and nominal, i.e. its operational
    /// intent must never silently disappear from the DSS.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        match self {
            Self::Injection(request) => {
                matches!(request.operational_intent.state, OperationalIntentState::Activated)
            }
            Self::FlightInfo(info) => {
                matches!(info.basic_information.usage_state, AirspaceUsageState::InUse)
                    && matches!(info.basic_information.uas_state, UasState::Nominal)
            }
        }
    }

    #[must_use]
    pub fn behavior(&self) -> Option<&MockUssFlightBehavior> {
        match self {
            Self::Injection(request) => request.mock_uss_flight_behavior.as_ref(),
            Self::FlightInfo(_) => None,
        }
    }

    /// Same flight carrying a negative-fixture directive for a mock USS.
    #[must_use]
    pub fn with_behavior(&self, behavior: MockUssFlightBehavior) -> Self {
        let mut request = self.to_injection_request();
        request.mock_uss_flight_behavior = Some(behavior);
        Self::Injection(request)
    }

    /// Body accepted by the injection API.
    #[must_use]
    pub fn to_injection_request(&self) -> InjectFlightRequest {
        match self {
            Self::Injection(request) => request.clone(),
            Self::FlightInfo(info) => InjectFlightRequest {
                operational_intent: InjectedOperationalIntent {
                    state: self.declared_state(),
                    priority: self.priority(),
                    volumes: info.basic_information.area.clone(),
                    off_nominal_volumes: Vec::new(),
                },
                flight_authorisation: None,
                mock_uss_flight_behavior: None,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InjectFlightResult {
    Planned,
    ReadyToFly,
    Rejected,
    ConflictWithFlight,
    Failed,
    NotSupported,
}

impl fmt::Display for InjectFlightResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectFlightResponse {
    pub result: InjectFlightResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operational_intent_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteFlightResult {
    Closed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFlightResponse {
    pub result: DeleteFlightResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Optional planning feature a USS may advertise through its injection API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    BasicStrategicConflictDetection,
    FlightAuthorisationValidation,
    HighPriorityFlights,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitiesResponse {
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

/// Asks a USS to remove every flight it manages within `extent`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClearAreaRequest {
    pub request_id: String,
    pub extent: Volume4D,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearAreaOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Time>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearAreaResponse {
    pub outcome: ClearAreaOutcome,
}
