//! In-memory collaborators and fixtures for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use url::Url;

use crate::dss::Dss;
use crate::fetch::Query;
use crate::geometry::{Altitude, Circle, LatLngPoint, Polygon, Radius, Time, Volume3D, Volume4D};
use crate::mock_uss::{Interaction, InteractionLog, QueryError};
use crate::model::{
    CapabilitiesResponse, Capability, ClearAreaOutcome, ClearAreaResponse, DeleteFlightResponse,
    DeleteFlightResult, FlightIntent, GetOperationalIntentDetailsResponse, InjectFlightRequest,
    InjectFlightResponse, InjectFlightResult, InjectedOperationalIntent, OperationalIntent,
    OperationalIntentDetails, OperationalIntentReference, OperationalIntentState,
};
use crate::planner::FlightPlanner;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap()
}

/// Axis-aligned square polygon volume between `t0()` and one hour later.
pub fn square(lat: f64, lng: f64, size: f64, altitude: (f64, f64)) -> Volume4D {
    Volume4D {
        volume: Volume3D {
            outline_circle: None,
            outline_polygon: Some(Polygon {
                vertices: vec![
                    LatLngPoint::new(lat, lng),
                    LatLngPoint::new(lat, lng + size),
                    LatLngPoint::new(lat + size, lng + size),
                    LatLngPoint::new(lat + size, lng),
                ],
            }),
            altitude_lower: Some(Altitude::w84_meters(altitude.0)),
            altitude_upper: Some(Altitude::w84_meters(altitude.1)),
        },
        time_start: Some(Time::new(t0())),
        time_end: Some(Time::new(t0() + Duration::hours(1))),
    }
}

pub fn circle(lat: f64, lng: f64, radius_m: f64) -> Volume4D {
    Volume4D {
        volume: Volume3D {
            outline_circle: Some(Circle {
                center: LatLngPoint::new(lat, lng),
                radius: Radius {
                    value: radius_m,
                    units: "M".to_owned(),
                },
            }),
            outline_polygon: None,
            altitude_lower: Some(Altitude::w84_meters(0.0)),
            altitude_upper: Some(Altitude::w84_meters(100.0)),
        },
        time_start: Some(Time::new(t0())),
        time_end: Some(Time::new(t0() + Duration::hours(1))),
    }
}

pub fn flight_intent(
    state: OperationalIntentState,
    priority: i32,
    volumes: Vec<Volume4D>,
    off_nominal_volumes: Vec<Volume4D>,
) -> FlightIntent {
    FlightIntent::injection(InjectFlightRequest {
        operational_intent: InjectedOperationalIntent {
            state,
            priority,
            volumes,
            off_nominal_volumes,
        },
        flight_authorisation: None,
        mock_uss_flight_behavior: None,
    })
}

pub fn reference(
    id: &str,
    state: OperationalIntentState,
    version: i32,
) -> OperationalIntentReference {
    OperationalIntentReference {
        id: id.to_owned(),
        manager: "uss1".to_owned(),
        version,
        state,
        uss_base_url: "https://uss1.example".to_owned(),
        ovn: Some(String::new()),
        uss_availability: Some("Normal".to_owned()),
        time_start: Some(Time::new(t0())),
        time_end: Some(Time::new(t0() + Duration::hours(1))),
        subscription_id: Some("sub1".to_owned()),
    }
}

/// Details response body as a conformant USS would serve it.
pub fn details_response(
    reference: &OperationalIntentReference,
    details: &OperationalIntentDetails,
) -> Value {
    json!({
        "operational_intent": {
            "reference": reference,
            "details": details,
        }
    })
}

/// DSS whose successive query results are scripted. The last scripted
/// result repeats once the script is exhausted.
#[derive(Debug)]
pub struct FakeDss {
    participant_id: String,
    snapshots: Mutex<VecDeque<(u16, Vec<OperationalIntentReference>)>>,
    details: Mutex<HashMap<String, (u16, Value)>>,
    details_fetches: Mutex<usize>,
    availability_version: Mutex<Option<u64>>,
}

impl FakeDss {
    pub fn new() -> Self {
        Self {
            participant_id: "dss".to_owned(),
            snapshots: Mutex::new(VecDeque::new()),
            details: Mutex::new(HashMap::new()),
            details_fetches: Mutex::new(0),
            availability_version: Mutex::new(Some(0)),
        }
    }

    pub fn push_snapshot(&self, refs: Vec<OperationalIntentReference>) {
        lock(&self.snapshots).push_back((200, refs));
    }

    pub fn push_failed_snapshot(&self, code: u16) {
        lock(&self.snapshots).push_back((code, Vec::new()));
    }

    pub fn serve_details(&self, id: &str, code: u16, body: Value) {
        let _ = lock(&self.details).insert(id.to_owned(), (code, body));
    }

    pub fn details_fetches(&self) -> usize {
        *lock(&self.details_fetches)
    }

    pub fn fail_availability(&self) {
        *lock(&self.availability_version) = None;
    }

    fn details_query(
        &self,
        reference: &OperationalIntentReference,
        owner_hint: Option<&str>,
    ) -> Query {
        *lock(&self.details_fetches) += 1;
        let url = format!("{}/uss/v1/operational_intents/{}", reference.uss_base_url, reference.id);
        let (code, body) = lock(&self.details)
            .get(&reference.id)
            .cloned()
            .unwrap_or((404, json!({"message": "not found"})));

        Query::from_parts("GET", &url, code, Some(body))
            .with_participant(owner_hint.unwrap_or(reference.manager.as_str()))
    }
}

#[async_trait::async_trait]
impl Dss for FakeDss {
    fn participant_id(&self) -> &str {
        &self.participant_id
    }

    async fn find_op_intent(&self, _extent: &Volume4D) -> (Vec<OperationalIntentReference>, Query) {
        let (code, refs) = {
            let mut snapshots = lock(&self.snapshots);
            if snapshots.len() > 1 {
                snapshots.pop_front().unwrap_or_default()
            } else {
                snapshots.front().cloned().unwrap_or((200, Vec::new()))
            }
        };

        let query = Query::from_parts(
            "POST",
            "https://dss.example/dss/v1/operational_intent_references/query",
            code,
            Some(json!({ "operational_intent_references": &refs })),
        )
        .with_participant(&self.participant_id);

        if code == 200 {
            (refs, query)
        } else {
            (Vec::new(), query)
        }
    }

    async fn get_full_op_intent(
        &self,
        reference: &OperationalIntentReference,
        owner_hint: Option<&str>,
    ) -> (Option<OperationalIntent>, Query) {
        let query = self.details_query(reference, owner_hint);
        let op_intent = query
            .json()
            .filter(|_| query.succeeded())
            .cloned()
            .and_then(|json| {
                serde_json::from_value::<GetOperationalIntentDetailsResponse>(json).ok()
            })
            .map(|response| response.operational_intent);
        (op_intent, query)
    }

    async fn get_full_op_intent_without_validation(
        &self,
        reference: &OperationalIntentReference,
        owner_hint: Option<&str>,
    ) -> (Option<Value>, Query) {
        let query = self.details_query(reference, owner_hint);
        (query.json().cloned(), query)
    }

    async fn set_uss_availability(
        &self,
        uss_id: &str,
        _available: bool,
    ) -> (Option<String>, Query) {
        let url = format!("https://dss.example/dss/v1/uss_availability/{uss_id}");

        let mut version = lock(&self.availability_version);
        let query = match version.as_mut() {
            Some(v) => {
                *v += 1;
                let body = json!({"status": {"version": v.to_string()}});
                Query::from_parts("PUT", &url, 200, Some(body))
            }
            None => Query::from_parts("PUT", &url, 500, Some(json!({"message": "unavailable"}))),
        };

        ((*version).map(|v| v.to_string()), query.with_participant(&self.participant_id))
    }
}

/// Flight planner answering every request with a scripted result.
#[derive(Debug)]
pub struct FakePlanner {
    participant_id: String,
    base_url: Url,
    results: Mutex<VecDeque<Option<InjectFlightResult>>>,
    delete_results: Mutex<VecDeque<DeleteFlightResult>>,
    requested: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    capabilities: Mutex<Option<Vec<Capability>>>,
    clear_area_success: Mutex<bool>,
    cleared: Mutex<Vec<Volume4D>>,
}

impl FakePlanner {
    pub fn new(participant_id: &str) -> Self {
        Self {
            participant_id: participant_id.to_owned(),
            base_url: Url::parse(&format!("https://{participant_id}.example/")).unwrap(),
            results: Mutex::new(VecDeque::new()),
            delete_results: Mutex::new(VecDeque::new()),
            requested: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            capabilities: Mutex::new(Some(vec![Capability::BasicStrategicConflictDetection])),
            clear_area_success: Mutex::new(true),
            cleared: Mutex::new(Vec::new()),
        }
    }

    /// `None` makes the capabilities endpoint answer 500.
    pub fn set_capabilities(&self, capabilities: Option<Vec<Capability>>) {
        *lock(&self.capabilities) = capabilities;
    }

    pub fn fail_clear_area(&self) {
        *lock(&self.clear_area_success) = false;
    }

    pub fn cleared(&self) -> Vec<Volume4D> {
        lock(&self.cleared).clone()
    }

    pub fn push_result(&self, result: InjectFlightResult) {
        lock(&self.results).push_back(Some(result));
    }

    /// The next planning request gets no response at all.
    pub fn push_unreachable(&self) {
        lock(&self.results).push_back(None);
    }

    pub fn push_delete_result(&self, result: DeleteFlightResult) {
        lock(&self.delete_results).push_back(result);
    }

    pub fn requested(&self) -> Vec<String> {
        lock(&self.requested).clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }
}

#[async_trait::async_trait]
impl FlightPlanner for FakePlanner {
    fn participant_id(&self) -> &str {
        &self.participant_id
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn request_flight(
        &self,
        flight_id: &str,
        _intent: &FlightIntent,
    ) -> (Option<InjectFlightResponse>, Query) {
        lock(&self.requested).push(flight_id.to_owned());
        let url = format!("{}v1/flights/{flight_id}", self.base_url);
        let Some(result) = lock(&self.results)
            .pop_front()
            .unwrap_or(Some(InjectFlightResult::Planned))
        else {
            let query = Query::not_sent("PUT", &url, "connection refused")
                .with_participant(&self.participant_id);
            return (None, query);
        };

        let response = InjectFlightResponse {
            result,
            notes: None,
            operational_intent_id: Some(format!("oi-{flight_id}")),
        };

        let query = Query::from_parts("PUT", &url, 200, serde_json::to_value(&response).ok())
            .with_participant(&self.participant_id);
        (Some(response), query)
    }

    async fn cleanup_flight(&self, flight_id: &str) -> (Option<DeleteFlightResponse>, Query) {
        lock(&self.deleted).push(flight_id.to_owned());
        let result = lock(&self.delete_results)
            .pop_front()
            .unwrap_or(DeleteFlightResult::Closed);
        let response = DeleteFlightResponse {
            result,
            notes: (result == DeleteFlightResult::Failed).then(|| "flight is busy".to_owned()),
        };

        let url = format!("{}v1/flights/{flight_id}", self.base_url);
        let query = Query::from_parts("DELETE", &url, 200, serde_json::to_value(&response).ok())
            .with_participant(&self.participant_id);
        (Some(response), query)
    }

    async fn get_capabilities(&self) -> (Option<CapabilitiesResponse>, Query) {
        let url = format!("{}v1/capabilities", self.base_url);
        let Some(capabilities) = lock(&self.capabilities).clone() else {
            let query =
                Query::from_parts("GET", &url, 500, None).with_participant(&self.participant_id);
            return (None, query);
        };

        let response = CapabilitiesResponse { capabilities };
        let query = Query::from_parts("GET", &url, 200, serde_json::to_value(&response).ok())
            .with_participant(&self.participant_id);
        (Some(response), query)
    }

    async fn clear_area(
        &self,
        _request_id: &str,
        extent: &Volume4D,
    ) -> (Option<ClearAreaResponse>, Query) {
        lock(&self.cleared).push(extent.clone());
        let success = *lock(&self.clear_area_success);
        let response = ClearAreaResponse {
            outcome: ClearAreaOutcome {
                success,
                message: (!success).then(|| "flights still present".to_owned()),
                timestamp: Some(Time::new(t0())),
            },
        };

        let url = format!("{}v1/clear_area_requests", self.base_url);
        let query = Query::from_parts("POST", &url, 200, serde_json::to_value(&response).ok())
            .with_participant(&self.participant_id);
        (Some(response), query)
    }
}

/// Interaction log serving a fixed set of interactions regardless of the
/// requested start time, or failing.
#[derive(Debug)]
pub struct FakeInteractionLog {
    pub interactions: Vec<Interaction>,
    pub failing_status: Option<u16>,
}

#[async_trait::async_trait]
impl InteractionLog for FakeInteractionLog {
    fn participant_id(&self) -> &str {
        "mock_uss"
    }

    async fn get_interactions(
        &self,
        _from_time: DateTime<Utc>,
    ) -> Result<Vec<Interaction>, QueryError> {
        if let Some(code) = self.failing_status {
            return Err(QueryError::Status {
                query: Box::new(Query::from_parts(
                    "GET",
                    "https://mock-uss.example/mock_uss/interuss_logging/logs",
                    code,
                    None,
                )),
            });
        }

        Ok(self.interactions.clone())
    }
}
