//! Flight planning collaborator: a USS that accepts flight injections.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::fetch::{Query, Session};
use crate::geometry::Volume4D;
use crate::model::{
    CapabilitiesResponse, ClearAreaRequest, ClearAreaResponse, DeleteFlightResponse, FlightIntent,
    InjectFlightResponse,
};

const FLIGHTS_PATH: &str = "/v1/flights";
const CAPABILITIES_PATH: &str = "/v1/capabilities";
const CLEAR_AREA_PATH: &str = "/v1/clear_area_requests";

#[async_trait::async_trait]
pub trait FlightPlanner: Send + Sync {
    fn participant_id(&self) -> &str;

    /// Base URL of the injection API, which also identifies the USS in
    /// interaction logs.
    fn base_url(&self) -> &Url;

    /// Creates or updates the flight identified by `flight_id`.
    async fn request_flight(
        &self,
        flight_id: &str,
        intent: &FlightIntent,
    ) -> (Option<InjectFlightResponse>, Query);

    async fn cleanup_flight(&self, flight_id: &str) -> (Option<DeleteFlightResponse>, Query);

    async fn get_capabilities(&self) -> (Option<CapabilitiesResponse>, Query);

    /// Removes every flight the USS manages within `extent`.
    async fn clear_area(
        &self,
        request_id: &str,
        extent: &Volume4D,
    ) -> (Option<ClearAreaResponse>, Query);
}

/// [`FlightPlanner`] speaking the InterUSS SCD injection API.
#[derive(Clone, Debug)]
pub struct HttpFlightPlanner {
    session: Session,
}

impl HttpFlightPlanner {
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }

    fn flight_url(&self, flight_id: &str) -> Url {
        self.session.url(&format!("{FLIGHTS_PATH}/{flight_id}"))
    }
}

#[async_trait::async_trait]
impl FlightPlanner for HttpFlightPlanner {
    fn participant_id(&self) -> &str {
        self.session.participant_id()
    }

    fn base_url(&self) -> &Url {
        self.session.base_url()
    }

    async fn request_flight(
        &self,
        flight_id: &str,
        intent: &FlightIntent,
    ) -> (Option<InjectFlightResponse>, Query) {
        let body = match serde_json::to_value(intent.to_injection_request()) {
            Ok(body) => body,
            Err(err) => {
                let url = self.flight_url(flight_id);
                return (
                    None,
                    Query::not_sent("PUT", url.as_str(), format!("unserializable flight: {err}"))
                        .with_participant(self.participant_id()),
                );
            }
        };

        let query = self
            .session
            .query(Method::PUT, self.flight_url(flight_id), Some(&body))
            .await;

        (parse_response(&query), query)
    }

    async fn cleanup_flight(&self, flight_id: &str) -> (Option<DeleteFlightResponse>, Query) {
        let query = self
            .session
            .query(Method::DELETE, self.flight_url(flight_id), None)
            .await;

        (parse_response(&query), query)
    }

    async fn get_capabilities(&self) -> (Option<CapabilitiesResponse>, Query) {
        let query = self
            .session
            .query(Method::GET, self.session.url(CAPABILITIES_PATH), None)
            .await;

        (parse_response(&query), query)
    }

    async fn clear_area(
        &self,
        request_id: &str,
        extent: &Volume4D,
    ) -> (Option<ClearAreaResponse>, Query) {
        let url = self.session.url(CLEAR_AREA_PATH);
        let request = ClearAreaRequest {
            request_id: request_id.to_owned(),
            extent: extent.clone(),
        };
        let body = match serde_json::to_value(request) {
            Ok(body) => body,
            Err(err) => {
                return (
                    None,
                    Query::not_sent("POST", url.as_str(), format!("unserializable area: {err}"))
                        .with_participant(self.participant_id()),
                );
            }
        };

        let query = self.session.query(Method::POST, url, Some(&body)).await;
        (parse_response(&query), query)
    }
}

fn parse_response<T: DeserializeOwned>(query: &Query) -> Option<T> {
    if !query.succeeded() {
        return None;
    }

    let json: Value = query.json()?.clone();
    match serde_json::from_value(json) {
        Ok(response) => Some(response),
        Err(err) => {
            warn!(url = %query.request.url, %err, "Unexpected flight planning response");
            None
        }
    }
}
