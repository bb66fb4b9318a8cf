//! Integration tests for the HTTP collaborators against mock servers using
//! `wiremock`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;
use utm_conformance::dss::{Dss, HttpDss};
use utm_conformance::fetch::{Session, NO_RESPONSE_STATUS};
use utm_conformance::geometry::{Altitude, LatLngPoint, Polygon, Time, Volume3D, Volume4D};
use utm_conformance::interactions::{validate_get_interactions, GET_CHECK, LOG_RETRIEVABLE_CHECK};
use utm_conformance::mock_uss::{InteractionLog, MockUssClient, QueryError};
use utm_conformance::model::{
    Capability, FlightIntent, InjectFlightRequest, InjectFlightResult, InjectedOperationalIntent,
    OperationalIntentReference, OperationalIntentState,
};
use utm_conformance::planner::{FlightPlanner, HttpFlightPlanner};
use utm_conformance::Scenario;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap()
}

fn session(server: &MockServer, participant_id: &str) -> Session {
    Session::new(
        Client::new(),
        Url::parse(&server.uri()).unwrap(),
        Some("token".to_owned()),
        participant_id.to_owned(),
    )
}

fn extent() -> Volume4D {
    Volume4D {
        volume: Volume3D {
            outline_circle: None,
            outline_polygon: Some(Polygon {
                vertices: vec![
                    LatLngPoint::new(0.0, 0.0),
                    LatLngPoint::new(0.0, 0.01),
                    LatLngPoint::new(0.01, 0.01),
                    LatLngPoint::new(0.01, 0.0),
                ],
            }),
            altitude_lower: Some(Altitude::w84_meters(0.0)),
            altitude_upper: Some(Altitude::w84_meters(100.0)),
        },
        time_start: Some(Time::new(t0())),
        time_end: Some(Time::new(t0() + Duration::hours(1))),
    }
}

fn reference_json(id: &str, uss_base_url: &str) -> Value {
    json!({
        "id": id,
        "manager": "uss1",
        "uss_availability": "Normal",
        "version": 1,
        "state": "Accepted",
        "ovn": "",
        "time_start": {"value": "2026-01-01T10:00:00Z", "format": "RFC3339"},
        "time_end": {"value": "2026-01-01T11:00:00Z", "format": "RFC3339"},
        "uss_base_url": uss_base_url,
        "subscription_id": "sub1"
    })
}

fn interaction(method: &str, url: &str, at: DateTime<Utc>) -> Value {
    json!({
        "query": {
            "request": {
                "method": method,
                "url": url,
                "timestamp": at.to_rfc3339(),
            },
            "response": {"code": 200}
        },
        "direction": "Incoming"
    })
}

mod dss {
    use super::*;

    #[tokio::test]
    async fn test_find_op_intent_parses_references() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dss/v1/operational_intent_references/query"))
            .and(header("authorization", "Bearer token"))
            .and(body_partial_json(json!({
                "area_of_interest": {"time_start": {"format": "RFC3339"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "operational_intent_references": [reference_json("X", "https://uss1.example")]
            })))
            .mount(&server)
            .await;

        let dss = HttpDss::new(session(&server, "dss"));
        let (refs, query) = dss.find_op_intent(&extent()).await;

        assert_eq!(refs.len(), 1, "one reference");
        assert_eq!(refs[0].id, "X", "reference id");
        assert_eq!(query.status_code(), 200, "status recorded");
        assert_eq!(query.participant_id.as_deref(), Some("dss"), "query attributed to the DSS");
    }

    #[tokio::test]
    async fn test_failed_query_yields_no_references() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dss/v1/operational_intent_references/query"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&server)
            .await;

        let dss = HttpDss::new(session(&server, "dss"));
        let (refs, query) = dss.find_op_intent(&extent()).await;

        assert!(refs.is_empty(), "nothing found");
        assert_eq!(query.status_code(), 500, "status recorded");
        assert_eq!(
            query.error_message().as_deref(),
            Some("Internal Server Error"),
            "raw body kept"
        );
    }

    #[tokio::test]
    async fn test_details_are_fetched_from_the_managing_uss() {
        let dss_server = MockServer::start().await;
        let uss_server = MockServer::start().await;
        let reference: OperationalIntentReference =
            serde_json::from_value(reference_json("X", &uss_server.uri())).unwrap();

        Mock::given(method("GET"))
            .and(path("/uss/v1/operational_intents/X"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "operational_intent": {
                    "reference": reference_json("X", &uss_server.uri()),
                    "details": {"volumes": [extent()], "priority": 10}
                }
            })))
            .expect(2)
            .mount(&uss_server)
            .await;

        let dss = HttpDss::new(session(&dss_server, "dss"));
        let (op_intent, query) = dss.get_full_op_intent(&reference, Some("uss1")).await;
        let op_intent = op_intent.unwrap();
        assert_eq!(op_intent.details.priority, 10, "details parsed");
        assert_eq!(op_intent.details.volumes().len(), 1, "volume parsed");
        assert_eq!(query.participant_id.as_deref(), Some("uss1"), "attributed to the owner");

        let (raw, _) = dss.get_full_op_intent_without_validation(&reference, None).await;
        assert_eq!(
            raw.unwrap()["operational_intent"]["details"]["priority"],
            json!(10),
            "raw payload"
        );
    }

    #[tokio::test]
    async fn test_unparsable_details_still_return_the_query() {
        let dss_server = MockServer::start().await;
        let uss_server = MockServer::start().await;
        let reference: OperationalIntentReference =
            serde_json::from_value(reference_json("X", &uss_server.uri())).unwrap();

        let mut invalid = reference_json("X", &uss_server.uri());
        invalid["state"] = json!("Flying");
        Mock::given(method("GET"))
            .and(path("/uss/v1/operational_intents/X"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "operational_intent": {"reference": invalid, "details": {"priority": -1}}
            })))
            .mount(&uss_server)
            .await;

        let dss = HttpDss::new(session(&dss_server, "dss"));
        let (op_intent, query) = dss.get_full_op_intent(&reference, None).await;

        assert!(op_intent.is_none(), "not parsable");
        assert!(query.succeeded(), "the fetch itself succeeded");
        assert_eq!(
            query.json().unwrap()["operational_intent"]["reference"]["state"],
            json!("Flying"),
            "payload kept for schema validation"
        );
    }

    #[tokio::test]
    async fn test_set_uss_availability() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dss/v1/uss_availability/uss1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": {"uss": "uss1", "availability": "Normal", "version": "v1"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/dss/v1/uss_availability/uss1"))
            .and(body_partial_json(json!({"old_version": "v1", "availability": "Down"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": {"uss": "uss1", "availability": "Down", "version": "v2"}
            })))
            .mount(&server)
            .await;

        let dss = HttpDss::new(session(&server, "dss"));
        let (version, query) = dss.set_uss_availability("uss1", false).await;

        assert_eq!(version.as_deref(), Some("v2"), "new version");
        assert_eq!(query.request.method, "PUT", "the update is the recorded query");
    }

    #[tokio::test]
    async fn test_unreachable_uss_is_recorded_as_no_response() {
        let dss_server = MockServer::start().await;
        let reference: OperationalIntentReference =
            serde_json::from_value(reference_json("X", "http://127.0.0.1:1")).unwrap();

        let dss = HttpDss::new(session(&dss_server, "dss"));
        let (op_intent, query) = dss.get_full_op_intent(&reference, None).await;

        assert!(op_intent.is_none(), "nothing retrieved");
        assert_eq!(query.status_code(), NO_RESPONSE_STATUS, "no-response status");
        assert!(query.error_message().is_some(), "transport error kept");
    }
}

mod planner {
    use super::*;

    fn intent() -> FlightIntent {
        FlightIntent::injection(InjectFlightRequest {
            operational_intent: InjectedOperationalIntent {
                state: OperationalIntentState::Accepted,
                priority: 0,
                volumes: vec![extent()],
                off_nominal_volumes: vec![],
            },
            flight_authorisation: None,
            mock_uss_flight_behavior: None,
        })
    }

    #[tokio::test]
    async fn test_request_flight() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/v1/flights/[0-9a-f]+$"))
            .and(body_partial_json(json!({"operational_intent": {"state": "Accepted"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "Planned",
                "operational_intent_id": "X"
            })))
            .mount(&server)
            .await;

        let planner = HttpFlightPlanner::new(session(&server, "uss1"));
        let (response, query) = planner.request_flight("0123abcd", &intent()).await;

        let response = response.unwrap();
        assert_eq!(response.result, InjectFlightResult::Planned, "planned");
        assert_eq!(response.operational_intent_id.as_deref(), Some("X"), "op intent id");
        assert!(query.request.url.ends_with("/v1/flights/0123abcd"), "flight url");
    }

    #[tokio::test]
    async fn test_cleanup_flight_error_has_no_response() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/flights/0123abcd"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "no such flight"})),
            )
            .mount(&server)
            .await;

        let planner = HttpFlightPlanner::new(session(&server, "uss1"));
        let (response, query) = planner.cleanup_flight("0123abcd").await;

        assert!(response.is_none(), "no usable response");
        assert_eq!(query.error_message().as_deref(), Some("no such flight"), "message kept");
    }

    #[tokio::test]
    async fn test_get_capabilities() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/capabilities"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "capabilities": ["BasicStrategicConflictDetection", "HighPriorityFlights"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let planner = HttpFlightPlanner::new(session(&server, "uss1"));
        let (response, query) = planner.get_capabilities().await;

        assert!(query.succeeded(), "capabilities served");
        assert!(
            response
                .unwrap()
                .capabilities
                .contains(&Capability::BasicStrategicConflictDetection),
            "capability parsed"
        );
    }

    #[tokio::test]
    async fn test_clear_area_posts_extent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/clear_area_requests"))
            .and(body_partial_json(json!({
                "request_id": "req-1",
                "extent": {"volume": {"altitude_upper": {"value": 100.0}}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "outcome": {"success": true, "timestamp": {"value": "2026-01-01T10:00:00Z"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let planner = HttpFlightPlanner::new(session(&server, "uss1"));
        let (response, query) = planner.clear_area("req-1", &extent()).await;

        assert!(query.succeeded(), "area request accepted");
        assert!(response.unwrap().outcome.success, "area cleared");
    }
}

mod mock_uss {
    use super::*;

    #[tokio::test]
    async fn test_log_error_classes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mock_uss/interuss_logging/logs"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let client = MockUssClient::new(session(&server, "mock_uss"));
        assert!(
            matches!(client.get_interactions(t0()).await, Err(QueryError::Status { .. })),
            "server error"
        );

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mock_uss/interuss_logging/logs"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let client = MockUssClient::new(session(&server, "mock_uss"));
        assert!(
            matches!(client.get_interactions(t0()).await, Err(QueryError::MissingBody { .. })),
            "empty body"
        );

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mock_uss/interuss_logging/logs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;
        let client = MockUssClient::new(session(&server, "mock_uss"));
        assert!(
            matches!(client.get_interactions(t0()).await, Err(QueryError::InvalidJson { .. })),
            "not JSON"
        );
    }

    #[tokio::test]
    async fn test_get_interaction_must_follow_the_baseline() {
        let server = MockServer::start().await;
        let details_url = "https://control-uss.example/uss/v1/operational_intents/abc123";
        Mock::given(method("GET"))
            .and(path("/mock_uss/interuss_logging/logs"))
            .and(query_param("from_time", "2026-01-01T10:00:00.000000Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "interactions": [interaction("GET", details_url, t0() + Duration::seconds(5))]
            })))
            .mount(&server)
            .await;

        let client = MockUssClient::new(session(&server, "mock_uss"));
        let mut scenario = Scenario::new("audit");
        let passed = validate_get_interactions(
            &mut scenario,
            &client,
            t0(),
            "control-uss.example",
            "abc123",
            "Validate GET interaction",
        )
        .await;

        assert!(passed, "GET after the baseline satisfies the expectation");
        assert!(scenario.find_check(GET_CHECK).unwrap().passed(), "check passed");
    }

    #[tokio::test]
    async fn test_get_interaction_before_the_baseline_does_not_count() {
        let server = MockServer::start().await;
        let details_url = "https://control-uss.example/uss/v1/operational_intents/abc123";
        Mock::given(method("GET"))
            .and(path("/mock_uss/interuss_logging/logs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "interactions": [interaction("GET", details_url, t0() - Duration::seconds(5))]
            })))
            .mount(&server)
            .await;

        let client = MockUssClient::new(session(&server, "mock_uss"));
        let mut scenario = Scenario::new("audit");
        let passed = validate_get_interactions(
            &mut scenario,
            &client,
            t0(),
            "control-uss.example",
            "abc123",
            "Validate GET interaction",
        )
        .await;

        assert!(!passed, "stale interaction ignored");
        let check = scenario.find_check(GET_CHECK).unwrap();
        assert_eq!(check.participants, vec!["mock_uss".to_owned()], "attributed to the mock USS");
        assert!(scenario.find_check(LOG_RETRIEVABLE_CHECK).is_none(), "log itself was fine");
    }

    #[tokio::test]
    async fn test_unretrievable_log_is_not_a_semantic_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mock_uss/interuss_logging/logs"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = MockUssClient::new(session(&server, "mock_uss"));
        let mut scenario = Scenario::new("audit");
        let passed = validate_get_interactions(
            &mut scenario,
            &client,
            t0(),
            "control-uss.example",
            "abc123",
            "Validate GET interaction",
        )
        .await;

        assert!(!passed, "nothing could be verified");
        assert!(!scenario.find_check(LOG_RETRIEVABLE_CHECK).unwrap().passed(), "retrieval failed");
        assert!(scenario.find_check(GET_CHECK).is_none(), "expectation not evaluated");

        let report = scenario.finish(None);
        assert_eq!(report.steps[0].queries.len(), 1, "failed log query recorded");
    }
}
