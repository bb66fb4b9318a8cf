//! Discovery and Synchronization Service collaborator.

use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::fetch::{join_path, query_and_describe, Query, Session};
use crate::geometry::Volume4D;
use crate::model::{
    GetOperationalIntentDetailsResponse, OperationalIntent, OperationalIntentReference,
};

const QUERY_PATH: &str = "/dss/v1/operational_intent_references/query";
const AVAILABILITY_PATH: &str = "/dss/v1/uss_availability";
const DETAILS_PATH: &str = "/uss/v1/operational_intents";

/// Directory of operational intents, plus retrieval of the details their
/// owning USSes share.
///
/// Every operation returns the [`Query`] it was based on, also when it failed,
/// so that checks can cite it.
#[async_trait::async_trait]
pub trait Dss: Send + Sync {
    fn participant_id(&self) -> &str;

    /// References whose volumes intersect `extent`. Empty when the query failed.
    async fn find_op_intent(&self, extent: &Volume4D) -> (Vec<OperationalIntentReference>, Query);

    /// Full operational intent from the USS managing `reference`.
    ///
    /// `owner_hint` is the participant the USS belongs to, used for
    /// attributing the query; the reference's manager is used otherwise.
    async fn get_full_op_intent(
        &self,
        reference: &OperationalIntentReference,
        owner_hint: Option<&str>,
    ) -> (Option<OperationalIntent>, Query);

    /// Like [`Dss::get_full_op_intent`] but returns the raw payload without
    /// interpreting it.
    async fn get_full_op_intent_without_validation(
        &self,
        reference: &OperationalIntentReference,
        owner_hint: Option<&str>,
    ) -> (Option<Value>, Query);

    /// Sets the availability of `uss_id`, returning the new availability
    /// version on success.
    async fn set_uss_availability(&self, uss_id: &str, available: bool) -> (Option<String>, Query);
}

#[derive(Debug, Deserialize)]
struct QueryOperationalIntentReferenceResponse {
    #[serde(default)]
    operational_intent_references: Vec<OperationalIntentReference>,
}

#[derive(Debug, Deserialize)]
struct UssAvailabilityStatusResponse {
    status: UssAvailabilityStatus,
}

#[derive(Debug, Deserialize)]
struct UssAvailabilityStatus {
    version: String,
}

/// [`Dss`] speaking the F3548-21 HTTP API.
#[derive(Clone, Debug)]
pub struct HttpDss {
    session: Session,
}

impl HttpDss {
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }

    async fn fetch_details(
        &self,
        reference: &OperationalIntentReference,
        owner_hint: Option<&str>,
    ) -> Query {
        let participant = owner_hint.unwrap_or(reference.manager.as_str());

        let url = match Url::parse(&reference.uss_base_url) {
            Ok(base) => join_path(&base, &format!("{DETAILS_PATH}/{}", reference.id)),
            Err(err) => {
                warn!(
                    id = %reference.id,
                    uss_base_url = %reference.uss_base_url,
                    %err,
                    "Operational intent reference has an invalid USS base URL"
                );
                return Query::not_sent(
                    "GET",
                    &reference.uss_base_url,
                    format!("invalid uss_base_url: {err}"),
                )
                .with_participant(participant);
            }
        };

        query_and_describe(
            self.session.client(),
            Method::GET,
            url,
            None,
            self.session.token(),
            Some(participant),
        )
        .await
    }
}

#[async_trait::async_trait]
impl Dss for HttpDss {
    fn participant_id(&self) -> &str {
        self.session.participant_id()
    }

    async fn find_op_intent(&self, extent: &Volume4D) -> (Vec<OperationalIntentReference>, Query) {
        let body = json!({ "area_of_interest": extent });
        let query = self
            .session
            .query(Method::POST, self.session.url(QUERY_PATH), Some(&body))
            .await;

        if !query.succeeded() {
            return (Vec::new(), query);
        }

        let refs = match query
            .json()
            .cloned()
            .map(serde_json::from_value::<QueryOperationalIntentReferenceResponse>)
        {
            Some(Ok(response)) => response.operational_intent_references,
            Some(Err(err)) => {
                warn!(%err, "DSS returned malformed operational intent references");
                Vec::new()
            }
            None => {
                warn!("DSS returned no JSON body for operational intent query");
                Vec::new()
            }
        };
        debug!(count = refs.len(), "Found operational intent references");

        (refs, query)
    }

    async fn get_full_op_intent(
        &self,
        reference: &OperationalIntentReference,
        owner_hint: Option<&str>,
    ) -> (Option<OperationalIntent>, Query) {
        let query = self.fetch_details(reference, owner_hint).await;
        if !query.succeeded() {
            return (None, query);
        }

        let parsed = query
            .json()
            .cloned()
            .map(serde_json::from_value::<GetOperationalIntentDetailsResponse>);
        let op_intent = match parsed {
            Some(Ok(response)) => Some(response.operational_intent),
            Some(Err(err)) => {
                warn!(id = %reference.id, %err, "Could not parse operational intent details");
                None
            }
            None => None,
        };

        (op_intent, query)
    }

    async fn get_full_op_intent_without_validation(
        &self,
        reference: &OperationalIntentReference,
        owner_hint: Option<&str>,
    ) -> (Option<Value>, Query) {
        let query = self.fetch_details(reference, owner_hint).await;
        (query.json().cloned(), query)
    }

    async fn set_uss_availability(&self, uss_id: &str, available: bool) -> (Option<String>, Query) {
        let url = self.session.url(&format!("{AVAILABILITY_PATH}/{uss_id}"));

        let current = self.session.query(Method::GET, url.clone(), None).await;
        if !current.succeeded() {
            return (None, current);
        }
        let old_version = availability_version(&current).unwrap_or_default();

        let availability = if available { "Normal" } else { "Down" };
        let body = json!({
            "old_version": old_version,
            "availability": availability,
        });
        let query = self.session.query(Method::PUT, url, Some(&body)).await;
        if !query.succeeded() {
            return (None, query);
        }

        (availability_version(&query), query)
    }
}

fn availability_version(query: &Query) -> Option<String> {
    let json = query.json()?.clone();
    serde_json::from_value::<UssAvailabilityStatusResponse>(json)
        .map(|response| response.status.version)
        .ok()
}
