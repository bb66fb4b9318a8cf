//! Client for the interaction log a mock USS keeps of its own traffic.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::fetch::{Query, Session};

const LOGS_PATH: &str = "/mock_uss/interuss_logging/logs";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryDirection {
    /// Received by the mock USS.
    Incoming,
    /// Sent by the mock USS.
    Outgoing,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    #[serde(alias = "timestamp")]
    pub initiated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, alias = "timestamp", skip_serializing_if = "Option::is_none")]
    pub reported: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedQuery {
    pub request: RecordedRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<RecordedResponse>,
}

/// One call the mock USS made or received.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub query: RecordedQuery,
    pub direction: QueryDirection,
}

impl Interaction {
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.query.request.initiated_at
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.query.request.method
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.query.request.url
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListLogsResponse {
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

/// Failure to obtain the interaction log. Distinct from an empty log.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    #[error("request to mock USS {} returned a {}", .query.request.url, .query.status_code())]
    Status { query: Box<Query> },

    #[error("interaction log response from mock USS did not contain a JSON body")]
    MissingBody { query: Box<Query> },

    #[error("interaction log response from mock USS contained invalid JSON: {message}")]
    InvalidJson { message: String, query: Box<Query> },
}

impl QueryError {
    /// The query that failed.
    #[must_use]
    pub fn query(&self) -> &Query {
        match self {
            Self::Status { query }
            | Self::MissingBody { query }
            | Self::InvalidJson { query, .. } => query,
        }
    }
}

#[async_trait::async_trait]
pub trait InteractionLog: Send + Sync {
    fn participant_id(&self) -> &str;

    /// Interactions recorded since `from_time`.
    async fn get_interactions(
        &self,
        from_time: DateTime<Utc>,
    ) -> Result<Vec<Interaction>, QueryError>;
}

#[derive(Clone, Debug)]
pub struct MockUssClient {
    session: Session,
}

impl MockUssClient {
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait::async_trait]
impl InteractionLog for MockUssClient {
    fn participant_id(&self) -> &str {
        self.session.participant_id()
    }

    async fn get_interactions(
        &self,
        from_time: DateTime<Utc>,
    ) -> Result<Vec<Interaction>, QueryError> {
        let mut url = self.session.url(LOGS_PATH);
        let _ = url
            .query_pairs_mut()
            .append_pair("from_time", &from_time.to_rfc3339_opts(SecondsFormat::Micros, true));
        debug!(%from_time, %url, "Getting interactions");

        let query = self.session.query(Method::GET, url, None).await;
        parse_logs(query)
    }
}

fn parse_logs(query: Query) -> Result<Vec<Interaction>, QueryError> {
    if !query.succeeded() {
        return Err(QueryError::Status {
            query: Box::new(query),
        });
    }

    let Some(json) = query.json().cloned() else {
        if query.response.body.as_deref().unwrap_or_default().is_empty() {
            return Err(QueryError::MissingBody {
                query: Box::new(query),
            });
        }
        return Err(QueryError::InvalidJson {
            message: "body is not JSON".to_owned(),
            query: Box::new(query),
        });
    };

    match serde_json::from_value::<ListLogsResponse>(json) {
        Ok(response) => Ok(response.interactions),
        Err(err) => Err(QueryError::InvalidJson {
            message: err.to_string(),
            query: Box::new(query),
        }),
    }
}
