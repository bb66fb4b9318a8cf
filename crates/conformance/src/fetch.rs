//! HTTP evidence capture.
//!
//! Every call a check depends on is described by a [`Query`] so that the
//! report can point at the exact request and response behind a failure.

use std::time::Instant;

use chrono::{DateTime, Utc};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Status code recorded when no HTTP response was received at all.
pub const NO_RESPONSE_STATUS: u16 = 999;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestDescription {
    pub method: String,
    pub url: String,
    pub initiated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseDescription {
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    /// Raw body, kept only when it could not be parsed as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Transport-level failure, when no response was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub elapsed_s: f64,
    pub reported: DateTime<Utc>,
}

/// Immutable record of one request/response exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub request: RequestDescription,
    pub response: ResponseDescription,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
}

impl Query {
    /// Builds a query record from already known parts, for collaborators that
    /// do not go over HTTP.
    #[must_use]
    pub fn from_parts(method: &str, url: &str, code: u16, json: Option<Value>) -> Self {
        let now = Utc::now();
        Self {
            request: RequestDescription {
                method: method.to_owned(),
                url: url.to_owned(),
                initiated_at: now,
                json: None,
            },
            response: ResponseDescription {
                code,
                json,
                body: None,
                failure: None,
                elapsed_s: 0.0,
                reported: now,
            },
            participant_id: None,
        }
    }

    /// Query that never reached the wire, e.g. because its URL was invalid.
    #[must_use]
    pub fn not_sent(method: &str, url: &str, failure: impl Into<String>) -> Self {
        let mut query = Self::from_parts(method, url, NO_RESPONSE_STATUS, None);
        query.response.failure = Some(failure.into());
        query
    }

    #[must_use]
    pub fn with_participant(mut self, participant_id: impl Into<String>) -> Self {
        self.participant_id = Some(participant_id.into());
        self
    }

    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.response.code
    }

    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.response.code == 200
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.request.initiated_at
    }

    #[must_use]
    pub const fn json(&self) -> Option<&Value> {
        self.response.json.as_ref()
    }

    /// Best-effort human readable reason for a failed query.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        if let Some(failure) = &self.response.failure {
            return Some(failure.clone());
        }

        if let Some(json) = &self.response.json {
            return json
                .get("message")
                .or_else(|| json.get("error"))
                .map(|m| m.as_str().map_or_else(|| m.to_string(), ToOwned::to_owned));
        }

        self.response.body.clone().filter(|b| !b.is_empty())
    }
}

/// Connection to one participant's HTTP API.
#[derive(Clone, Debug)]
pub struct Session {
    client: Client,
    base_url: Url,
    token: Option<String>,
    participant_id: String,
}

impl Session {
    #[must_use]
    pub const fn new(
        client: Client,
        base_url: Url,
        token: Option<String>,
        participant_id: String,
    ) -> Self {
        Self {
            client,
            base_url,
            token,
            participant_id,
        }
    }

    #[must_use]
    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Resolves `path` against the base URL, keeping any base path prefix.
    #[must_use]
    pub fn url(&self, path: &str) -> Url {
        join_path(&self.base_url, path)
    }

    pub async fn query(&self, method: Method, url: Url, body: Option<&Value>) -> Query {
        query_and_describe(
            &self.client,
            method,
            url,
            body,
            self.token.as_deref(),
            Some(&self.participant_id),
        )
        .await
    }
}

/// Appends `path` to the path of `base`.
#[must_use]
pub fn join_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url
}

/// Performs a request and describes it, never failing: transport errors are
/// recorded as a response with [`NO_RESPONSE_STATUS`].
pub async fn query_and_describe(
    client: &Client,
    method: Method,
    url: Url,
    body: Option<&Value>,
    token: Option<&str>,
    participant_id: Option<&str>,
) -> Query {
    let request = RequestDescription {
        method: method.to_string(),
        url: url.to_string(),
        initiated_at: Utc::now(),
        json: body.cloned(),
    };

    let mut builder = client.request(method, url);
    if let Some(token) = token {
        builder = builder.bearer_auth(token);
    }
    if let Some(body) = body {
        builder = builder.json(body);
    }

    let started = Instant::now();
    let response = match builder.send().await {
        Ok(response) => {
            let code = response.status().as_u16();
            match response.text().await {
                Ok(text) => describe_body(code, text, started),
                Err(err) => failed_response(code, err.to_string(), started),
            }
        }
        Err(err) => failed_response(NO_RESPONSE_STATUS, err.to_string(), started),
    };

    debug!(
        method = %request.method,
        url = %request.url,
        code = response.code,
        "Query completed"
    );

    Query {
        request,
        response,
        participant_id: participant_id.map(ToOwned::to_owned),
    }
}

fn describe_body(code: u16, text: String, started: Instant) -> ResponseDescription {
    let (json, body) = match serde_json::from_str::<Value>(&text) {
        Ok(json) => (Some(json), None),
        Err(_) => (None, Some(text)),
    };

    ResponseDescription {
        code,
        json,
        body,
        failure: None,
        elapsed_s: started.elapsed().as_secs_f64(),
        reported: Utc::now(),
    }
}

fn failed_response(code: u16, failure: String, started: Instant) -> ResponseDescription {
    ResponseDescription {
        code,
        json: None,
        body: None,
        failure: Some(failure),
        elapsed_s: started.elapsed().as_secs_f64(),
        reported: Utc::now(),
    }
}
