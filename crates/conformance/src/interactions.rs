//! Matching of expected calls against a mock USS interaction log.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use url::Url;

use crate::mock_uss::{Interaction, InteractionLog};
use crate::report::{Scenario, Severity};

pub const LOG_RETRIEVABLE_CHECK: &str = "Mock USS interaction logs retrievable";
pub const GET_CHECK: &str = "Expect GET request when no notification";
pub const NOTIFICATION_SENT_CHECK: &str = "Expect Notification sent";
pub const NOTIFICATION_NOT_SENT_CHECK: &str = "Expect Notification not sent";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expectation {
    /// At least one matching interaction.
    Called,
    /// No matching interaction.
    NotCalled,
}

/// Selects the interactions relevant to one expectation.
#[derive(Clone, Debug)]
pub struct InteractionFilter {
    /// Interactions at or before this instant never match.
    pub since: DateTime<Utc>,
    /// Either a URL prefix (`https://uss.example/`) or a bare host name.
    pub domain: String,
    pub methods: Vec<String>,
    /// For GETs, the URL path must mention this entity.
    pub entity_id: Option<String>,
}

impl InteractionFilter {
    #[must_use]
    pub fn new(since: DateTime<Utc>, domain: impl Into<String>, method: &str) -> Self {
        Self {
            since,
            domain: domain.into(),
            methods: vec![method.to_owned()],
            entity_id: None,
        }
    }

    #[must_use]
    pub fn referencing(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    #[must_use]
    pub fn matches(&self, interaction: &Interaction) -> bool {
        if interaction.timestamp() <= self.since {
            return false;
        }

        if !self
            .methods
            .iter()
            .any(|method| method.eq_ignore_ascii_case(interaction.method()))
        {
            return false;
        }

        if !domain_matches(&self.domain, interaction.url()) {
            return false;
        }

        match &self.entity_id {
            Some(id) if interaction.method().eq_ignore_ascii_case("GET") => {
                path_of(interaction.url()).contains(id.as_str())
            }
            _ => true,
        }
    }

    fn describe(&self) -> String {
        let mut description = format!(
            "{} to {} after {}",
            self.methods.join("/"),
            self.domain,
            self.since
        );
        if let Some(id) = &self.entity_id {
            let _ = write!(description, " referencing {id}");
        }
        description
    }
}

fn domain_matches(domain: &str, url: &str) -> bool {
    if domain.contains("://") {
        return url.starts_with(domain);
    }

    Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.eq_ignore_ascii_case(domain)))
        .unwrap_or(false)
}

fn path_of(url: &str) -> String {
    Url::parse(url).map_or_else(|_| url.to_owned(), |url| url.path().to_owned())
}

pub fn matching_interactions<'a>(
    interactions: &'a [Interaction],
    filter: &InteractionFilter,
) -> Vec<&'a Interaction> {
    interactions
        .iter()
        .filter(|interaction| filter.matches(interaction))
        .collect()
}

/// Fetches the log since the filter's baseline and records `check_name`
/// according to `expectation`. Returns whether the expectation held.
///
/// When the log cannot be fetched, a failure on the log retrieval check is
/// recorded instead and `check_name` is not evaluated.
pub async fn expect_interactions(
    scenario: &mut Scenario,
    log: &dyn InteractionLog,
    filter: &InteractionFilter,
    expectation: Expectation,
    check_name: &str,
) -> bool {
    let participant = log.participant_id().to_owned();

    let interactions = match log.get_interactions(filter.since).await {
        Ok(interactions) => interactions,
        Err(err) => {
            let query = err.query().clone();
            scenario.record_query(&query);
            let _ = scenario.check(LOG_RETRIEVABLE_CHECK, [participant.as_str()], |check| {
                check.record_failed(
                    "Could not retrieve interaction logs from mock USS",
                    Severity::High,
                    err.to_string(),
                    vec![query.timestamp()],
                );
            });
            return false;
        }
    };

    let matched = matching_interactions(&interactions, filter);
    debug!(
        total = interactions.len(),
        matched = matched.len(),
        ?expectation,
        "Filtered interactions"
    );

    let timestamps: Vec<_> = matched.iter().map(|i| i.timestamp()).collect();
    scenario.check(check_name, [participant.as_str()], |check| match expectation {
        Expectation::Called if matched.is_empty() => {
            check.record_failed(
                "Expected interaction not found",
                Severity::High,
                format!(
                    "No interaction matching {} was found among {} logged by {participant}",
                    filter.describe(),
                    interactions.len()
                ),
                Vec::new(),
            );
        }
        Expectation::NotCalled if !matched.is_empty() => {
            check.record_failed(
                "Unexpected interaction found",
                Severity::High,
                format!(
                    "{} interaction(s) matching {} were logged by {participant}",
                    matched.len(),
                    filter.describe()
                ),
                timestamps,
            );
        }
        Expectation::Called | Expectation::NotCalled => {}
    })
}

/// Expects the operational intent `op_intent_id` to have been fetched from
/// `domain` since `since`.
pub async fn validate_get_interactions(
    scenario: &mut Scenario,
    log: &dyn InteractionLog,
    since: DateTime<Utc>,
    domain: &str,
    op_intent_id: &str,
    test_step: &str,
) -> bool {
    scenario.begin_test_step(test_step);
    info!(%domain, %op_intent_id, "Checking for GET of operational intent details");
    let filter = InteractionFilter::new(since, domain, "GET").referencing(op_intent_id);
    let passed = expect_interactions(scenario, log, &filter, Expectation::Called, GET_CHECK).await;
    scenario.end_test_step();
    passed
}

/// Expects a change notification to have been sent to `domain` since `since`.
pub async fn validate_post_interactions(
    scenario: &mut Scenario,
    log: &dyn InteractionLog,
    since: DateTime<Utc>,
    domain: &str,
    test_step: &str,
) -> bool {
    scenario.begin_test_step(test_step);
    let filter = InteractionFilter::new(since, domain, "POST");
    let passed = expect_interactions(
        scenario,
        log,
        &filter,
        Expectation::Called,
        NOTIFICATION_SENT_CHECK,
    )
    .await;
    scenario.end_test_step();
    passed
}

/// Expects no change notification to have been sent to `domain` since `since`.
pub async fn validate_no_post_interactions(
    scenario: &mut Scenario,
    log: &dyn InteractionLog,
    since: DateTime<Utc>,
    domain: &str,
    test_step: &str,
) -> bool {
    scenario.begin_test_step(test_step);
    let filter = InteractionFilter::new(since, domain, "POST");
    let passed = expect_interactions(
        scenario,
        log,
        &filter,
        Expectation::NotCalled,
        NOTIFICATION_NOT_SENT_CHECK,
    )
    .await;
    scenario.end_test_step();
    passed
}
