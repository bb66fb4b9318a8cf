use core::time::Duration;
use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{Result as EyreResult, WrapErr};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::from_slice;
use tokio::fs::read;
use url::Url;
use utm_conformance::fetch::Session;
use utm_conformance::model::FlightIntent;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub dss: ParticipantConfig,
    pub sut: ParticipantConfig,
    pub control_uss: ParticipantConfig,
    pub mock_uss: ParticipantConfig,
    /// JSON file mapping flight intent names to flight intents. Relative
    /// paths are resolved against the directory of the configuration file.
    pub flight_intents: Utf8PathBuf,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantConfig {
    pub participant_id: String,
    pub base_url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl Config {
    pub async fn load(path: &Utf8Path) -> EyreResult<Self> {
        let bytes = read(path)
            .await
            .wrap_err_with(|| format!("failed to read config file {path}"))?;
        let mut config: Self =
            from_slice(&bytes).wrap_err_with(|| format!("failed to parse config file {path}"))?;

        if config.flight_intents.is_relative() {
            if let Some(dir) = path.parent() {
                config.flight_intents = dir.join(&config.flight_intents);
            }
        }

        Ok(config)
    }

    pub async fn load_flight_intents(&self) -> EyreResult<BTreeMap<String, FlightIntent>> {
        let path = &self.flight_intents;
        let bytes = read(path)
            .await
            .wrap_err_with(|| format!("failed to read flight intents {path}"))?;

        from_slice(&bytes).wrap_err_with(|| format!("failed to parse flight intents {path}"))
    }

    pub fn client(&self) -> EyreResult<Client> {
        Client::builder()
            .timeout(Duration::from_millis(self.http.timeout_ms))
            .build()
            .wrap_err("failed to build HTTP client")
    }
}

impl ParticipantConfig {
    pub fn session(&self, client: &Client) -> Session {
        Session::new(
            client.clone(),
            self.base_url.clone(),
            self.token.clone(),
            self.participant_id.clone(),
        )
    }
}
