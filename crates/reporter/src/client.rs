//! HTTP step client for the multimodal tracking API.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, warn};
use url::Url;

use crate::config::ReporterConfig;
use crate::{Context, ReportError, StepReporter};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackPayload<'a> {
    step_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<Context>,
    conversation_id: &'a str,
    journey_id: &'a str,
    language_code: &'a str,
}

/// Sends steps to `{apiUrl}/track`.
#[derive(Debug, Clone)]
pub struct VoiceCompassClient {
    config: ReporterConfig,
    track_url: Url,
    http: Client,
}

/// Builds a client. Fails when the API URL is unusable or the HTTP client
/// cannot be constructed.
pub fn create(config: ReporterConfig) -> Result<VoiceCompassClient, ReportError> {
    if config.conversation_id.is_empty() {
        warn!(
            "No conversation ID provided. Pass the `conversationId` extracted from the page URL \
             (e.g. the `cid` query parameter) when creating the client."
        );
    }

    let raw = format!("{}/track", config.api_url.trim_end_matches('/'));
    let track_url = Url::parse(&raw).map_err(|e| ReportError::InvalidApiUrl {
        url: config.api_url.clone(),
        reason: e.to_string(),
    })?;
    if !matches!(track_url.scheme(), "http" | "https") {
        return Err(ReportError::InvalidApiUrl {
            url: config.api_url.clone(),
            reason: format!("unsupported scheme `{}`", track_url.scheme()),
        });
    }

    let http = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ReportError::Client(e.to_string()))?;

    Ok(VoiceCompassClient {
        config,
        track_url,
        http,
    })
}

impl VoiceCompassClient {
    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    pub fn conversation_id(&self) -> &str {
        &self.config.conversation_id
    }

    async fn post(&self, payload: &TrackPayload<'_>) -> Result<(), ReportError> {
        let response = self
            .http
            .post(self.track_url.clone())
            .header("x-api-key", &self.config.api_key)
            .header("x-nlx-id", &self.config.workspace_id)
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StepReporter for VoiceCompassClient {
    async fn send_step(&self, step_id: &str, context: Option<Context>) -> Result<(), ReportError> {
        if !is_step_id(step_id) {
            return Err(ReportError::InvalidStepId(step_id.to_string()));
        }

        let payload = TrackPayload {
            step_id,
            context,
            conversation_id: &self.config.conversation_id,
            journey_id: &self.config.journey_id,
            language_code: &self.config.language_code,
        };

        let outcome = self.post(&payload).await;
        if self.config.debug {
            match &outcome {
                Ok(()) => info!(step_id = %step_id, payload = ?payload, "✓ step"),
                Err(e) => error!(step_id = %step_id, error = %e, payload = ?payload, "× step"),
            }
        }
        outcome
    }
}

/// Step ids are hyphenated UUIDs.
fn is_step_id(step_id: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                "^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
            )
            .expect("step id pattern is valid")
        })
        .is_match(step_id)
}
