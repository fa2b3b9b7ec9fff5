use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::encoding::EncodedPayload;

pub const NETWORK_ERROR_MESSAGE: &str = "network error";
pub const TIMEOUT_MESSAGE: &str = "timeout";
pub const MALFORMED_RESPONSE_MESSAGE: &str = "malformed response";

/// A single model's verdict; the service reports either a label or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionValue {
    Score(f64),
    Label(String),
}

impl std::fmt::Display for PredictionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictionValue::Score(score) => write!(f, "{score}"),
            PredictionValue::Label(label) => f.write_str(label),
        }
    }
}

/// Response body of `POST /predict` as it arrives on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<BTreeMap<String, PredictionValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionResponse {
    /// Classify the body: an `error` field always wins over predictions.
    pub fn into_result(self) -> SubmissionResult {
        if let Some(message) = self.error {
            return SubmissionResult::Failure { message };
        }

        match self.predictions {
            Some(predictions) => SubmissionResult::Success(PredictionBundle {
                predictions,
                average_score: self.average_score.unwrap_or_default(),
                risk_category: self.risk_category.unwrap_or_default(),
                summary: self.summary.unwrap_or_default(),
            }),
            None => SubmissionResult::Failure {
                message: MALFORMED_RESPONSE_MESSAGE.to_string(),
            },
        }
    }
}

/// Everything the result view renders after a successful prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionBundle {
    pub predictions: BTreeMap<String, PredictionValue>,
    pub average_score: f64,
    pub risk_category: String,
    /// Markdown text.
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionResult {
    Success(PredictionBundle),
    Failure { message: String },
}

impl SubmissionResult {
    pub fn failure(message: impl Into<String>) -> Self {
        SubmissionResult::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SubmissionResult::Success(_))
    }
}

/// Failure to obtain a decodable body from the scoring service.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("scoring service unreachable: {0}")]
    Network(String),
    #[error("scoring service returned an undecodable body: {0}")]
    Decode(String),
}

/// Seam to the remote scoring function.
pub trait ScoringService: Send + Sync {
    fn predict(
        &self,
        payload: &EncodedPayload,
    ) -> impl Future<Output = Result<PredictionResponse, TransportError>> + Send;
}

/// Send one payload and fold every outcome into a [`SubmissionResult`].
pub async fn submit<S>(service: &S, payload: &EncodedPayload, timeout: Duration) -> SubmissionResult
where
    S: ScoringService,
{
    debug!(features = payload.features().len(), "sending payload to scoring service");
    match tokio::time::timeout(timeout, service.predict(payload)).await {
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "scoring request timed out");
            SubmissionResult::failure(TIMEOUT_MESSAGE)
        }
        Ok(Err(TransportError::Network(detail))) => {
            warn!(%detail, "scoring request failed");
            SubmissionResult::failure(NETWORK_ERROR_MESSAGE)
        }
        Ok(Err(TransportError::Decode(detail))) => {
            warn!(%detail, "scoring response could not be decoded");
            SubmissionResult::failure(MALFORMED_RESPONSE_MESSAGE)
        }
        Ok(Ok(response)) => response.into_result(),
    }
}

/// JSON-over-HTTP client for the scoring service's `/predict` endpoint.
///
/// Requests run on the blocking pool; the agent's own timeout bounds how long a worker thread
/// stays busy after the caller has given up.
#[derive(Debug, Clone)]
pub struct HttpScoringClient {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpScoringClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self::with_agent(agent, endpoint)
    }

    pub fn with_agent(agent: ureq::Agent, endpoint: impl Into<String>) -> Self {
        Self {
            agent,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn post_payload(
    agent: &ureq::Agent,
    endpoint: &str,
    payload: &EncodedPayload,
) -> Result<PredictionResponse, TransportError> {
    let response = match agent.post(endpoint).send_json(payload) {
        Ok(response) => response,
        // 4xx/5xx bodies still carry the `error` field shown to the user.
        Err(ureq::Error::Status(_, response)) => response,
        Err(err) => return Err(TransportError::Network(err.to_string())),
    };
    let status = response.status();
    let body = response
        .into_string()
        .map_err(|err| TransportError::Network(err.to_string()))?;
    serde_json::from_str::<PredictionResponse>(&body)
        .map_err(|err| TransportError::Decode(format!("status {status}: {err}")))
}

impl ScoringService for HttpScoringClient {
    fn predict(
        &self,
        payload: &EncodedPayload,
    ) -> impl Future<Output = Result<PredictionResponse, TransportError>> + Send {
        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let payload = payload.clone();
        async move {
            tokio::task::spawn_blocking(move || post_payload(&agent, &endpoint, &payload))
                .await
                .map_err(|err| TransportError::Network(err.to_string()))?
        }
    }
}
