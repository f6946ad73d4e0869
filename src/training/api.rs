//! HTTP client for the training service.
//!
//! Request and response bodies are JSON. `success: false` in an otherwise
//! well-formed response is an application error, distinct from transport
//! failures. None of these calls retry on their own; the polling cadence is
//! the only built-in resilience.

use serde::Deserialize;
use url::Url;

use crate::http_client;
use crate::training::monitor::JobId;
use crate::training::request::TrainingRequest;
use crate::training::save::TrainedModelDraft;
use crate::training::snapshot::StatusSnapshot;

const MAX_ACK_RESPONSE_BYTES: usize = 64 * 1024;
const MAX_STATUS_RESPONSE_BYTES: usize = 512 * 1024;

/// The configured base URL is not usable.
#[derive(Debug, thiserror::Error)]
#[error("Invalid training service URL '{url}': {source}")]
pub struct BaseUrlError {
    url: String,
    source: url::ParseError,
}

/// Failure to start a training job.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// The request violates the submittable invariant; nothing was sent.
    #[error(transparent)]
    Invalid(#[from] crate::training::request::ValidationError),
    /// The service refused to start training.
    #[error("Training service rejected the request: {0}")]
    Rejected(String),
    /// Network-level failure; the session fails without polling.
    #[error("HTTP error: {0}")]
    Transport(String),
    #[error("JSON error: {0}")]
    Json(String),
    /// The service reported success but assigned no job identifier.
    #[error("Start response carried no model_id")]
    MissingJobId,
}

/// Failure to fetch one status snapshot. Never fatal to the session; the
/// next scheduled tick retries.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("HTTP error: {0}")]
    Transport(String),
    #[error("JSON error: {0}")]
    Json(String),
}

/// Failure of a cancel request; the session stays active and the caller may
/// retry.
#[derive(Debug, thiserror::Error)]
pub enum CancelRequestError {
    #[error("Training service refused to cancel: {0}")]
    Rejected(String),
    #[error("HTTP error: {0}")]
    Transport(String),
    #[error("JSON error: {0}")]
    Json(String),
}

/// Failure to persist a trained model.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("Training service refused to save the model: {0}")]
    Rejected(String),
    #[error("HTTP error: {0}")]
    Transport(String),
    #[error("JSON error: {0}")]
    Json(String),
}

#[derive(Debug, Deserialize)]
struct StartResponseWire {
    #[serde(default)]
    success: bool,
    /// Assigned as an integer by the service; treated as opaque here.
    model_id: Option<serde_json::Value>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AckWire {
    #[serde(default)]
    success: bool,
    message: Option<String>,
}

/// Client for one training service.
#[derive(Debug, Clone)]
pub struct TrainingApi {
    base: Url,
}

impl TrainingApi {
    /// Build a client for the given base URL.
    pub fn new(base_url: &str) -> Result<Self, BaseUrlError> {
        let base = Url::parse(base_url.trim_end_matches('/')).map_err(|source| BaseUrlError {
            url: base_url.to_string(),
            source,
        })?;
        Ok(Self { base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base.as_str().trim_end_matches('/'))
    }

    /// `POST /api/train-model`: validate, submit, and return the assigned
    /// job identifier. An invalid request fails fast with no network call.
    pub fn start_training(&self, request: &TrainingRequest) -> Result<JobId, StartError> {
        request.validate()?;
        let url = self.endpoint("/api/train-model");
        let response = match http_client::agent()
            .post(&url)
            .set("Accept", "application/json")
            .send_json(request)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = read_ack_body(response);
                return Err(StartError::Rejected(format!("HTTP {code}: {body}")));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(StartError::Transport(err.to_string()));
            }
        };

        let body = http_client::read_body_limited(response, MAX_ACK_RESPONSE_BYTES)
            .map_err(|err| StartError::Json(err.to_string()))?;
        let parsed: StartResponseWire =
            serde_json::from_str(&body).map_err(|err| StartError::Json(format!("{err}: {body}")))?;
        if !parsed.success {
            return Err(StartError::Rejected(
                parsed
                    .message
                    .unwrap_or_else(|| "Failed to start training".to_string()),
            ));
        }
        job_id_from_value(parsed.model_id).ok_or(StartError::MissingJobId)
    }

    /// `GET /api/training-status/{model_id}`: fetch the current snapshot.
    pub fn fetch_status(&self, job_id: &JobId) -> Result<StatusSnapshot, StatusError> {
        let url = self.endpoint(&format!("/api/training-status/{job_id}"));
        let response = match http_client::agent().get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(StatusError::Transport(format!("HTTP {code}")));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(StatusError::Transport(err.to_string()));
            }
        };
        let body = http_client::read_body_limited(response, MAX_STATUS_RESPONSE_BYTES)
            .map_err(|err| StatusError::Json(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| StatusError::Json(format!("{err}: {body}")))
    }

    /// `POST /api/cancel-training/{model_id}`: request cancellation. Success
    /// here does not assert the cancelled state; the next status snapshot
    /// confirms it.
    pub fn cancel_training(&self, job_id: &JobId) -> Result<(), CancelRequestError> {
        let url = self.endpoint(&format!("/api/cancel-training/{job_id}"));
        let ack = self
            .post_for_ack(&url)
            .map_err(|(transport, message)| {
                if transport {
                    CancelRequestError::Transport(message)
                } else {
                    CancelRequestError::Json(message)
                }
            })?;
        if ack.success {
            Ok(())
        } else {
            Err(CancelRequestError::Rejected(ack.message.unwrap_or_else(
                || "Training job could not be cancelled".to_string(),
            )))
        }
    }

    /// `POST /api/save_trained_model/{model_id}`: persist a completed model.
    pub fn save_trained_model(&self, draft: &TrainedModelDraft) -> Result<(), SaveError> {
        let url = self.endpoint(&format!("/api/save_trained_model/{}", draft.model_id));
        let response = match http_client::agent()
            .post(&url)
            .set("Accept", "application/json")
            .send_json(draft)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = read_ack_body(response);
                return Err(SaveError::Rejected(format!("HTTP {code}: {body}")));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(SaveError::Transport(err.to_string()));
            }
        };
        let body = http_client::read_body_limited(response, MAX_ACK_RESPONSE_BYTES)
            .map_err(|err| SaveError::Json(err.to_string()))?;
        let ack: AckWire =
            serde_json::from_str(&body).map_err(|err| SaveError::Json(format!("{err}: {body}")))?;
        if ack.success {
            Ok(())
        } else {
            Err(SaveError::Rejected(ack.message.unwrap_or_else(|| {
                "Trained model could not be saved".to_string()
            })))
        }
    }

    /// POST with no body and parse a `{success, message}` acknowledgement.
    /// Errors come back as `(is_transport, message)`.
    fn post_for_ack(&self, url: &str) -> Result<AckWire, (bool, String)> {
        let response = match http_client::agent().post(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = read_ack_body(response);
                return Err((true, format!("HTTP {code}: {body}")));
            }
            Err(ureq::Error::Transport(err)) => return Err((true, err.to_string())),
        };
        let body = http_client::read_body_limited(response, MAX_ACK_RESPONSE_BYTES)
            .map_err(|err| (false, err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| (false, format!("{err}: {body}")))
    }
}

fn job_id_from_value(value: Option<serde_json::Value>) -> Option<JobId> {
    match value? {
        serde_json::Value::String(id) if !id.trim().is_empty() => Some(id),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn read_ack_body(response: ureq::Response) -> String {
    http_client::read_body_limited(response, MAX_ACK_RESPONSE_BYTES).unwrap_or_else(|err| err.to_string())
}
