//! Persisting a completed training run.
//!
//! Once the terminal event reports completion, the surrounding form unlocks
//! its save action: the draft below carries the output path, the chosen
//! accuracy, and the hyperparameters the job was started with.

use serde::Serialize;

use crate::training::monitor::JobId;
use crate::training::request::TrainingRequest;
use crate::training::snapshot::{JobPhase, StatusSnapshot};

/// Hyperparameters echoed back when saving a trained model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hyperparameters {
    pub epochs: u32,
    pub batch_size: u32,
    pub image_size: u32,
    pub learning_rate: f64,
}

/// Body of `POST /api/save_trained_model/{model_id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainedModelDraft {
    pub model_id: JobId,
    pub model_name: String,
    pub model_type: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub template_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
    /// Explicit accuracy, else the detection metric, else the fixed default.
    pub accuracy: f64,
    pub hyperparameters: Hyperparameters,
}

/// The session has not completed, so there is nothing to save.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Training has not completed (status: {status})")]
pub struct NotCompleted {
    pub status: String,
}

impl TrainedModelDraft {
    /// Assemble a draft from the original request and the final snapshot.
    pub fn from_completed(
        job_id: &JobId,
        request: &TrainingRequest,
        snapshot: &StatusSnapshot,
    ) -> Result<Self, NotCompleted> {
        if snapshot.phase() != JobPhase::Completed {
            return Err(NotCompleted {
                status: snapshot.status.clone(),
            });
        }
        Ok(Self {
            model_id: job_id.clone(),
            model_name: request.model_name.clone(),
            model_type: request.model_type.clone(),
            version: request.version.clone(),
            description: None,
            template_ids: request.template_ids.clone(),
            model_path: snapshot.model_path.clone(),
            accuracy: snapshot.accuracy_or_default(),
            hyperparameters: Hyperparameters {
                epochs: request.epochs,
                batch_size: request.batch_size,
                image_size: request.image_size,
                learning_rate: request.learning_rate,
            },
        })
    }
}
