//! Training request parameters and the submittable invariant.

use serde::{Deserialize, Serialize};

/// Default epoch count when the caller does not specify one.
pub const DEFAULT_EPOCHS: u32 = 100;
/// Default batch size.
pub const DEFAULT_BATCH_SIZE: u32 = 16;
/// Default training image size.
pub const DEFAULT_IMAGE_SIZE: u32 = 640;
/// Default learning rate.
pub const DEFAULT_LEARNING_RATE: f64 = 0.001;

/// User-supplied parameters for one training run.
///
/// Serializes to the `POST /api/train-model` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub model_name: String,
    pub model_type: String,
    pub version: String,
    #[serde(default = "default_epochs")]
    pub epochs: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Identifiers of the labeled samples selected as training input.
    #[serde(default)]
    pub template_ids: Vec<String>,
}

fn default_epochs() -> u32 {
    DEFAULT_EPOCHS
}

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

fn default_image_size() -> u32 {
    DEFAULT_IMAGE_SIZE
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

impl TrainingRequest {
    /// Build a request with default hyperparameters.
    pub fn new(
        model_name: impl Into<String>,
        model_type: impl Into<String>,
        version: impl Into<String>,
        template_ids: Vec<String>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            model_type: model_type.into(),
            version: version.into(),
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            image_size: DEFAULT_IMAGE_SIZE,
            learning_rate: DEFAULT_LEARNING_RATE,
            template_ids,
        }
    }

    /// Check the submittable invariant: all required fields non-empty and at
    /// least one template selected.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.model_name.trim().is_empty() {
            return Err(ValidationError::EmptyModelName);
        }
        if self.model_type.trim().is_empty() {
            return Err(ValidationError::EmptyModelType);
        }
        if self.version.trim().is_empty() {
            return Err(ValidationError::EmptyVersion);
        }
        if self.epochs == 0 {
            return Err(ValidationError::ZeroEpochs);
        }
        if self.batch_size == 0 {
            return Err(ValidationError::ZeroBatchSize);
        }
        if self.image_size == 0 {
            return Err(ValidationError::ZeroImageSize);
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ValidationError::InvalidLearningRate);
        }
        if self.template_ids.is_empty() {
            return Err(ValidationError::NoTemplates);
        }
        Ok(())
    }
}

/// A request that violates the submittable invariant. Reported inline; no
/// network call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Model name must not be empty")]
    EmptyModelName,
    #[error("Model type must not be empty")]
    EmptyModelType,
    #[error("Version must not be empty")]
    EmptyVersion,
    #[error("Epoch count must be positive")]
    ZeroEpochs,
    #[error("Batch size must be positive")]
    ZeroBatchSize,
    #[error("Image size must be positive")]
    ZeroImageSize,
    #[error("Learning rate must be a positive number")]
    InvalidLearningRate,
    #[error("At least one training template must be selected")]
    NoTemplates,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> TrainingRequest {
        TrainingRequest::new("fraud-detector", "FraudDetection", "v1", vec!["7".into()])
    }

    #[test]
    fn valid_request_passes() {
        assert_eq!(valid_request().validate(), Ok(()));
    }

    #[test]
    fn blank_required_fields_are_rejected() {
        let mut request = valid_request();
        request.model_name = "  ".to_string();
        assert_eq!(request.validate(), Err(ValidationError::EmptyModelName));

        let mut request = valid_request();
        request.model_type = String::new();
        assert_eq!(request.validate(), Err(ValidationError::EmptyModelType));

        let mut request = valid_request();
        request.version = String::new();
        assert_eq!(request.validate(), Err(ValidationError::EmptyVersion));
    }

    #[test]
    fn empty_template_selection_is_rejected() {
        let mut request = valid_request();
        request.template_ids.clear();
        assert_eq!(request.validate(), Err(ValidationError::NoTemplates));
    }

    #[test]
    fn non_positive_hyperparameters_are_rejected() {
        let mut request = valid_request();
        request.epochs = 0;
        assert_eq!(request.validate(), Err(ValidationError::ZeroEpochs));

        let mut request = valid_request();
        request.learning_rate = 0.0;
        assert_eq!(
            request.validate(),
            Err(ValidationError::InvalidLearningRate)
        );
    }

    #[test]
    fn toml_fills_in_default_hyperparameters() {
        let request: TrainingRequest = toml::from_str(
            r#"
            model_name = "fraud-detector"
            model_type = "FraudDetection"
            version = "v2"
            template_ids = ["3", "5"]
            "#,
        )
        .unwrap();
        assert_eq!(request.epochs, DEFAULT_EPOCHS);
        assert_eq!(request.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(request.image_size, DEFAULT_IMAGE_SIZE);
        assert_eq!(request.learning_rate, DEFAULT_LEARNING_RATE);
    }

    #[test]
    fn serializes_wire_field_names() {
        let json = serde_json::to_value(valid_request()).unwrap();
        assert_eq!(json["model_name"], "fraud-detector");
        assert_eq!(json["batch_size"], 16);
        assert_eq!(json["image_size"], 640);
        assert_eq!(json["template_ids"][0], "7");
    }
}
