use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{validation_error, AppError, ClassifierError},
    features::{FeatureVector, FEATURE_COUNT},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Prediction {
    NotSpam,
    Spam,
}

impl Prediction {
    pub fn from_class(class: u8) -> Self {
        if class == 1 {
            Prediction::Spam
        } else {
            Prediction::NotSpam
        }
    }

    pub fn class(&self) -> u8 {
        match self {
            Prediction::NotSpam => 0,
            Prediction::Spam => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Prediction::NotSpam => "No Spam",
            Prediction::Spam => "Spam",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Probabilities {
    pub spam_probability: f64,
    pub not_spam_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub prediction: Prediction,
    /// Probability of the predicted class.
    pub confidence: f64,
    pub spam_probability: f64,
    pub not_spam_probability: f64,
}

impl ClassificationResult {
    pub fn probabilities(&self) -> Probabilities {
        Probabilities {
            spam_probability: self.spam_probability,
            not_spam_probability: self.not_spam_probability,
        }
    }
}

/// What the predict endpoint was asked to classify.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictInput {
    /// `email_text`; `None` when the key held JSON null.
    Text(Option<String>),
    Features(Vec<f64>),
}

impl TryFrom<Value> for PredictInput {
    type Error = AppError;

    fn try_from(body: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut map) = body else {
            return Err(validation_error("Either \"email_text\" or \"features\" is required"));
        };

        if let Some(text) = map.remove("email_text") {
            return match text {
                Value::String(s) => Ok(PredictInput::Text(Some(s))),
                Value::Null => Ok(PredictInput::Text(None)),
                _ => Err(validation_error("\"email_text\" must be a string")),
            };
        }

        let Some(features) = map.remove("features") else {
            return Err(validation_error("Either \"email_text\" or \"features\" is required"));
        };

        let Value::Array(values) = features else {
            return Err(validation_error("Features must be an array"));
        };

        if values.len() != FEATURE_COUNT {
            return Err(validation_error(format!(
                "Expected {} features, received {}",
                FEATURE_COUNT,
                values.len()
            )));
        }

        let features = values
            .iter()
            .enumerate()
            .map(|(idx, v)| {
                v.as_f64().ok_or_else(|| {
                    ClassifierError::InvalidFeatures(format!(
                        "feature {} is not a number: {}",
                        idx, v
                    ))
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        Ok(PredictInput::Features(features))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub prediction: u8,
    pub label: String,
    pub confidence: f64,
    pub probabilities: Probabilities,
    pub extracted_features: Option<FeatureVector>,
}

impl PredictResponse {
    pub fn new(result: ClassificationResult, extracted_features: Option<FeatureVector>) -> Self {
        Self {
            success: true,
            prediction: result.prediction.class(),
            label: result.prediction.label().to_string(),
            confidence: result.confidence,
            probabilities: result.probabilities(),
            extracted_features,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub model_loaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AboutResponse {
    pub app: String,
    pub version: String,
    pub model: String,
    pub model_format: Option<String>,
    pub scaler_format: Option<String>,
    pub model_sha256: Option<String>,
    pub scaler_sha256: Option<String>,
}
