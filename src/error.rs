use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::{fmt, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Model,
    Scaler,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Model => write!(f, "model"),
            ArtifactKind::Scaler => write!(f, "scaler"),
        }
    }
}

/// Failures of the classification core.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("{kind} artifact not found: {}", .path.display())]
    ArtifactMissing { kind: ArtifactKind, path: PathBuf },

    #[error("{kind} artifact {} is corrupt: {reason}", .path.display())]
    ArtifactCorrupt {
        kind: ArtifactKind,
        path: PathBuf,
        reason: String,
    },

    #[error("could not deserialize {kind} artifact {}: {}", .path.display(), .attempts.join("; "))]
    DeserializationFailed {
        kind: ArtifactKind,
        path: PathBuf,
        attempts: Vec<String>,
    },

    #[error("Model not loaded. Predictions are unavailable.")]
    ModelUnavailable,

    #[error("Invalid features: {0}")]
    InvalidFeatures(String),
}

impl ClassifierError {
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifierError::ArtifactMissing { .. } => "artifact_missing",
            ClassifierError::ArtifactCorrupt { .. } => "artifact_corrupt",
            ClassifierError::DeserializationFailed { .. } => "deserialization_failed",
            ClassifierError::ModelUnavailable => "model_unavailable",
            ClassifierError::InvalidFeatures(_) => "invalid_features",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Classifier(e) => e.kind(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Validation(_) | AppError::Classifier(ClassifierError::InvalidFeatures(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::Classifier(ClassifierError::ModelUnavailable) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            _ => {
                tracing::error!("Internal server error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (validation_error("bad"), StatusCode::BAD_REQUEST),
            (
                AppError::from(ClassifierError::InvalidFeatures("NaN".into())),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::from(ClassifierError::ModelUnavailable), StatusCode::SERVICE_UNAVAILABLE),
            (
                AppError::from(ClassifierError::ArtifactMissing {
                    kind: ArtifactKind::Model,
                    path: PathBuf::from("/srv/model.json"),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_server_errors_hide_details() {
        let err = AppError::from(ClassifierError::ArtifactCorrupt {
            kind: ArtifactKind::Scaler,
            path: PathBuf::from("/srv/scaler.json"),
            reason: "wrong width".into(),
        });
        assert_eq!(err.kind(), "artifact_corrupt");

        let bytes = axum::body::to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["status"], 500);
    }

    #[test]
    fn test_messages_are_human_readable() {
        let err = ClassifierError::DeserializationFailed {
            kind: ArtifactKind::Scaler,
            path: PathBuf::from("scaler.json"),
            attempts: vec!["json: eof".into(), "bincode: eof".into()],
        };
        assert_eq!(
            err.to_string(),
            "could not deserialize scaler artifact scaler.json: json: eof; bincode: eof"
        );
        assert_eq!(err.kind(), "deserialization_failed");
    }
}
