use nalgebra::DVector;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::{
    artifacts::{load_artifact, ArtifactFormat, LoadedArtifact},
    error::{ArtifactKind, ClassifierError},
    features::{FeatureSource, FEATURE_COUNT},
    models::{argmax, FeatureScaler, SpamModel},
    types::{
        AboutResponse, ClassificationResult, HealthResponse, HealthStatus, PredictInput,
        PredictResponse, Prediction, Probabilities,
    },
};

const IN_MEMORY: &str = "<memory>";

struct LoadedPipeline {
    model: LoadedArtifact<SpamModel>,
    scaler: LoadedArtifact<FeatureScaler>,
}

/// Owns the trained model and scaler. Immutable once built; share it behind
/// an `Arc`. Without artifacts it runs degraded and every inference call
/// fails with [`ClassifierError::ModelUnavailable`].
pub struct ClassifierService {
    pipeline: Option<LoadedPipeline>,
}

impl ClassifierService {
    /// Load both artifacts. Never fails: any load error is logged and the
    /// service comes up degraded.
    pub fn load(model_path: &Path, scaler_path: &Path) -> Self {
        match Self::try_load(model_path, scaler_path) {
            Ok(service) => service,
            Err(e) => {
                error!("Failed to load model or scaler: {}", e);
                warn!("Starting without a model, predictions will fail until restart");
                Self::degraded()
            }
        }
    }

    pub fn try_load(model_path: &Path, scaler_path: &Path) -> Result<Self, ClassifierError> {
        let model = load_artifact(ArtifactKind::Model, model_path, SpamModel::validate)?;
        let scaler = load_artifact(ArtifactKind::Scaler, scaler_path, FeatureScaler::validate)?;

        info!(
            "Classifier ready: {} model, {} scaler",
            model.value.kind(),
            scaler.value.name()
        );

        Ok(Self {
            pipeline: Some(LoadedPipeline { model, scaler }),
        })
    }

    /// Build from in-memory parts, e.g. when embedding the engine.
    pub fn from_parts(model: SpamModel, scaler: FeatureScaler) -> Result<Self, ClassifierError> {
        let corrupt = |kind: ArtifactKind, reason: String| ClassifierError::ArtifactCorrupt {
            kind,
            path: PathBuf::from(IN_MEMORY),
            reason,
        };
        model.validate().map_err(|r| corrupt(ArtifactKind::Model, r))?;
        scaler.validate().map_err(|r| corrupt(ArtifactKind::Scaler, r))?;

        Ok(Self {
            pipeline: Some(LoadedPipeline {
                model: in_memory(model),
                scaler: in_memory(scaler),
            }),
        })
    }

    pub fn degraded() -> Self {
        Self { pipeline: None }
    }

    pub fn is_model_loaded(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn health(&self) -> HealthResponse {
        let model_loaded = self.is_model_loaded();
        HealthResponse {
            status: if model_loaded {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            model_loaded,
        }
    }

    pub fn describe(&self) -> AboutResponse {
        let pipeline = self.pipeline.as_ref();
        AboutResponse {
            app: "Spambase Spam Classifier".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            model: pipeline
                .map(|p| p.model.value.kind().to_string())
                .unwrap_or_else(|| "unavailable".to_string()),
            model_format: pipeline.map(|p| p.model.format.to_string()),
            scaler_format: pipeline.map(|p| p.scaler.format.to_string()),
            model_sha256: pipeline.map(|p| p.model.sha256.clone()),
            scaler_sha256: pipeline.map(|p| p.scaler.sha256.clone()),
        }
    }

    /// Class label for one feature row: 1 spam, 0 not spam.
    pub fn predict(&self, features: &[f64]) -> Result<u8, ClassifierError> {
        let proba = self.infer(features)?;
        Ok(argmax(proba))
    }

    pub fn predict_proba(&self, features: &[f64]) -> Result<Probabilities, ClassifierError> {
        let [not_spam, spam] = self.infer(features)?;
        Ok(Probabilities {
            spam_probability: spam,
            not_spam_probability: not_spam,
        })
    }

    /// Label, probabilities and confidence from a single scale + infer pass.
    pub fn classify(&self, features: &[f64]) -> Result<ClassificationResult, ClassifierError> {
        let proba = self.infer(features)?;
        let prediction = Prediction::from_class(argmax(proba));
        let [not_spam, spam] = proba;

        let confidence = match prediction {
            Prediction::Spam => spam,
            Prediction::NotSpam => not_spam,
        };

        Ok(ClassificationResult {
            prediction,
            confidence,
            spam_probability: spam,
            not_spam_probability: not_spam,
        })
    }

    /// Run a boundary-validated request end to end. Text goes through
    /// `extractor`; a feature array is classified as given.
    pub fn classify_input(
        &self,
        input: PredictInput,
        extractor: &dyn FeatureSource,
    ) -> Result<PredictResponse, ClassifierError> {
        match input {
            PredictInput::Text(text) => {
                let features = extractor.extract_optional(text.as_deref());
                let result = self.classify(features.as_slice())?;
                Ok(PredictResponse::new(result, Some(features)))
            }
            PredictInput::Features(values) => {
                let result = self.classify(&values)?;
                Ok(PredictResponse::new(result, None))
            }
        }
    }

    fn infer(&self, features: &[f64]) -> Result<[f64; 2], ClassifierError> {
        let pipeline = self.pipeline.as_ref().ok_or(ClassifierError::ModelUnavailable)?;

        if features.len() != FEATURE_COUNT {
            return Err(ClassifierError::InvalidFeatures(format!(
                "expected {} values, got {}",
                FEATURE_COUNT,
                features.len()
            )));
        }
        if let Some(idx) = features.iter().position(|v| !v.is_finite()) {
            return Err(ClassifierError::InvalidFeatures(format!(
                "feature {} is not a finite number",
                idx
            )));
        }

        let row = DVector::from_column_slice(features);
        let scaled = pipeline.scaler.value.transform(&row);
        if scaled.iter().any(|v| !v.is_finite()) {
            return Err(ClassifierError::InvalidFeatures(
                "scaled features are not finite".to_string(),
            ));
        }

        let proba = pipeline.model.value.predict_proba(&scaled);
        debug!("Inference: not_spam={:.4} spam={:.4}", proba[0], proba[1]);
        Ok(proba)
    }
}

fn in_memory<T>(value: T) -> LoadedArtifact<T> {
    LoadedArtifact {
        value,
        format: ArtifactFormat::Json,
        sha256: String::new(),
        path: PathBuf::from(IN_MEMORY),
    }
}

type Loader = Arc<dyn Fn() -> ClassifierService + Send + Sync>;

/// Initialize-once handle to the process-wide [`ClassifierService`].
///
/// The first caller runs the loader on the blocking pool; concurrent callers
/// wait on the same initialization and all observe the finished service.
pub struct SharedClassifier {
    cell: OnceCell<Arc<ClassifierService>>,
    loader: Loader,
}

impl SharedClassifier {
    pub fn from_paths(model_path: PathBuf, scaler_path: PathBuf) -> Self {
        Self::with_loader(move || ClassifierService::load(&model_path, &scaler_path))
    }

    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn() -> ClassifierService + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            loader: Arc::new(loader),
        }
    }

    /// Already-initialized handle.
    pub fn ready(service: ClassifierService) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Arc::new(service))),
            loader: Arc::new(ClassifierService::degraded),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get(&self) -> Arc<ClassifierService> {
        self.cell
            .get_or_init(|| async {
                let loader = Arc::clone(&self.loader);
                match tokio::task::spawn_blocking(move || loader()).await {
                    Ok(service) => Arc::new(service),
                    Err(e) => {
                        error!("Model loading task failed: {}", e);
                        Arc::new(ClassifierService::degraded())
                    }
                }
            })
            .await
            .clone()
    }
}
