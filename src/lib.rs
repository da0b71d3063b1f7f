pub mod artifacts;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod models;
pub mod routes;
pub mod types;

pub use engine::{ClassifierService, SharedClassifier};
pub use error::{AppError, ClassifierError};
pub use features::{FeatureExtractor, FeatureVector};
