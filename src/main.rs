use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spambase_engine::{
    config::Config,
    routes::{self, AppState},
    ClassifierService, SharedClassifier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "spambase_engine=info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("Loaded configuration: {:?}", config);

    if config.metrics_enabled {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(config.metrics_addr())
            .install()
            .context("failed to install Prometheus exporter")?;
        info!("Prometheus metrics on {}", config.metrics_addr());
    }

    let classifier = if config.lazy_model_load {
        info!("Model loading deferred to first request");
        SharedClassifier::from_paths(config.model_path.clone(), config.scaler_path.clone())
    } else {
        let (model_path, scaler_path) = (config.model_path.clone(), config.scaler_path.clone());
        let service = tokio::task::spawn_blocking(move || {
            ClassifierService::load(&model_path, &scaler_path)
        })
        .await?;
        SharedClassifier::ready(service)
    };

    let app = routes::router(AppState::new(classifier));

    let addr = config.bind_addr();
    info!("Starting spam classifier on {}", addr);
    info!("Predict endpoint: http://{}/api/predict", addr);
    info!("Health check: http://{}/api/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Shutdown signal received, starting graceful shutdown");
}
