use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use smc_signal::{AnalysisPipeline, FeatureExtractor, LocalChartClassifier, Settings};

/// Two chart uploads plus multipart overhead
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Application state shared across handlers
pub struct AppState {
    pub pipeline: AnalysisPipeline,
    /// Serves POST /classify regardless of where the pipeline classifies
    pub local_classifier: LocalChartClassifier,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;

    // Initialize logging
    let level = settings.server.log_level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("Starting SMC Signal Service...");

    let pipeline = AnalysisPipeline::from_settings(&settings);
    let mut local_classifier =
        LocalChartClassifier::new(FeatureExtractor::new(settings.features.max_samples));
    if let Some(seed) = settings.pipeline.seed {
        local_classifier = local_classifier.with_seed(seed);
    }

    match pipeline.market_data().provider_name() {
        Some(name) => info!("✓ Quote provider: {}", name),
        None => info!("⚠ No quote provider, serving fallback prices"),
    }

    let state = Arc::new(AppState {
        pipeline,
        local_classifier,
    });

    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", settings.server.port)).await?;
    info!("🚀 SMC Signal Service listening on port {}", settings.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build router
fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/analyze", post(handlers::analyze))
        .route("/classify", post(handlers::classify))
        .route("/live-price", post(handlers::live_price))
        .route("/health", get(handlers::health_check))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

mod handlers;
