use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::AppState;
use smc_signal::{
    pipeline::{HIGHER_TIMEFRAME, LOWER_TIMEFRAME},
    AnalysisRequest, AnalysisResult, ChartClassifier, ChartUpload, CombinedPrediction, LivePrice, SignalError,
};

type ApiError = (StatusCode, String);

fn status_for(e: &SignalError) -> StatusCode {
    match e {
        SignalError::MissingChart(_) | SignalError::MissingSymbol | SignalError::InvalidImage(_) => {
            StatusCode::BAD_REQUEST
        }
        SignalError::Classifier(_) | SignalError::PriceFeed(_) => StatusCode::SERVICE_UNAVAILABLE,
        SignalError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(e: SignalError) -> ApiError {
    warn!("Request rejected: {}", e);
    (status_for(&e), e.to_string())
}

/// Pull `chart_4h` / `chart_15m` file parts out of a multipart body
async fn read_charts(mut multipart: Multipart) -> Result<AnalysisRequest, ApiError> {
    let mut request = AnalysisRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().unwrap_or(&name).to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

        match name.as_str() {
            "chart_4h" => request.higher = Some(ChartUpload::new(filename, bytes.to_vec())),
            "chart_15m" => request.lower = Some(ChartUpload::new(filename, bytes.to_vec())),
            other => warn!("Ignoring unexpected multipart field {}", other),
        }
    }

    Ok(request)
}

/// POST /analyze - full pipeline over two uploaded charts
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<AnalysisResult>, ApiError> {
    let request = read_charts(multipart).await?;
    let result = state.pipeline.analyze(request).await.map_err(reject)?;
    Ok(Json(result))
}

/// POST /classify - classifier endpoint over two uploaded charts
pub async fn classify(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<CombinedPrediction>, ApiError> {
    let request = read_charts(multipart).await?;

    let higher = request
        .higher
        .filter(|c| !c.bytes.is_empty())
        .ok_or_else(|| reject(SignalError::MissingChart(format!("{} chart is required", HIGHER_TIMEFRAME))))?;
    let lower = request
        .lower
        .filter(|c| !c.bytes.is_empty())
        .ok_or_else(|| reject(SignalError::MissingChart(format!("{} chart is required", LOWER_TIMEFRAME))))?;

    let prediction = state
        .local_classifier
        .analyze_charts(&higher.bytes, &lower.bytes)
        .await
        .map_err(reject)?;

    info!(
        "Classified {} / {}: {}",
        higher.filename, lower.filename, prediction.combined_signal
    );
    Ok(Json(prediction))
}

#[derive(Debug, serde::Deserialize)]
pub struct PriceRequest {
    #[serde(default)]
    symbol: String,
}

/// POST /live-price - reference price with provenance
pub async fn live_price(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PriceRequest>,
) -> Result<Json<LivePrice>, ApiError> {
    if req.symbol.trim().is_empty() {
        return Err(reject(SignalError::MissingSymbol));
    }
    Ok(Json(state.pipeline.market_data().get_live_price(&req.symbol).await))
}

/// GET /health - service health check
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        classifier: state.pipeline.classifier().name().to_string(),
        quote_provider: state
            .pipeline
            .market_data()
            .provider_name()
            .unwrap_or("fallback_table")
            .to_string(),
    })
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub classifier: String,
    pub quote_provider: String,
}
