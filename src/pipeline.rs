//! End-to-end analysis run
//!
//! preprocess -> normalize -> (classifier || live price) -> zones -> structure
//! -> synthesize. Only input validation can fail a run; the two network-backed
//! stages always resolve to a value before synthesis starts.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::classifier::{classify_or_fallback, ChartClassifier, LocalChartClassifier, RemoteChartClassifier};
use crate::config::Settings;
use crate::features::FeatureExtractor;
use crate::market_data::MarketDataFetcher;
use crate::preprocessor::{reconcile, ChartPreprocessor};
use crate::rng::run_rng;
use crate::structure::detect_structure;
use crate::synthesizer::{synthesize, SynthesisInput};
use crate::types::{AnalysisResult, Result, SignalError};
use crate::zones::{liquidity_zones, order_blocks, supply_demand};

pub const HIGHER_TIMEFRAME: &str = "4H";
pub const LOWER_TIMEFRAME: &str = "15M";

/// One uploaded chart
#[derive(Debug, Clone)]
pub struct ChartUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ChartUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// Higher- and lower-timeframe charts for one analysis
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub higher: Option<ChartUpload>,
    pub lower: Option<ChartUpload>,
}

/// Stateless across runs; safe to share behind an `Arc`
pub struct AnalysisPipeline {
    preprocessor: ChartPreprocessor,
    classifier: Arc<dyn ChartClassifier>,
    market_data: MarketDataFetcher,
    seed: Option<u64>,
}

impl AnalysisPipeline {
    pub fn new(
        preprocessor: ChartPreprocessor,
        classifier: Arc<dyn ChartClassifier>,
        market_data: MarketDataFetcher,
    ) -> Self {
        Self {
            preprocessor,
            classifier,
            market_data,
            seed: None,
        }
    }

    /// Wire every stage from settings. A configured seed pins the local
    /// classifier's draws as well as the pipeline's own.
    pub fn from_settings(settings: &Settings) -> Self {
        let seed = settings.pipeline.seed;
        let local = || {
            let classifier = LocalChartClassifier::new(FeatureExtractor::new(settings.features.max_samples));
            match seed {
                Some(seed) => classifier.with_seed(seed),
                None => classifier,
            }
        };

        let classifier: Arc<dyn ChartClassifier> = match &settings.classifier.endpoint {
            Some(endpoint) if !endpoint.is_empty() => {
                match RemoteChartClassifier::new(
                    endpoint.clone(),
                    Duration::from_secs(settings.classifier.timeout_secs),
                ) {
                    Ok(remote) => {
                        info!("✓ Remote classifier at {}", endpoint);
                        Arc::new(remote)
                    }
                    Err(e) => {
                        warn!("⚠ Remote classifier unavailable ({}), using local rule", e);
                        Arc::new(local())
                    }
                }
            }
            _ => {
                info!("✓ Local rule-based classifier");
                Arc::new(local())
            }
        };

        let mut pipeline = Self::new(
            ChartPreprocessor::new(settings.preprocess),
            classifier,
            MarketDataFetcher::from_config(&settings.market_data),
        );
        pipeline.seed = seed;
        pipeline
    }

    /// Reproducible runs: every run draws from a generator seeded with `seed`
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn market_data(&self) -> &MarketDataFetcher {
        &self.market_data
    }

    pub fn classifier(&self) -> &Arc<dyn ChartClassifier> {
        &self.classifier
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        let started = Instant::now();

        let higher_upload = require(request.higher, HIGHER_TIMEFRAME)?;
        let lower_upload = require(request.lower, LOWER_TIMEFRAME)?;

        let mut rng = run_rng(self.seed);

        let detected_higher = self.preprocessor.process(
            &higher_upload.bytes,
            &higher_upload.filename,
            HIGHER_TIMEFRAME,
            &mut rng,
        )?;
        let lower_info = self.preprocessor.process(
            &lower_upload.bytes,
            &lower_upload.filename,
            LOWER_TIMEFRAME,
            &mut rng,
        )?;
        let detected_lower = reconcile(&detected_higher, &lower_info);

        let normalized_higher = self.preprocessor.normalize(&higher_upload.bytes)?;
        let normalized_lower = self.preprocessor.normalize(&lower_upload.bytes)?;

        let symbol = detected_higher.instrument_symbol.clone();
        info!("Analyzing {} ({} + {})", symbol, HIGHER_TIMEFRAME, LOWER_TIMEFRAME);

        let (prediction, live) = tokio::join!(
            classify_or_fallback(
                self.classifier.as_ref(),
                &normalized_higher,
                &normalized_lower,
                &mut rng,
            ),
            self.market_data.get_live_price(&symbol),
        );

        let higher_tf = detected_higher.timeframe_label.as_str();
        let lower_tf = detected_lower.timeframe_label.as_str();

        let mut zones = order_blocks(&detected_higher, higher_tf, &mut rng);
        zones.extend(order_blocks(&detected_lower, lower_tf, &mut rng));
        zones.extend(liquidity_zones(&detected_higher, higher_tf));
        zones.extend(supply_demand(&detected_higher, higher_tf, &mut rng));
        zones.extend(supply_demand(&detected_lower, lower_tf, &mut rng));

        let structure = detect_structure(&detected_higher, Some(&prediction), &mut rng);

        let signal = synthesize(
            SynthesisInput {
                higher: &detected_higher,
                zones,
                structure,
                live_price: live.price,
                price_source: live.source,
                prediction: Some(&prediction),
            },
            &mut rng,
        );

        let processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "Signal {} for {}: {} entry {:.5}-{:.5} confidence {:.1} ({} ms)",
            signal.id,
            signal.instrument_symbol,
            signal.bias,
            signal.entry_start,
            signal.entry_end,
            signal.confidence,
            processing_time_ms
        );
        if signal.provenance.is_simulated() {
            warn!("Signal {} built on substituted data: {:?}", signal.id, signal.provenance);
        }

        Ok(AnalysisResult {
            detected_higher,
            detected_lower,
            prediction,
            signal,
            processing_time_ms,
        })
    }
}

fn require(upload: Option<ChartUpload>, timeframe: &str) -> Result<ChartUpload> {
    match upload {
        Some(u) if !u.bytes.is_empty() => Ok(u),
        _ => Err(SignalError::MissingChart(format!("{} chart is required", timeframe))),
    }
}
