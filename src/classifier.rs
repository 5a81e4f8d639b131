//! Chart pattern classification
//!
//! The "CNN" here is a fixed arithmetic rule over three pixel statistics, not a
//! trained model. [`PatternClassifier`] is the seam where a real model would
//! plug in; [`ChartClassifier`] covers the two-image call, served either in
//! process or by a remote endpoint.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::features::FeatureExtractor;
use crate::preprocessor::decode;
use crate::rng::uniform;
use crate::types::{
    round_to, Bias, CombinedPrediction, ImageFeatures, Prediction, PredictionFeatures,
    PredictionSource, Result, SignalError,
};

/// Trend strength above which a label can leave neutral
pub const TREND_THRESHOLD: f64 = 0.65;
pub const BULLISH_MOMENTUM: f64 = 0.6;
pub const BEARISH_MOMENTUM: f64 = 0.5;
/// Volatility below which the structure is reported as clean
pub const CLEAN_VOLATILITY: f64 = 0.5;
/// Trend strength earning the confidence bonus
pub const STRONG_TREND: f64 = 0.7;
pub const CONFIDENCE_BONUS: f64 = 0.05;
pub const MAX_CONFIDENCE: f64 = 0.95;
/// Weight of the higher timeframe in the overall confidence
pub const HIGHER_WEIGHT: f64 = 0.6;
pub const LOWER_WEIGHT: f64 = 0.4;

const FALLBACK_TAGS: [&str; 4] = [
    "Higher Highs",
    "Order Block Formation",
    "Liquidity Sweep",
    "BOS Detected",
];

/// Maps image features to a labelled prediction
pub trait PatternClassifier: Send + Sync {
    fn classify(&self, features: &ImageFeatures, rng: &mut dyn RngCore) -> Prediction;

    fn name(&self) -> &str;
}

/// Threshold rule over contrast, complexity and brightness
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedClassifier;

impl PatternClassifier for RuleBasedClassifier {
    fn classify(&self, features: &ImageFeatures, rng: &mut dyn RngCore) -> Prediction {
        let trend_strength = 0.7 * features.contrast + 0.3 * features.complexity;
        let volatility = features.complexity;
        // Placeholder for a learned momentum estimate
        let momentum = if features.brightness > 0.5 {
            uniform(rng, 0.6, 0.9)
        } else {
            uniform(rng, 0.4, 0.7)
        };

        let pattern = label_for(trend_strength, momentum);
        let tags = tags_for(pattern, volatility);

        let bonus = if trend_strength > STRONG_TREND { CONFIDENCE_BONUS } else { 0.0 };
        let confidence = (uniform(rng, 0.72, 0.90) + bonus).min(MAX_CONFIDENCE);

        Prediction {
            pattern,
            confidence,
            tags,
            features: PredictionFeatures {
                trend_strength: round_to(trend_strength, 3),
                volatility: round_to(volatility, 3),
                momentum: round_to(momentum, 3),
            },
        }
    }

    fn name(&self) -> &str {
        "rule_based"
    }
}

/// Label rule shared by the classifier and the structure detector's fallback
pub fn label_for(trend_strength: f64, momentum: f64) -> Bias {
    if trend_strength > TREND_THRESHOLD && momentum > BULLISH_MOMENTUM {
        Bias::Bullish
    } else if trend_strength > TREND_THRESHOLD && momentum <= BEARISH_MOMENTUM {
        Bias::Bearish
    } else {
        Bias::Neutral
    }
}

pub fn tags_for(pattern: Bias, volatility: f64) -> Vec<String> {
    let clean = volatility < CLEAN_VOLATILITY;
    let tags: &[&str] = match (pattern, clean) {
        (Bias::Bullish, true) => &["Higher Highs Detected", "Bullish Order Block", "Clean Market Structure"],
        (Bias::Bullish, false) => &["Higher Highs Detected", "Bullish Order Block"],
        (Bias::Bearish, true) => &["Lower Lows Detected", "Bearish Supply Zone", "Strong Downtrend"],
        (Bias::Bearish, false) => &["Lower Lows Detected", "Bearish Supply Zone"],
        (Bias::Neutral, _) => &["Consolidation Range", "Balanced Structure"],
    };
    tags.iter().map(|t| t.to_string()).collect()
}

/// Reconcile the two timeframe labels; conflicting directions become neutral
pub fn combined_label(higher: Bias, lower: Bias) -> Bias {
    match (higher, lower) {
        (a, b) if a == b => a,
        (Bias::Neutral, other) | (other, Bias::Neutral) => other,
        _ => Bias::Neutral,
    }
}

/// Combine per-timeframe predictions. Argument order matters for confidence:
/// the first is always the higher timeframe.
pub fn combine(higher: Prediction, lower: Prediction, source: PredictionSource) -> CombinedPrediction {
    let combined_signal = combined_label(higher.pattern, lower.pattern);
    let overall_confidence =
        round_to(HIGHER_WEIGHT * higher.confidence + LOWER_WEIGHT * lower.confidence, 3);

    CombinedPrediction {
        higher,
        lower,
        combined_signal,
        overall_confidence,
        source,
    }
}

/// Self-contained prediction used when no classifier answered
pub fn fallback_prediction<R: Rng + ?Sized>(rng: &mut R) -> CombinedPrediction {
    let roll = rng.gen::<f64>();
    let pattern = if roll > 0.6 {
        Bias::Bullish
    } else if roll < 0.4 {
        Bias::Bearish
    } else {
        Bias::Neutral
    };

    let confidence = uniform(rng, 0.75, 0.95);

    let higher = Prediction {
        pattern,
        confidence,
        tags: vec![fallback_tag(rng)],
        features: PredictionFeatures {
            trend_strength: uniform(rng, 0.6, 0.9),
            volatility: uniform(rng, 0.4, 0.7),
            momentum: uniform(rng, 0.5, 0.9),
        },
    };
    let lower = Prediction {
        pattern,
        confidence: confidence - 0.05,
        tags: vec![fallback_tag(rng)],
        features: PredictionFeatures {
            trend_strength: uniform(rng, 0.65, 0.9),
            volatility: uniform(rng, 0.45, 0.75),
            momentum: uniform(rng, 0.55, 0.9),
        },
    };

    CombinedPrediction {
        higher,
        lower,
        combined_signal: pattern,
        overall_confidence: confidence,
        source: PredictionSource::Fallback,
    }
}

fn fallback_tag<R: Rng + ?Sized>(rng: &mut R) -> String {
    let idx = (uniform(rng, 0.0, FALLBACK_TAGS.len() as f64) as usize).min(FALLBACK_TAGS.len() - 1);
    FALLBACK_TAGS[idx].to_string()
}

/// Two-chart classification call
#[async_trait]
pub trait ChartClassifier: Send + Sync {
    /// Classify a higher- and lower-timeframe image pair
    async fn analyze_charts(&self, higher: &[u8], lower: &[u8]) -> Result<CombinedPrediction>;

    fn name(&self) -> &str;
}

/// In-process classifier: decode, extract features, apply the pattern rule
pub struct LocalChartClassifier {
    extractor: FeatureExtractor,
    model: Arc<dyn PatternClassifier>,
    seed: Option<u64>,
}

impl LocalChartClassifier {
    pub fn new(extractor: FeatureExtractor) -> Self {
        Self {
            extractor,
            model: Arc::new(RuleBasedClassifier),
            seed: None,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn PatternClassifier>) -> Self {
        self.model = model;
        self
    }

    /// Pin the per-call generator; every call then repeats the same draws
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn classify_pair(&self, higher: &[u8], lower: &[u8], rng: &mut dyn RngCore) -> Result<CombinedPrediction> {
        let higher_features = self.extractor.extract_image(&decode(higher)?);
        let lower_features = self.extractor.extract_image(&decode(lower)?);
        debug!(?higher_features, ?lower_features, "Extracted chart features");

        let higher = self.model.classify(&higher_features, rng);
        let lower = self.model.classify(&lower_features, rng);
        Ok(combine(higher, lower, PredictionSource::Local))
    }
}

#[async_trait]
impl ChartClassifier for LocalChartClassifier {
    async fn analyze_charts(&self, higher: &[u8], lower: &[u8]) -> Result<CombinedPrediction> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.classify_pair(higher, lower, &mut rng)
    }

    fn name(&self) -> &str {
        self.model.name()
    }
}

/// Classifier reached over HTTP (multipart `chart_4h` / `chart_15m`)
pub struct RemoteChartClassifier {
    client: Client,
    endpoint: String,
}

impl RemoteChartClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SignalError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ChartClassifier for RemoteChartClassifier {
    async fn analyze_charts(&self, higher: &[u8], lower: &[u8]) -> Result<CombinedPrediction> {
        let part = |bytes: &[u8], name: &'static str| {
            Part::bytes(bytes.to_vec())
                .file_name(name)
                .mime_str("image/jpeg")
                .map_err(|e| SignalError::Classifier(e.to_string()))
        };
        let form = Form::new()
            .part("chart_4h", part(higher, "chart-4h.jpg")?)
            .part("chart_15m", part(lower, "chart-15m.jpg")?);

        debug!("Posting charts to classifier at {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SignalError::Classifier(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SignalError::Classifier(format!("{} - {}", status, text)));
        }

        let mut prediction: CombinedPrediction = response
            .json()
            .await
            .map_err(|e| SignalError::Classifier(format!("Invalid response: {}", e)))?;
        prediction.source = PredictionSource::Remote;

        Ok(prediction)
    }

    fn name(&self) -> &str {
        "remote"
    }
}

/// Classify, substituting [`fallback_prediction`] on any failure
pub async fn classify_or_fallback<R: Rng + ?Sized + Send>(
    classifier: &dyn ChartClassifier,
    higher: &[u8],
    lower: &[u8],
    rng: &mut R,
) -> CombinedPrediction {
    match classifier.analyze_charts(higher, lower).await {
        Ok(prediction) => {
            info!(
                "Classifier {} -> {} ({:.3})",
                classifier.name(),
                prediction.combined_signal,
                prediction.overall_confidence
            );
            prediction
        }
        Err(e) => {
            warn!("Classifier {} unavailable, using fallback prediction: {}", classifier.name(), e);
            fallback_prediction(rng)
        }
    }
}
