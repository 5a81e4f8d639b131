use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Decimal places used for every emitted price
pub const PRICE_DECIMALS: u32 = 5;

/// Directional classification shared by predictions, structure and signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl Bias {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bias::Bullish => "bullish",
            Bias::Bearish => "bearish",
            Bias::Neutral => "neutral",
        }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, Bias::Neutral)
    }
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated vertical price range of a chart image.
///
/// Synthetic: not read from the price axis. Only `min < max` is guaranteed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceScale {
    pub min: f64,
    pub max: f64,
}

impl PriceScale {
    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    pub fn mid(&self) -> f64 {
        self.min + self.range() / 2.0
    }
}

/// Metadata derived from one uploaded chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInfo {
    pub instrument_symbol: String,
    pub timeframe_label: String,
    pub price_scale: PriceScale,
}

/// Scalar pixel statistics, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageFeatures {
    pub brightness: f64,
    pub contrast: f64,
    pub complexity: f64,
}

/// Derived trio reported alongside a prediction, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionFeatures {
    pub trend_strength: f64,
    pub volatility: f64,
    pub momentum: f64,
}

/// Per-image classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub pattern: Bias,
    pub confidence: f64,
    pub tags: Vec<String>,
    pub features: PredictionFeatures,
}

/// Where a combined prediction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSource {
    Remote,
    #[default]
    Local,
    Fallback,
}

/// Higher/lower timeframe predictions reconciled into one label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedPrediction {
    pub higher: Prediction,
    pub lower: Prediction,
    pub combined_signal: Bias,
    pub overall_confidence: f64,
    #[serde(default)]
    pub source: PredictionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ZoneKind {
    OrderBlock,
    LiquidityZone,
    DemandZone,
    SupplyZone,
}

/// Heuristically placed price band. `price_start <= price_end` always.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub kind: ZoneKind,
    pub price_start: f64,
    pub price_end: f64,
    pub strength: f64,
    pub timeframe_label: String,
}

/// Trend plus swing levels. Only the sequence matching `trend` is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStructure {
    pub trend: Bias,
    pub last_break_of_structure: Option<f64>,
    pub last_change_of_character: Option<f64>,
    pub higher_highs: Vec<f64>,
    pub lower_lows: Vec<f64>,
}

/// Provenance of a quoted price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Live,
    Simulated,
}

/// Live-price payload returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePrice {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub source: PriceSource,
}

/// Whether a signal was built on live or substituted data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub price: PriceSource,
    pub classifier: PredictionSource,
}

impl Provenance {
    pub fn is_simulated(&self) -> bool {
        self.price == PriceSource::Simulated || self.classifier == PredictionSource::Fallback
    }
}

/// Final output of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingSignal {
    pub id: Uuid,
    pub instrument_symbol: String,
    pub bias: Bias,
    pub entry_start: f64,
    pub entry_end: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub live_price: f64,
    /// 0-100, one decimal
    pub confidence: f64,
    pub rationale: String,
    pub zones: Vec<Zone>,
    pub market_structure: MarketStructure,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

/// Everything the pipeline produced for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub detected_higher: ChartInfo,
    pub detected_lower: ChartInfo,
    pub prediction: CombinedPrediction,
    pub signal: TradingSignal,
    pub processing_time_ms: u64,
}

/// Error types for chart analysis
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("Missing chart image: {0}")]
    MissingChart(String),

    #[error("Symbol is required")]
    MissingSymbol,

    #[error("Invalid chart image: {0}")]
    InvalidImage(String),

    #[error("Classifier request failed: {0}")]
    Classifier(String),

    #[error("Price feed request failed: {0}")]
    PriceFeed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, SignalError>;

/// Round to `dp` decimal places, midpoint away from zero
pub fn round_to(value: f64, dp: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// Round a monetary value to [`PRICE_DECIMALS`]
pub fn round_price(value: f64) -> f64 {
    round_to(value, PRICE_DECIMALS)
}
