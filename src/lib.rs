//! Chart-to-signal analysis
//!
//! Turns a higher- and lower-timeframe chart screenshot into a trading signal
//! (bias, entry band, stop-loss, take-profit, confidence, rationale). The
//! numeric detections are heuristics over pixel statistics and filename
//! metadata; they are deterministic given a seeded generator and degrade to
//! documented fallbacks when the classifier or the price feed is unavailable.

pub mod types;
pub mod config;
pub mod rng;
pub mod preprocessor;
pub mod features;
pub mod classifier;
pub mod market_data;
pub mod zones;
pub mod structure;
pub mod synthesizer;
pub mod pipeline;

pub use types::*;
pub use classifier::{ChartClassifier, LocalChartClassifier, PatternClassifier, RemoteChartClassifier, RuleBasedClassifier};
pub use config::Settings;
pub use features::FeatureExtractor;
pub use market_data::{MarketDataFetcher, QuoteProvider, TwelveDataClient};
pub use pipeline::{AnalysisPipeline, AnalysisRequest, ChartUpload};
pub use preprocessor::ChartPreprocessor;
