//! Service configuration
//!
//! Layered: built-in defaults, then an optional `config/default.toml`, then
//! `SMC__SECTION__KEY` environment variables (a `.env` file is honoured).

use serde::Deserialize;
use std::path::Path;

use crate::types::{Result, SignalError};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub preprocess: PreprocessConfig,
    pub features: FeatureConfig,
    pub classifier: ClassifierConfig,
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PreprocessConfig {
    /// Widest normalized image, in pixels
    pub max_width: u32,
    /// JPEG quality factor in (0, 1]
    pub jpeg_quality: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FeatureConfig {
    pub max_samples: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Remote classifier URL; the local rule-based classifier is used when unset
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PipelineConfig {
    /// Fixed seed for the placeholder heuristics; fresh entropy per run when unset
    pub seed: Option<u64>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_width: 1920,
            jpeg_quality: 0.92,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { max_samples: 10_000 }
    }
}

impl Settings {
    /// Load from `config/default.toml` (if present) and the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from("config/default.toml")
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let builder = config::Config::builder()
            .set_default("server.port", 8080)
            .and_then(|b| b.set_default("server.log_level", "info"))
            .and_then(|b| b.set_default("preprocess.max_width", 1920))
            .and_then(|b| b.set_default("preprocess.jpeg_quality", 0.92))
            .and_then(|b| b.set_default("features.max_samples", 10_000))
            .and_then(|b| b.set_default("classifier.timeout_secs", 10))
            .and_then(|b| b.set_default("market_data.base_url", "https://api.twelvedata.com"))
            .and_then(|b| b.set_default("market_data.timeout_secs", 5))
            .map_err(|e| SignalError::Config(e.to_string()))?
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("SMC")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Settings = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SignalError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.preprocess.max_width == 0 {
            return Err(SignalError::Config("preprocess.max_width must be positive".to_string()));
        }
        if !(self.preprocess.jpeg_quality > 0.0 && self.preprocess.jpeg_quality <= 1.0) {
            return Err(SignalError::Config(
                "preprocess.jpeg_quality must be in (0, 1]".to_string(),
            ));
        }
        if self.features.max_samples == 0 {
            return Err(SignalError::Config("features.max_samples must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 8080,
                log_level: "info".to_string(),
            },
            preprocess: PreprocessConfig::default(),
            features: FeatureConfig::default(),
            classifier: ClassifierConfig {
                endpoint: None,
                timeout_secs: 10,
            },
            market_data: MarketDataConfig {
                api_key: None,
                base_url: "https://api.twelvedata.com".to_string(),
                timeout_secs: 5,
            },
            pipeline: PipelineConfig::default(),
        }
    }
}
