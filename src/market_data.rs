//! Live reference prices
//!
//! One attempt against the quote provider, then the static fallback table.
//! Nothing in here returns an error to the pipeline.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::MarketDataConfig;
use crate::types::{LivePrice, PriceSource, Result, SignalError};

/// Internal instrument code -> Twelve Data pair notation
pub static PROVIDER_SYMBOLS: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "EURUSD" => "EUR/USD",
    "GBPUSD" => "GBP/USD",
    "USDJPY" => "USD/JPY",
    "USDCHF" => "USD/CHF",
    "AUDUSD" => "AUD/USD",
    "USDCAD" => "USD/CAD",
    "NZDUSD" => "NZD/USD",
    "XAUUSD" => "XAU/USD",
    "BTCUSD" => "BTC/USD",
    "ETHUSD" => "ETH/USD",
};

/// Prices served when the provider cannot be reached
pub static FALLBACK_PRICES: phf::Map<&'static str, f64> = phf::phf_map! {
    "EURUSD" => 1.0742,
    "GBPUSD" => 1.2985,
    "USDJPY" => 148.52,
    "USDCHF" => 0.8925,
    "AUDUSD" => 0.6587,
    "USDCAD" => 1.3745,
    "NZDUSD" => 0.6125,
    "XAUUSD" => 2685.50,
    "BTCUSD" => 98750.00,
    "ETHUSD" => 3520.00,
};

/// Price for symbols missing from [`FALLBACK_PRICES`]
pub const UNKNOWN_SYMBOL_PRICE: f64 = 1.0;

pub fn fallback_price(symbol: &str) -> f64 {
    FALLBACK_PRICES
        .get(symbol)
        .copied()
        .unwrap_or(UNKNOWN_SYMBOL_PRICE)
}

/// Uppercase, strip pair separators
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase().replace('/', "")
}

/// External quote source
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<f64>;

    /// Source name
    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct TwelveDataPrice {
    price: Option<String>,
    message: Option<String>,
}

/// Twelve Data `/price` client
pub struct TwelveDataClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl TwelveDataClient {
    pub fn new(config: &MarketDataConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    async fn fetch_price(&self, symbol: &str) -> anyhow::Result<f64> {
        let api_key = self
            .api_key
            .as_deref()
            .context("No Twelve Data API key configured")?;
        let pair = PROVIDER_SYMBOLS.get(symbol).copied().unwrap_or(symbol);

        debug!("Fetching Twelve Data price for {} ({})", symbol, pair);

        let response = self
            .client
            .get(format!("{}/price", self.base_url))
            .query(&[("symbol", pair), ("apikey", api_key)])
            .send()
            .await
            .context("Failed to send Twelve Data request")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Twelve Data API error: {}", response.status()));
        }

        let body: TwelveDataPrice = response
            .json()
            .await
            .context("Failed to parse Twelve Data response")?;

        let raw = body.price.with_context(|| {
            format!(
                "No price in Twelve Data response: {}",
                body.message.unwrap_or_default()
            )
        })?;
        let price: f64 = raw.parse().context("Failed to parse Twelve Data price")?;

        if !price.is_finite() || price <= 0.0 {
            return Err(anyhow::anyhow!("Twelve Data returned invalid price {}", price));
        }

        Ok(price)
    }
}

#[async_trait]
impl QuoteProvider for TwelveDataClient {
    async fn quote(&self, symbol: &str) -> Result<f64> {
        self.fetch_price(symbol)
            .await
            .map_err(|e| SignalError::PriceFeed(format!("{:#}", e)))
    }

    fn name(&self) -> &str {
        "twelve_data"
    }
}

/// Resolves a reference price, degrading to the fallback table
#[derive(Clone)]
pub struct MarketDataFetcher {
    provider: Option<Arc<dyn QuoteProvider>>,
    timeout: Duration,
}

impl MarketDataFetcher {
    pub fn new(provider: Arc<dyn QuoteProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
        }
    }

    /// Fetcher that always serves the fallback table
    pub fn offline() -> Self {
        Self {
            provider: None,
            timeout: Duration::from_secs(0),
        }
    }

    pub fn from_config(config: &MarketDataConfig) -> Self {
        match TwelveDataClient::new(config) {
            Ok(client) => Self::new(Arc::new(client), Duration::from_secs(config.timeout_secs)),
            Err(e) => {
                warn!("Quote provider unavailable ({}), serving fallback prices", e);
                Self::offline()
            }
        }
    }

    /// Price with provenance. Never fails.
    pub async fn get_live_price(&self, symbol: &str) -> LivePrice {
        let symbol = normalize_symbol(symbol);

        if let Some(provider) = &self.provider {
            match tokio::time::timeout(self.timeout, provider.quote(&symbol)).await {
                Ok(Ok(price)) => {
                    info!("Live price for {} from {}: {}", symbol, provider.name(), price);
                    return LivePrice {
                        symbol,
                        price,
                        timestamp: Utc::now(),
                        source: PriceSource::Live,
                    };
                }
                Ok(Err(e)) => warn!("{} quote failed for {}: {:#}", provider.name(), symbol, e),
                Err(_) => warn!(
                    "{} quote for {} timed out after {:?}",
                    provider.name(),
                    symbol,
                    self.timeout
                ),
            }
        }

        let price = fallback_price(&symbol);
        debug!("Using fallback price for {}: {}", symbol, price);
        LivePrice {
            symbol,
            price,
            timestamp: Utc::now(),
            source: PriceSource::Simulated,
        }
    }

    pub async fn get_price(&self, symbol: &str) -> f64 {
        self.get_live_price(symbol).await.price
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_ref().map(|p| p.name())
    }
}
