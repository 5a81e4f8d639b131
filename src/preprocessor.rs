//! Chart preprocessing
//!
//! Derives the instrument and timeframe from an upload's filename, estimates a
//! price range, and re-encodes the image into the normalized JPEG handed to the
//! classifier.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use tracing::{debug, info};

use crate::config::PreprocessConfig;
use crate::rng::uniform;
use crate::types::{round_price, ChartInfo, PriceScale, Result, SignalError};

/// Symbol used when nothing in the filename identifies an instrument
pub const DEFAULT_SYMBOL: &str = "EURUSD";

/// Checked in order, first substring match wins
pub const KNOWN_INSTRUMENTS: [&str; 20] = [
    "EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "USDCAD", "NZDUSD",
    "EURJPY", "GBPJPY", "EURGBP", "AUDJPY", "EURAUD", "EURCHF", "AUDNZD",
    "XAUUSD", "BTCUSD", "ETHUSD", "US30", "NAS100", "SPX500",
];

static BASE_ASSET_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(XAU|BTC|ETH)[A-Z]{3}").expect("static regex"));

static SIX_LETTER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^A-Z])([A-Z]{6})(?:[^A-Z]|$)").expect("static regex"));

static USD_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z]{3}USD|USD[A-Z]{3}").expect("static regex"));

/// ISO codes recognised inside run-together filenames such as `gbpcadh4`
const CURRENCY_CODES: [&str; 16] = [
    "USD", "EUR", "GBP", "JPY", "CHF", "AUD", "CAD", "NZD",
    "SEK", "NOK", "DKK", "SGD", "HKD", "MXN", "ZAR", "TRY",
];

/// Filename tokens and the label they map to, in precedence order
const TIMEFRAME_TOKENS: [(&str, &str, &str); 4] = [
    ("4H", "H4", "4H"),
    ("15M", "M15", "15M"),
    ("1H", "H1", "1H"),
    ("1D", "D1", "1D"),
];

pub struct ChartPreprocessor {
    config: PreprocessConfig,
}

impl ChartPreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Build the `ChartInfo` for one upload.
    ///
    /// Fails only when the bytes are not a decodable image.
    pub fn process<R: Rng + ?Sized>(
        &self,
        image_bytes: &[u8],
        filename: &str,
        expected_timeframe: &str,
        rng: &mut R,
    ) -> Result<ChartInfo> {
        let img = decode(image_bytes)?;
        let (width, height) = img.dimensions();

        let instrument_symbol = extract_symbol(filename);
        let timeframe_label = detect_timeframe(filename, expected_timeframe);
        let price_scale = estimate_price_scale(rng);

        debug!(
            "Preprocessed {} ({}x{}): {} {} scale {:.5}-{:.5}",
            filename, width, height, instrument_symbol, timeframe_label,
            price_scale.min, price_scale.max
        );

        Ok(ChartInfo {
            instrument_symbol,
            timeframe_label,
            price_scale,
        })
    }

    /// Re-encode with the configured width cap and quality
    pub fn normalize(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        resize_and_normalize(image_bytes, self.config.max_width, self.config.jpeg_quality)
    }
}

pub fn decode(image_bytes: &[u8]) -> Result<DynamicImage> {
    if image_bytes.is_empty() {
        return Err(SignalError::InvalidImage("empty payload".to_string()));
    }
    image::load_from_memory(image_bytes).map_err(|e| SignalError::InvalidImage(e.to_string()))
}

/// Instrument code from a filename, falling back to [`DEFAULT_SYMBOL`]
pub fn extract_symbol(filename: &str) -> String {
    let upper = filename.to_uppercase();

    if let Some(known) = KNOWN_INSTRUMENTS.iter().find(|code| upper.contains(*code)) {
        return known.to_string();
    }

    if let Some(m) = BASE_ASSET_PAIR.find(&upper) {
        return m.as_str().to_string();
    }

    if let Some(caps) = SIX_LETTER_TOKEN.captures(&upper) {
        return caps[1].to_string();
    }

    if let Some(pair) = currency_pair(&upper) {
        return pair;
    }

    if let Some(m) = USD_PAIR.find(&upper) {
        return m.as_str().to_string();
    }

    DEFAULT_SYMBOL.to_string()
}

/// First six-letter window made of two known currency codes
fn currency_pair(upper: &str) -> Option<String> {
    let bytes = upper.as_bytes();
    bytes
        .windows(6)
        .filter(|w| w.iter().all(u8::is_ascii_uppercase))
        .find(|w| {
            let (base, quote) = w.split_at(3);
            base != quote
                && CURRENCY_CODES.iter().any(|c| c.as_bytes() == base)
                && CURRENCY_CODES.iter().any(|c| c.as_bytes() == quote)
        })
        .map(|w| String::from_utf8_lossy(w).into_owned())
}

/// Timeframe label from a filename, else the caller's expectation
pub fn detect_timeframe(filename: &str, expected: &str) -> String {
    let upper = filename.to_uppercase();

    TIMEFRAME_TOKENS
        .iter()
        .find(|(a, b, _)| upper.contains(a) || upper.contains(b))
        .map(|(_, _, label)| label.to_string())
        .unwrap_or_else(|| expected.to_string())
}

/// Synthetic price range standing in for axis calibration.
///
/// Nothing here reads the price axis; callers must not treat the values as
/// real prices. Only `min < max` holds.
pub fn estimate_price_scale<R: Rng + ?Sized>(rng: &mut R) -> PriceScale {
    let min = round_price(uniform(rng, 1.0, 1001.0));
    let max = round_price(min + uniform(rng, 0.02, 0.07));
    PriceScale { min, max }
}

/// Lower-timeframe info carrying the higher-timeframe symbol
pub fn reconcile(higher: &ChartInfo, lower: &ChartInfo) -> ChartInfo {
    if higher.instrument_symbol != lower.instrument_symbol {
        info!(
            "Symbol mismatch between charts ({} vs {}), using {}",
            higher.instrument_symbol, lower.instrument_symbol, higher.instrument_symbol
        );
    }
    ChartInfo {
        instrument_symbol: higher.instrument_symbol.clone(),
        ..lower.clone()
    }
}

/// Downscale to at most `max_width` (aspect preserved, never upscaled),
/// flatten onto white and encode as JPEG at `quality` (0-1]
pub fn resize_and_normalize(image_bytes: &[u8], max_width: u32, quality: f32) -> Result<Vec<u8>> {
    let img = decode(image_bytes)?;
    let (width, height) = img.dimensions();

    let img = if width > max_width {
        let new_height = ((height as f64 * max_width as f64) / width as f64).round().max(1.0) as u32;
        img.resize_exact(max_width, new_height, FilterType::Triangle)
    } else {
        img
    };

    let flattened = flatten_on_white(&img);

    let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&flattened)
        .map_err(|e| SignalError::InvalidImage(e.to_string()))?;

    Ok(out)
}

fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let alpha = px[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Cursor;

    fn png(width: u32, height: u32, fill: Rgba<u8>) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, fill);
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_extract_symbol_known_list() {
        assert_eq!(extract_symbol("gbpusd_4h.png"), "GBPUSD");
        assert_eq!(extract_symbol("my-xauusd-chart.jpg"), "XAUUSD");
        assert_eq!(extract_symbol("nas100 15m.png"), "NAS100");
    }

    #[test]
    fn test_extract_symbol_priority_order() {
        // EURUSD precedes EURJPY in the list
        assert_eq!(extract_symbol("EURJPY_vs_EURUSD.png"), "EURUSD");
    }

    #[test]
    fn test_extract_symbol_pattern_fallback() {
        assert_eq!(extract_symbol("btceur-h4.png"), "BTCEUR");
        assert_eq!(extract_symbol("chart_cadjpy_4h.png"), "CADJPY");
    }

    #[test]
    fn test_extract_symbol_run_together_names() {
        assert_eq!(extract_symbol("gbpcadh4.png"), "GBPCAD");
        assert_eq!(extract_symbol("chfjpy15m.png"), "CHFJPY");
        assert_eq!(extract_symbol("mytryusdchart.png"), "TRYUSD");
        assert_eq!(extract_symbol("xyzusdq.png"), "XYZUSD");
    }

    #[test]
    fn test_extract_symbol_default() {
        assert_eq!(extract_symbol("screenshot.png"), DEFAULT_SYMBOL);
        assert_eq!(extract_symbol("tradingview-capture.png"), DEFAULT_SYMBOL);
        assert_eq!(extract_symbol("1.png"), DEFAULT_SYMBOL);
    }

    #[test]
    fn test_detect_timeframe() {
        assert_eq!(detect_timeframe("EURUSD_H4.png", "15M"), "4H");
        assert_eq!(detect_timeframe("eurusd-m15.png", "4H"), "15M");
        assert_eq!(detect_timeframe("eurusd_1d.png", "4H"), "1D");
        assert_eq!(detect_timeframe("eurusd.png", "15M"), "15M");
    }

    #[test]
    fn test_price_scale_shape() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let scale = estimate_price_scale(&mut rng);
            assert!(scale.min < scale.max);
            assert!(scale.min.is_finite() && scale.max.is_finite());
        }
    }

    #[test]
    fn test_reconcile_prefers_higher_symbol() {
        let higher = ChartInfo {
            instrument_symbol: "GBPUSD".to_string(),
            timeframe_label: "4H".to_string(),
            price_scale: PriceScale { min: 1.0, max: 1.1 },
        };
        let lower = ChartInfo {
            instrument_symbol: "EURUSD".to_string(),
            timeframe_label: "15M".to_string(),
            price_scale: PriceScale { min: 2.0, max: 2.1 },
        };
        let merged = reconcile(&higher, &lower);
        assert_eq!(merged.instrument_symbol, "GBPUSD");
        assert_eq!(merged.timeframe_label, "15M");
        assert_eq!(merged.price_scale, lower.price_scale);
        assert_eq!(lower.instrument_symbol, "EURUSD");
    }

    #[test]
    fn test_process_rejects_garbage() {
        let pre = ChartPreprocessor::new(PreprocessConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let err = pre.process(b"not an image", "EURUSD_4H.png", "4H", &mut rng);
        assert!(matches!(err, Err(SignalError::InvalidImage(_))));
    }

    #[test]
    fn test_process_reads_filename() {
        let pre = ChartPreprocessor::new(PreprocessConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let info = pre
            .process(&png(8, 8, Rgba([10, 20, 30, 255])), "usdjpy_m15.png", "4H", &mut rng)
            .unwrap();
        assert_eq!(info.instrument_symbol, "USDJPY");
        assert_eq!(info.timeframe_label, "15M");
    }

    #[test]
    fn test_normalize_caps_width() {
        let bytes = png(400, 200, Rgba([200, 0, 0, 255]));
        let out = resize_and_normalize(&bytes, 100, 0.92).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.dimensions(), (100, 50));
    }

    #[test]
    fn test_normalize_keeps_small_images() {
        let bytes = png(40, 30, Rgba([0, 0, 0, 255]));
        let out = resize_and_normalize(&bytes, 1920, 0.92).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.dimensions(), (40, 30));
    }

    #[test]
    fn test_normalize_flattens_transparency_to_white() {
        let bytes = png(16, 16, Rgba([0, 0, 0, 0]));
        let out = resize_and_normalize(&bytes, 1920, 0.92).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgb8();
        let px = img.get_pixel(8, 8);
        assert!(px[0] > 240 && px[1] > 240 && px[2] > 240);
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let bytes = png(300, 120, Rgba([30, 120, 90, 200]));
        let a = resize_and_normalize(&bytes, 128, 0.92).unwrap();
        let b = resize_and_normalize(&bytes, 128, 0.92).unwrap();
        assert_eq!(a, b);
    }
}
