//! Market structure: trend, BOS/CHoCH levels and swing sequences

use rand::Rng;

use crate::rng::uniform;
use crate::types::{round_price, Bias, ChartInfo, CombinedPrediction, MarketStructure};

/// Probability that a change-of-character level is reported
pub const CHOCH_PROBABILITY: f64 = 0.3;
const BOS_SPREAD: f64 = 0.10;
const CHOCH_SPREAD: f64 = 0.15;
const SWING_STEP: f64 = 0.10;
const SWING_JITTER: f64 = 0.05;
const HIGHER_HIGH_COUNT: usize = 3;
const LOWER_LOW_COUNT: usize = 2;

/// Derive structure from the higher-timeframe chart.
///
/// A supplied prediction decides the trend; without one the trend is drawn
/// with the same 40/20/40 split the fallback classifier uses.
pub fn detect_structure<R: Rng + ?Sized>(
    higher: &ChartInfo,
    prediction: Option<&CombinedPrediction>,
    rng: &mut R,
) -> MarketStructure {
    let scale = higher.price_scale;
    let range = scale.range();
    let mid = scale.mid();

    let trend = match prediction {
        Some(p) => p.combined_signal,
        None => random_trend(rng),
    };

    let last_break_of_structure = if trend.is_neutral() {
        None
    } else {
        Some(round_price(mid + uniform(rng, -0.5, 0.5) * range * BOS_SPREAD))
    };

    let last_change_of_character = if rng.gen::<f64>() > 1.0 - CHOCH_PROBABILITY {
        Some(round_price(mid + uniform(rng, -0.5, 0.5) * range * CHOCH_SPREAD))
    } else {
        None
    };

    let higher_highs = if trend == Bias::Bullish {
        (0..HIGHER_HIGH_COUNT)
            .map(|i| {
                let level = mid + range * SWING_STEP * (i + 1) as f64 + uniform(rng, 0.0, range * SWING_JITTER);
                round_price(level)
            })
            .collect()
    } else {
        Vec::new()
    };

    let lower_lows = if trend == Bias::Bearish {
        (0..LOWER_LOW_COUNT)
            .map(|i| {
                let level = mid - range * SWING_STEP * (i + 1) as f64 - uniform(rng, 0.0, range * SWING_JITTER);
                round_price(level)
            })
            .collect()
    } else {
        Vec::new()
    };

    MarketStructure {
        trend,
        last_break_of_structure,
        last_change_of_character,
        higher_highs,
        lower_lows,
    }
}

fn random_trend<R: Rng + ?Sized>(rng: &mut R) -> Bias {
    let roll = rng.gen::<f64>();
    if roll > 0.6 {
        Bias::Bullish
    } else if roll < 0.4 {
        Bias::Bearish
    } else {
        Bias::Neutral
    }
}
