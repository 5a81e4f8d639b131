//! Signal synthesis: entry band, stop-loss, take-profit, confidence, rationale

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::rng::uniform;
use crate::types::{
    round_price, round_to, Bias, ChartInfo, CombinedPrediction, MarketStructure, PriceSource,
    PredictionSource, Provenance, TradingSignal, Zone, ZoneKind,
};
use crate::zones::find_zone;

/// Stop distance beyond the entry band, as a fraction of the range
pub const STOP_DISTANCE: f64 = 0.025;
/// Target distance beyond the entry band, as a fraction of the range
pub const TARGET_DISTANCE: f64 = 0.08;
/// Neutral entry half-width and stop/target offsets from the midpoint
pub const NEUTRAL_ENTRY: f64 = 0.01;
pub const NEUTRAL_OFFSET: f64 = 0.03;
/// Weight of the heuristic base confidence when a prediction is blended in
pub const BASE_WEIGHT: f64 = 0.6;
pub const PREDICTION_WEIGHT: f64 = 0.4;

/// Inputs joined at the synthesizer
pub struct SynthesisInput<'a> {
    /// Higher-timeframe chart: supplies symbol, range and midpoint
    pub higher: &'a ChartInfo,
    pub zones: Vec<Zone>,
    pub structure: MarketStructure,
    pub live_price: f64,
    pub price_source: PriceSource,
    pub prediction: Option<&'a CombinedPrediction>,
}

struct Levels {
    entry_start: f64,
    entry_end: f64,
    stop_loss: f64,
    take_profit: f64,
}

pub fn synthesize<R: Rng + ?Sized>(input: SynthesisInput<'_>, rng: &mut R) -> TradingSignal {
    let scale = input.higher.price_scale;
    let range = scale.range();
    let mid = scale.mid();
    let timeframe = input.higher.timeframe_label.as_str();
    let bias = input.structure.trend;

    let levels = match bias {
        Bias::Bullish => {
            let (entry_start, entry_end) = match find_zone(&input.zones, ZoneKind::DemandZone, timeframe) {
                Some(z) => (z.price_start, z.price_end),
                None => (round_price(mid - range * 0.02), round_price(mid - range * 0.01)),
            };
            Levels {
                entry_start,
                entry_end,
                stop_loss: round_price(entry_start - range * STOP_DISTANCE),
                take_profit: round_price(entry_end + range * TARGET_DISTANCE),
            }
        }
        Bias::Bearish => {
            let (entry_start, entry_end) = match find_zone(&input.zones, ZoneKind::SupplyZone, timeframe) {
                Some(z) => (z.price_end, z.price_start),
                None => (round_price(mid + range * 0.02), round_price(mid + range * 0.01)),
            };
            Levels {
                entry_start,
                entry_end,
                stop_loss: round_price(entry_start + range * STOP_DISTANCE),
                take_profit: round_price(entry_end - range * TARGET_DISTANCE),
            }
        }
        Bias::Neutral => Levels {
            entry_start: round_price(mid - range * NEUTRAL_ENTRY),
            entry_end: round_price(mid + range * NEUTRAL_ENTRY),
            stop_loss: round_price(mid - range * NEUTRAL_OFFSET),
            take_profit: round_price(mid + range * NEUTRAL_OFFSET),
        },
    };

    let base = uniform(rng, 75.0, 95.0);
    let confidence = match input.prediction {
        Some(p) => BASE_WEIGHT * base + PREDICTION_WEIGHT * p.overall_confidence * 100.0,
        None => base,
    };
    let confidence = round_to(confidence.clamp(0.0, 100.0), 1);

    let rationale = rationale(bias, &levels, input.higher, input.live_price, input.prediction);

    let provenance = Provenance {
        price: input.price_source,
        classifier: input
            .prediction
            .map(|p| p.source)
            .unwrap_or(PredictionSource::Fallback),
    };

    TradingSignal {
        id: Uuid::new_v4(),
        instrument_symbol: input.higher.instrument_symbol.clone(),
        bias,
        entry_start: levels.entry_start,
        entry_end: levels.entry_end,
        stop_loss: levels.stop_loss,
        take_profit: levels.take_profit,
        live_price: round_price(input.live_price),
        confidence,
        rationale,
        zones: input.zones,
        market_structure: input.structure,
        provenance,
        created_at: Utc::now(),
    }
}

fn rationale(
    bias: Bias,
    levels: &Levels,
    higher: &ChartInfo,
    live_price: f64,
    prediction: Option<&CombinedPrediction>,
) -> String {
    let tags = prediction.map(|p| p.higher.tags.join(", "));

    match bias {
        Bias::Bullish => {
            let position = if live_price > levels.entry_end {
                "above"
            } else {
                "sweeping liquidity below"
            };
            let note = match (&tags, prediction) {
                (Some(tags), Some(p)) => format!(
                    " Classifier detected: {}. Confidence: {:.1}%.",
                    tags,
                    p.overall_confidence * 100.0
                ),
                _ => String::new(),
            };
            format!(
                "Price is currently {} {:.5}. Expect bullish reversal from discount zone aligned with {} demand block. Lower timeframe structure confirms BOS with order block support.{}",
                position, levels.entry_end, higher.timeframe_label, note
            )
        }
        Bias::Bearish => {
            let position = if live_price < levels.entry_end {
                "below"
            } else {
                "inducing liquidity above"
            };
            let note = match (&tags, prediction) {
                (Some(tags), Some(p)) => format!(
                    " Classifier detected: {}. Confidence: {:.1}%.",
                    tags,
                    p.overall_confidence * 100.0
                ),
                _ => String::new(),
            };
            format!(
                "Price is {} {:.5}. Expect bearish continuation from premium zone aligned with {} supply block. Lower timeframe shows CHoCH with selling pressure.{}",
                position, levels.entry_end, higher.timeframe_label, note
            )
        }
        Bias::Neutral => {
            let position = if live_price > levels.entry_end {
                "above"
            } else if live_price < levels.entry_start {
                "below"
            } else {
                "inside"
            };
            let note = match (&tags, prediction) {
                (Some(tags), Some(p)) => format!(
                    " Classifier suggests waiting for clearer signals ({:.1}%). Detected patterns: {}.",
                    p.overall_confidence * 100.0,
                    tags
                ),
                _ => String::new(),
            };
            format!(
                "Market is consolidating in a neutral range; price is {} the {:.5}-{:.5} band. Wait for a clear BOS or CHoCH before entering. Monitor liquidity sweeps at {:.5} and {:.5}.{}",
                position,
                levels.entry_start,
                levels.entry_end,
                higher.price_scale.min,
                higher.price_scale.max,
                note
            )
        }
    }
}
