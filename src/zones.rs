//! Order-block, liquidity and supply/demand zone placement
//!
//! Placement is heuristic over the estimated price range; nothing here looks
//! at candles.

use rand::Rng;

use crate::rng::{pick_count, uniform};
use crate::types::{round_price, ChartInfo, Zone, ZoneKind};

/// Liquidity zones cover this fraction of the range at each extreme
pub const LIQUIDITY_BAND: f64 = 0.05;
pub const TOP_LIQUIDITY_STRENGTH: f64 = 0.85;
pub const BOTTOM_LIQUIDITY_STRENGTH: f64 = 0.80;
/// Supply/demand zone height as a fraction of the range
pub const SUPPLY_DEMAND_HEIGHT: f64 = 0.02;

/// All zone kinds for one chart
pub fn detect_zones<R: Rng + ?Sized>(chart: &ChartInfo, timeframe: &str, rng: &mut R) -> Vec<Zone> {
    let mut zones = order_blocks(chart, timeframe, rng);
    zones.extend(liquidity_zones(chart, timeframe));
    zones.extend(supply_demand(chart, timeframe, rng));
    zones
}

/// Two to four blocks in the middle 30-70% of the range, 1-3% tall
pub fn order_blocks<R: Rng + ?Sized>(chart: &ChartInfo, timeframe: &str, rng: &mut R) -> Vec<Zone> {
    let scale = chart.price_scale;
    let range = scale.range();
    let count = pick_count(rng, 2, 4);

    (0..count)
        .map(|_| {
            let base = scale.min + range * uniform(rng, 0.3, 0.7);
            let height = range * uniform(rng, 0.01, 0.03);
            zone(
                ZoneKind::OrderBlock,
                base,
                base + height,
                uniform(rng, 0.7, 1.0),
                timeframe,
            )
        })
        .collect()
}

/// Fixed zones hugging the top and bottom of the range
pub fn liquidity_zones(chart: &ChartInfo, timeframe: &str) -> Vec<Zone> {
    let scale = chart.price_scale;
    let band = scale.range() * LIQUIDITY_BAND;

    vec![
        zone(
            ZoneKind::LiquidityZone,
            scale.max - band,
            scale.max,
            TOP_LIQUIDITY_STRENGTH,
            timeframe,
        ),
        zone(
            ZoneKind::LiquidityZone,
            scale.min,
            scale.min + band,
            BOTTOM_LIQUIDITY_STRENGTH,
            timeframe,
        ),
    ]
}

/// One demand zone 25-40% above the low, one supply zone 25-40% below the high
pub fn supply_demand<R: Rng + ?Sized>(chart: &ChartInfo, timeframe: &str, rng: &mut R) -> Vec<Zone> {
    let scale = chart.price_scale;
    let range = scale.range();
    let height = range * SUPPLY_DEMAND_HEIGHT;

    let demand = scale.min + range * uniform(rng, 0.25, 0.40);
    let demand_zone = zone(
        ZoneKind::DemandZone,
        demand,
        demand + height,
        uniform(rng, 0.75, 0.95),
        timeframe,
    );

    let supply = scale.max - range * uniform(rng, 0.25, 0.40);
    let supply_zone = zone(
        ZoneKind::SupplyZone,
        supply - height,
        supply,
        uniform(rng, 0.75, 0.95),
        timeframe,
    );

    vec![demand_zone, supply_zone]
}

/// First zone of `kind` on `timeframe`
pub fn find_zone<'a>(zones: &'a [Zone], kind: ZoneKind, timeframe: &str) -> Option<&'a Zone> {
    zones
        .iter()
        .find(|z| z.kind == kind && z.timeframe_label == timeframe)
}

fn zone(kind: ZoneKind, start: f64, end: f64, strength: f64, timeframe: &str) -> Zone {
    let (a, b) = (round_price(start), round_price(end));
    Zone {
        kind,
        price_start: a.min(b),
        price_end: a.max(b),
        strength,
        timeframe_label: timeframe.to_string(),
    }
}
