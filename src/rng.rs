//! Random draws for the placeholder heuristics
//!
//! Every randomized stage takes the generator as an argument instead of
//! reaching for a thread-local one, so a run can be pinned with a seeded
//! `StdRng` or a `StepRng`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Draw from `[lo, hi)`. A generator yielding zero maps to `lo` exactly.
pub fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    lo + rng.gen::<f64>() * (hi - lo)
}

/// Inclusive integer draw in `[lo, hi]`
pub fn pick_count<R: Rng + ?Sized>(rng: &mut R, lo: usize, hi: usize) -> usize {
    let span = (hi - lo + 1) as f64;
    let offset = uniform(rng, 0.0, span).floor() as usize;
    (lo + offset).min(hi)
}

/// Per-run generator: seeded when reproducibility is requested
pub fn run_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
