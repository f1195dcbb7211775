//! Per-slot height normalization
//!
//! Raw height inputs live in a bounded range (140-160 in the default UI)
//! and map linearly onto the 0.4..1.0 scale the generation backend expects.

pub const DEFAULT_HEIGHT_RANGE: (f64, f64) = (140.0, 160.0);

/// Linear interpolation into [0.4, 1.0], rounded to one decimal place.
pub fn normalize_height(value: f64, range: (f64, f64)) -> f64 {
    let (min, max) = range;
    let scaled = 0.4 + (value - min) / (max - min) * 0.6;
    (scaled * 10.0).round() / 10.0
}

/// One normalized value per uploaded candidate. Extra inputs beyond the
/// candidate count are discarded; the list is never padded.
pub fn normalize_heights(values: &[f64], candidate_count: usize, range: (f64, f64)) -> Vec<f64> {
    values
        .iter()
        .take(candidate_count)
        .map(|v| normalize_height(*v, range))
        .collect()
}
