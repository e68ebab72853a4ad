//! Exponential-moving-average primitives used by the duration predictor.

/// Blend a new sample into the current average: `α·sample + (1−α)·current`.
pub fn blend(current: f64, sample: f64, alpha: f64) -> f64 {
    alpha * sample + (1.0 - alpha) * current
}

/// Confidence grows linearly with observed samples and saturates at 1.
pub fn confidence(sample_count: u64, threshold: u64) -> f64 {
    if threshold == 0 {
        return 1.0;
    }
    (sample_count as f64 / threshold as f64).min(1.0)
}
