// src/similarity/numeric.rs - Numeric similarity with a tolerance band

/// Relative difference against a tolerance band: inside the band the values
/// count as equal, outside the score decays linearly to 0.
pub fn numeric_similarity(a: f64, b: f64, tolerance: f64) -> f64 {
    if !a.is_finite() || !b.is_finite() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let denom = a.abs().max(b.abs());
    if denom == 0.0 {
        return 1.0;
    }
    let rel = (a - b).abs() / denom;
    let tol = tolerance.clamp(0.0, 0.99);
    if rel <= tol {
        1.0
    } else {
        (1.0 - (rel - tol) / (1.0 - tol)).clamp(0.0, 1.0)
    }
}
