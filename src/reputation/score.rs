//! The reputation score formula (§4.3).

/// Per-identity-type reputation score multiplier applied after the additive
/// terms below.
pub fn clamp_score(raw: f64) -> u32 {
    let rounded = (raw + 0.5).floor();
    rounded.clamp(0.0, 500.0) as u32
}

/// `score = clamp(0, 500, (50 + min(2*tx, 200) + 20*avg_rating - 25*minor -
/// 50*major) * multiplier)`, rounded half-up.
pub fn compute_score(
    completed_transactions: u32,
    avg_rating: f64,
    minor_violations: u32,
    major_violations: u32,
    multiplier: f64,
) -> u32 {
    let tx_term = (2.0 * completed_transactions as f64).min(200.0);
    let rating_term = 20.0 * avg_rating;
    let minor_term = 25.0 * minor_violations as f64;
    let major_term = 50.0 * major_violations as f64;
    let raw = (50.0 + tx_term + rating_term - minor_term - major_term) * multiplier;
    clamp_score(raw)
}
