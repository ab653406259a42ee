//! Decibel / linear gain conversion
//!
//! Playlist items and scan results carry gain as a linear multiplier
//! (1.0 = unity). Callers usually think in decibels.

/// Convert a decibel adjustment to a linear multiplier
///
/// `exp(ln(10) * 0.05 * dB)`, i.e. `10^(dB / 20)`.
pub fn db_to_gain(db: f64) -> f64 {
    (std::f64::consts::LN_10 * 0.05 * db).exp()
}

/// Convert a linear multiplier to decibels
///
/// Returns negative infinity for a gain of zero.
pub fn gain_to_db(gain: f64) -> f64 {
    if gain <= 0.0 {
        return f64::NEG_INFINITY;
    }
    20.0 * gain.log10()
}
