/// `round(num / den)` for non-negative integers, rounding half away from zero.
pub(crate) fn round_div_u64(num: u64, den: u64) -> u64 {
    debug_assert!(den > 0);
    let (num, den) = (u128::from(num), u128::from(den));
    ((num * 2 + den) / (den * 2)) as u64
}

/// Map a `[0, 1]` quality factor onto the 1..=100 scale used by lossy encoders.
pub(crate) fn quality_to_percent(quality: f32) -> u8 {
    let q = if quality.is_finite() {
        quality.clamp(0.0, 1.0)
    } else {
        1.0
    };
    ((q * 100.0).round() as u8).max(1)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
