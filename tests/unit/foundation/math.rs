use super::*;

#[test]
fn round_div_rounds_half_up() {
    assert_eq!(round_div_u64(10, 4), 3);
    assert_eq!(round_div_u64(9, 4), 2);
    assert_eq!(round_div_u64(0, 3), 0);
    assert_eq!(round_div_u64(20, 3), 7);
    assert_eq!(round_div_u64(10, 3), 3);
}

#[test]
fn quality_maps_onto_percent_scale() {
    assert_eq!(quality_to_percent(0.9), 90);
    assert_eq!(quality_to_percent(1.0), 100);
    assert_eq!(quality_to_percent(0.0), 1);
    assert_eq!(quality_to_percent(7.0), 100);
    assert_eq!(quality_to_percent(f32::NAN), 100);
}

#[test]
fn round_div_handles_products_past_u64_half_range() {
    let num = u64::from(u32::MAX - 1) * u64::from(u32::MAX);
    assert_eq!(round_div_u64(num, u64::from(u32::MAX)), u64::from(u32::MAX - 1));
    assert_eq!(round_div_u64(u64::MAX, 1), u64::MAX);
    assert_eq!(round_div_u64(u64::MAX, u64::MAX), 1);
}
