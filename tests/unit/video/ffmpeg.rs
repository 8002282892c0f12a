use super::imp::{decodable_time, parse_ff_ratio};

#[test]
fn ratio_parsing_rejects_degenerate_rates() {
    assert_eq!(parse_ff_ratio("30000/1001"), Some((30000, 1001)));
    assert_eq!(parse_ff_ratio("25/1"), Some((25, 1)));
    assert_eq!(parse_ff_ratio("0/0"), None);
    assert_eq!(parse_ff_ratio("30"), None);
    assert_eq!(parse_ff_ratio("a/b"), None);
}

#[test]
fn seeks_stop_one_frame_short_of_the_end() {
    let fps = Some((25, 1));
    assert!((decodable_time(10.0, 10.0, fps) - 9.96).abs() < 1e-9);
    assert_eq!(decodable_time(3.0, 10.0, fps), 3.0);
    assert_eq!(decodable_time(-1.0, 10.0, fps), 0.0);
    assert!((decodable_time(10.0, 10.0, None) - (10.0 - 1.0 / 30.0)).abs() < 1e-9);
}

#[test]
fn unknown_duration_passes_target_through() {
    assert_eq!(decodable_time(42.0, 0.0, None), 42.0);
    assert_eq!(decodable_time(-2.0, 0.0, None), 0.0);
}

#[test]
fn tiny_clips_never_go_negative() {
    assert_eq!(decodable_time(0.5, 0.01, Some((30, 1))), 0.0);
}
