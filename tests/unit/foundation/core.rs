use super::*;

#[test]
fn premul_and_back_is_stable_for_opaque_colors() {
    let c = Rgba8Premul::from_straight_rgba(12, 200, 99, 255);
    assert_eq!(c.to_array(), [12, 200, 99, 255]);
    assert_eq!(c.to_straight_rgba(), [12, 200, 99, 255]);
}

#[test]
fn premul_scales_color_by_alpha() {
    let c = Rgba8Premul::from_straight_rgba(255, 0, 128, 128);
    assert_eq!(c.a, 128);
    assert_eq!(c.r, 128);
    assert_eq!(c.g, 0);
    assert_eq!(c.b, 64);
}

#[test]
fn transparent_unpremul_is_zero() {
    assert_eq!(Rgba8Premul::transparent().to_straight_rgba(), [0, 0, 0, 0]);
}

#[test]
fn canvas_degenerate_and_len() {
    assert!(Canvas::new(0, 10).is_degenerate());
    assert!(Canvas::new(10, 0).is_degenerate());
    assert!(!Canvas::new(2, 3).is_degenerate());
    assert_eq!(Canvas::new(2, 3).rgba8_len(), 24);
}

#[test]
fn canvas_validate_rejects_oversized() {
    assert!(Canvas::new(70_000, 10).validate().is_err());
    Canvas::new(1920, 1080).validate().unwrap();
}
