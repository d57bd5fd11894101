use super::*;

fn normal(alpha: f32) -> Composite {
    Composite {
        alpha,
        mode: BlendMode::Normal,
    }
}

#[test]
fn opaque_source_over_replaces() {
    let mut dst = vec![10u8, 20, 30, 255];
    composite_layer(&mut dst, &[200, 100, 50, 255], normal(1.0)).unwrap();
    assert_eq!(dst, vec![200, 100, 50, 255]);
}

#[test]
fn zero_alpha_is_identity() {
    let mut dst = vec![10u8, 20, 30, 255];
    composite_layer(&mut dst, &[200, 100, 50, 255], normal(0.0)).unwrap();
    assert_eq!(dst, vec![10, 20, 30, 255]);
}

#[test]
fn transparent_source_is_identity_in_every_mode() {
    let modes = [
        BlendMode::Normal,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::Darken,
        BlendMode::Lighten,
        BlendMode::ColorDodge,
        BlendMode::ColorBurn,
        BlendMode::HardLight,
        BlendMode::SoftLight,
        BlendMode::Difference,
        BlendMode::Exclusion,
    ];
    for mode in modes {
        let mut dst = vec![10u8, 20, 30, 255];
        composite_layer(&mut dst, &[0, 0, 0, 0], Composite { alpha: 1.0, mode }).unwrap();
        assert_eq!(dst, vec![10, 20, 30, 255], "{mode:?}");
    }
}

#[test]
fn half_alpha_mixes_evenly() {
    let mut dst = vec![0u8, 0, 0, 255];
    composite_layer(&mut dst, &[255, 255, 255, 255], normal(0.5)).unwrap();
    assert!((i32::from(dst[0]) - 128).abs() <= 1);
    assert_eq!(dst[3], 255);
}

#[test]
fn multiply_white_keeps_destination() {
    let mut dst = vec![100u8, 150, 200, 255];
    composite_layer(
        &mut dst,
        &[255, 255, 255, 255],
        Composite {
            alpha: 1.0,
            mode: BlendMode::Multiply,
        },
    )
    .unwrap();
    assert_eq!(dst, vec![100, 150, 200, 255]);
}

#[test]
fn screen_black_keeps_destination_and_difference_of_equal_is_black() {
    let mut dst = vec![100u8, 150, 200, 255];
    composite_layer(
        &mut dst,
        &[0, 0, 0, 255],
        Composite {
            alpha: 1.0,
            mode: BlendMode::Screen,
        },
    )
    .unwrap();
    assert_eq!(dst, vec![100, 150, 200, 255]);

    composite_layer(
        &mut dst,
        &[100, 150, 200, 255],
        Composite {
            alpha: 1.0,
            mode: BlendMode::Difference,
        },
    )
    .unwrap();
    assert_eq!(dst, vec![0, 0, 0, 255]);
}

#[test]
fn mismatched_buffers_are_rejected() {
    let mut dst = vec![0u8; 8];
    assert!(composite_layer(&mut dst, &[0u8; 4], normal(1.0)).is_err());
}

#[test]
fn blend_mode_accepts_css_aliases() {
    let m: BlendMode = serde_json::from_value(serde_json::json!("color-dodge")).unwrap();
    assert_eq!(m, BlendMode::ColorDodge);
    let m: BlendMode = serde_json::from_value(serde_json::json!("source-over")).unwrap();
    assert_eq!(m, BlendMode::Normal);
    let m: BlendMode = serde_json::from_value(serde_json::json!("softLight")).unwrap();
    assert_eq!(m, BlendMode::SoftLight);
}
