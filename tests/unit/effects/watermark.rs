use std::io::Cursor;

use super::*;
use crate::assets::decode::encode_data_uri;
use crate::foundation::core::Canvas;
use serde_json::json;

fn png_data_uri(w: u32, h: u32) -> String {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba([0, 0, 255, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    encode_data_uri(&buf, "image/png")
}

fn watermark(size: u32, extra: Value) -> WatermarkEffect {
    let mut v = json!({
        "type": "watermark",
        "id": "logo",
        "imageData": png_data_uri(size, size),
        "margin": 2.0
    });
    if let (Value::Object(base), Value::Object(extra)) = (&mut v, extra) {
        base.extend(extra);
    }
    let EffectConfig::Watermark(cfg) = EffectConfig::from_json(v).unwrap() else {
        panic!("expected watermark config");
    };
    WatermarkEffect::new(cfg).unwrap()
}

#[test]
fn placement_follows_position() {
    let r = placement(WatermarkPosition::TopLeft, 100.0, 50.0, 10.0, 5.0, 2.0);
    assert_eq!((r.x0, r.y0), (2.0, 2.0));
    let r = placement(WatermarkPosition::BottomRight, 100.0, 50.0, 10.0, 5.0, 2.0);
    assert_eq!((r.x1, r.y1), (98.0, 48.0));
    let r = placement(WatermarkPosition::Center, 100.0, 50.0, 10.0, 4.0, 2.0);
    assert_eq!((r.x0, r.y0), (45.0, 23.0));
    let r = placement(
        WatermarkPosition::Custom { x: 0.5, y: 0.1 },
        100.0,
        50.0,
        10.0,
        4.0,
        2.0,
    );
    assert_eq!((r.x0, r.y0), (50.0, 5.0));
}

#[test]
fn draws_in_the_bottom_right_corner() {
    let mut effect = watermark(4, json!({}));
    let mut s = Surface::new(Canvas::new(16, 16)).unwrap();
    effect
        .render(&AudioVisualParameters::silent(0.0), &mut s)
        .unwrap();
    assert_eq!(s.pixel(12, 12), Some([0, 0, 255, 255]));
    assert_eq!(s.pixel(1, 1), Some([0, 0, 0, 0]));
    assert_eq!(s.pixel(15, 15), Some([0, 0, 0, 0]));
}

#[test]
fn scale_enlarges_the_image() {
    let mut effect = watermark(4, json!({"position": "topLeft", "scale": 2.0}));
    let mut s = Surface::new(Canvas::new(16, 16)).unwrap();
    effect
        .render(&AudioVisualParameters::silent(0.0), &mut s)
        .unwrap();
    assert_eq!(s.pixel(8, 8), Some([0, 0, 255, 255]));
    assert_eq!(s.pixel(11, 11).unwrap()[3], 0);
}

#[test]
fn rotation_keeps_the_centre_covered() {
    let mut effect = watermark(8, json!({"position": "center", "rotationDeg": 45.0}));
    let mut s = Surface::new(Canvas::new(32, 32)).unwrap();
    effect
        .render(&AudioVisualParameters::silent(0.0), &mut s)
        .unwrap();
    let px = s.pixel(16, 16).unwrap();
    assert!(px[2] > 200 && px[3] > 200, "{px:?}");
    // The unrotated corner falls outside the diamond.
    assert!(s.pixel(12, 12).unwrap()[3] < 128);
    // The diamond tip reaches past the unrotated edge.
    assert!(s.pixel(16, 11).unwrap()[3] > 128);
}

#[test]
fn without_image_nothing_is_drawn_and_bad_data_is_rejected() {
    let mut effect = WatermarkEffect::new(WatermarkConfig {
        common: crate::effects::config::EffectCommon::new("empty"),
        ..WatermarkConfig::default()
    })
    .unwrap();
    let mut s = Surface::new(Canvas::new(8, 8)).unwrap();
    effect
        .render(&AudioVisualParameters::silent(0.0), &mut s)
        .unwrap();
    assert!(s.data().iter().all(|b| *b == 0));

    assert!(effect.update_config(&json!({"imageData": "%%%"})).is_err());
}
