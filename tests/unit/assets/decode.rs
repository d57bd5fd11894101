use std::io::Cursor;

use super::*;

fn png_bytes(w: u32, h: u32, px: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba(px));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn decode_image_png_dimensions_and_premul() {
    let buf = png_bytes(1, 1, [100, 50, 200, 128]);
    let decoded = decode_image(&buf).unwrap();
    assert_eq!((decoded.width, decoded.height), (1, 1));
    assert_eq!(
        decoded.rgba8_premul.as_slice(),
        &[
            ((100u16 * 128 + 127) / 255) as u8,
            ((50u16 * 128 + 127) / 255) as u8,
            ((200u16 * 128 + 127) / 255) as u8,
            128u8
        ]
    );
}

#[test]
fn base64_with_and_without_data_uri() {
    let buf = png_bytes(3, 2, [0, 255, 0, 255]);
    let uri = encode_data_uri(&buf, "image/png");
    assert!(uri.starts_with("data:image/png;base64,"));

    let a = decode_base64_image(&uri).unwrap();
    let raw = uri.split_once(',').unwrap().1;
    let b = decode_base64_image(raw).unwrap();
    assert_eq!((a.width, a.height), (3, 2));
    assert_eq!(a.rgba8_premul, b.rgba8_premul);
}

#[test]
fn rejects_garbage() {
    assert!(decode_base64("data:image/png,abc").is_err());
    assert!(decode_base64("***").is_err());
    assert!(decode_image(b"not an image").is_err());
}

#[test]
fn paint_conversion_keeps_size() {
    let decoded = decode_image(&png_bytes(5, 4, [1, 2, 3, 255])).unwrap();
    let paint = decoded.to_paint().unwrap();
    match paint.image {
        vello_cpu::ImageSource::Pixmap(p) => assert_eq!((p.width(), p.height()), (5, 4)),
        vello_cpu::ImageSource::OpaqueId(_) => panic!("expected pixmap"),
    }
}
