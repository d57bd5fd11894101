use std::sync::Arc;

use anyhow::Context;
use base64::Engine as _;

use crate::foundation::error::{WavecastError, WavecastResult};
use crate::render::layer::{pixmap_paint, premul_bytes_to_pixmap};

/// Decoded raster image, premultiplied RGBA8.
#[derive(Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba8_premul.len())
            .finish()
    }
}

impl DecodedImage {
    /// Image paint ready to be drawn with a `vello_cpu` context.
    pub(crate) fn to_paint(&self) -> WavecastResult<vello_cpu::Image> {
        let pixmap = premul_bytes_to_pixmap(&self.rgba8_premul, self.width, self.height)?;
        Ok(pixmap_paint(pixmap))
    }
}

pub fn decode_image(bytes: &[u8]) -> WavecastResult<DecodedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(WavecastError::validation("decoded image has zero size"));
    }

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(DecodedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

/// Decode base64 image data, with or without a `data:<mime>;base64,` prefix.
pub fn decode_base64_image(data: &str) -> WavecastResult<DecodedImage> {
    let bytes = decode_base64(data)?;
    decode_image(&bytes)
}

pub fn decode_base64(data: &str) -> WavecastResult<Vec<u8>> {
    let payload = strip_data_uri(data.trim())?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| WavecastError::validation(format!("invalid base64 image data: {e}")))?;
    Ok(bytes)
}

/// Encode image bytes as a `data:` URI for inline persistence.
pub fn encode_data_uri(bytes: &[u8], mime: &str) -> String {
    let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{payload}")
}

fn strip_data_uri(data: &str) -> WavecastResult<&str> {
    let Some(rest) = data.strip_prefix("data:") else {
        return Ok(data);
    };
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| WavecastError::validation("data URI is missing ','"))?;
    if !meta.ends_with(";base64") {
        return Err(WavecastError::validation("data URI must be base64 encoded"));
    }
    Ok(payload)
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
