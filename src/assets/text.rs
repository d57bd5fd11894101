use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::foundation::error::{WavecastError, WavecastResult};

/// Straight-alpha RGBA8 brush carried through Parley layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrushRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Font bytes loaded once and shared between the layout engine and the rasterizer.
#[derive(Clone)]
pub struct LoadedFont {
    pub bytes: Arc<Vec<u8>>,
    pub family: String,
}

impl std::fmt::Debug for LoadedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedFont")
            .field("family", &self.family)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl LoadedFont {
    pub(crate) fn to_cpu(&self) -> vello_cpu::peniko::FontData {
        vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(self.bytes.as_ref().clone()),
            0,
        )
    }
}

pub fn read_font_file(path: &Path) -> WavecastResult<Vec<u8>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read font file {}", path.display()))?;
    Ok(bytes)
}

/// Stateful helper for building Parley text layouts from raw font bytes.
pub struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TextLayoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextLayoutEngine").finish_non_exhaustive()
    }
}

impl TextLayoutEngine {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// Register font bytes and resolve the family name used for layout.
    pub fn load_font(&mut self, font_bytes: Vec<u8>) -> WavecastResult<LoadedFont> {
        let bytes = Arc::new(font_bytes);
        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes.as_ref().clone()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            WavecastError::validation("no font families registered from font bytes")
        })?;

        let family = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| WavecastError::validation("registered font family has no name"))?
            .to_string();
        Ok(LoadedFont { bytes, family })
    }

    /// Shape and lay out plain text with a font previously returned by [`Self::load_font`].
    pub fn layout_plain(
        &mut self,
        text: &str,
        font: &LoadedFont,
        size_px: f32,
        brush: TextBrushRgba8,
        max_width_px: Option<f32>,
    ) -> WavecastResult<parley::Layout<TextBrushRgba8>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(WavecastError::validation(
                "text size_px must be finite and > 0",
            ));
        }

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(font.family.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        let max_width_px = max_width_px.filter(|w| w.is_finite() && *w > 0.0);
        layout.break_all_lines(max_width_px);
        layout.align(
            max_width_px,
            parley::Alignment::Start,
            parley::AlignmentOptions::default(),
        );

        Ok(layout)
    }
}
