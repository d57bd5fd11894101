use std::path::PathBuf;

use serde_json::Value;

use crate::assets::text::{LoadedFont, TextBrushRgba8, TextLayoutEngine, read_font_file};
use crate::audio::params::AudioVisualParameters;
use crate::effects::config::{EffectCommon, EffectConfig, RelPoint, TextAlign, TextConfig};
use crate::effects::effect::{VisualEffect, merge_variant, render_chain};
use crate::effects::node::{BlendNode, EffectNode, NodeChain, NodeContext, StyleNode, TransformNode};
use crate::foundation::error::WavecastResult;
use crate::render::surface::Surface;

struct PreparedText {
    layout: parley::Layout<TextBrushRgba8>,
    font: vello_cpu::peniko::FontData,
}

/// Glyph runs of a prepared Parley layout, anchored at a canvas-relative point.
pub struct TextStyle {
    prepared: Option<PreparedText>,
    position: RelPoint,
    align: TextAlign,
}

impl std::fmt::Debug for TextStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextStyle")
            .field("prepared", &self.prepared.is_some())
            .field("position", &self.position)
            .field("align", &self.align)
            .finish()
    }
}

impl TextStyle {
    fn new(
        config: &TextConfig,
        font: Option<&LoadedFont>,
        engine: &mut TextLayoutEngine,
    ) -> WavecastResult<Self> {
        let prepared = match font {
            Some(font) if !config.text.is_empty() => {
                let c = config.color;
                let layout = engine.layout_plain(
                    &config.text,
                    font,
                    config.font_size,
                    TextBrushRgba8 {
                        r: c.r,
                        g: c.g,
                        b: c.b,
                        a: c.a,
                    },
                    config.max_width,
                )?;
                Some(PreparedText {
                    layout,
                    font: font.to_cpu(),
                })
            }
            _ => None,
        };
        Ok(Self {
            prepared,
            position: config.position,
            align: config.align,
        })
    }

    pub fn has_layout(&self) -> bool {
        self.prepared.is_some()
    }

    pub(crate) fn paint(&self, ctx: &mut NodeContext<'_>) -> WavecastResult<()> {
        let Some(prepared) = &self.prepared else {
            return Ok(());
        };
        let f = self.align.anchor_factor();
        let anchor_x = self.position.x * f64::from(ctx.canvas.width);
        let anchor_y = self.position.y * f64::from(ctx.canvas.height);
        let block_w = prepared.layout.width();
        let left = anchor_x - f64::from(block_w * f);

        ctx.layer.paint(|rc| {
            for line in prepared.layout.lines() {
                let dx = left + f64::from((block_w - line.metrics().advance) * f);
                rc.set_transform(vello_cpu::kurbo::Affine::translate((dx, anchor_y)));
                for item in line.items() {
                    let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                        continue;
                    };

                    let brush = run.style().brush;
                    rc.set_paint(vello_cpu::peniko::Color::from_rgba8(
                        brush.r, brush.g, brush.b, brush.a,
                    ));

                    let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                        id: g.id,
                        x: g.x,
                        y: g.y,
                    });
                    rc.glyph_run(&prepared.font)
                        .font_size(run.run().font_size())
                        .fill_glyphs(glyphs);
                }
            }
            Ok(())
        })
    }
}

/// Static text. Renders nothing until a font is available.
pub struct TextEffect {
    config: TextConfig,
    engine: TextLayoutEngine,
    font: Option<(Option<PathBuf>, LoadedFont)>,
    chain: Option<NodeChain>,
}

impl std::fmt::Debug for TextEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextEffect")
            .field("id", &self.config.common.id)
            .field("font", &self.font.as_ref().map(|(_, f)| &f.family))
            .field("disposed", &self.chain.is_none())
            .finish()
    }
}

impl TextEffect {
    pub fn new(config: TextConfig) -> WavecastResult<Self> {
        let mut effect = Self {
            config,
            engine: TextLayoutEngine::new(),
            font: None,
            chain: None,
        };
        let config = effect.config.clone();
        effect.apply_config(config)?;
        Ok(effect)
    }

    /// Use in-memory font bytes instead of `fontPath`.
    pub fn with_font_bytes(config: TextConfig, font_bytes: Vec<u8>) -> WavecastResult<Self> {
        let mut engine = TextLayoutEngine::new();
        let font = engine.load_font(font_bytes)?;
        let mut effect = Self {
            config,
            engine,
            font: Some((None, font)),
            chain: None,
        };
        let font = effect.font.as_ref().map(|(_, f)| f);
        effect.chain = Some(build_chain(&mut effect.engine, &effect.config, font)?);
        Ok(effect)
    }

    pub fn font_family(&self) -> Option<&str> {
        self.font.as_ref().map(|(_, f)| f.family.as_str())
    }

    /// Font `config` asks for, when its `fontPath` differs from the loaded one.
    fn load_font_for(
        &mut self,
        config: &TextConfig,
    ) -> WavecastResult<Option<(PathBuf, LoadedFont)>> {
        let Some(path) = config.font_path.clone() else {
            return Ok(None);
        };
        if let Some((Some(loaded), _)) = &self.font
            && *loaded == path
        {
            return Ok(None);
        }
        let bytes = read_font_file(&path)?;
        let font = self.engine.load_font(bytes)?;
        tracing::debug!(path = %path.display(), family = %font.family, "font loaded");
        Ok(Some((path, font)))
    }

    /// Rebuild for `next`; font, chain and config change together or not at all.
    fn apply_config(&mut self, next: TextConfig) -> WavecastResult<()> {
        let loaded = self.load_font_for(&next)?;
        let font = match &loaded {
            Some((_, font)) => Some(font),
            None => self.font.as_ref().map(|(_, f)| f),
        };
        let chain = build_chain(&mut self.engine, &next, font)?;
        if let Some((path, font)) = loaded {
            self.font = Some((Some(path), font));
        }
        self.chain = Some(chain);
        self.config = next;
        Ok(())
    }
}

fn build_chain(
    engine: &mut TextLayoutEngine,
    config: &TextConfig,
    font: Option<&LoadedFont>,
) -> WavecastResult<NodeChain> {
    let style = TextStyle::new(config, font, engine)?;
    NodeChain::new(vec![
        EffectNode::Style(StyleNode::Text(style)),
        EffectNode::Blend(BlendNode),
        EffectNode::Transform(TransformNode::identity()),
    ])
}

impl VisualEffect for TextEffect {
    fn config(&self) -> EffectConfig {
        EffectConfig::Text(self.config.clone())
    }

    fn common(&self) -> &EffectCommon {
        &self.config.common
    }

    fn render(&mut self, params: &AudioVisualParameters, target: &mut Surface) -> WavecastResult<()> {
        render_chain(&self.config.common, self.chain.as_mut(), params, target)
    }

    fn update_config(&mut self, patch: &Value) -> WavecastResult<()> {
        let next = merge_variant(&self.config(), patch, self.chain.is_none(), |c| match c {
            EffectConfig::Text(c) => Some(c),
            _ => None,
        })?;
        self.apply_config(next)
    }

    fn dispose(&mut self) {
        self.font = None;
        self.chain = None;
    }

    fn is_disposed(&self) -> bool {
        self.chain.is_none()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/text.rs"]
mod tests;
