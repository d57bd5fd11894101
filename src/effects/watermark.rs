use serde_json::Value;

use crate::assets::decode::{DecodedImage, decode_base64_image};
use crate::audio::params::AudioVisualParameters;
use crate::effects::config::{EffectCommon, EffectConfig, WatermarkConfig, WatermarkPosition};
use crate::effects::effect::{VisualEffect, merge_variant, render_chain};
use crate::effects::node::{BlendNode, EffectNode, NodeChain, NodeContext, StyleNode, TransformNode};
use crate::foundation::core::{Point, Rect};
use crate::foundation::error::WavecastResult;
use crate::render::surface::Surface;

/// Draws the decoded watermark image at its placement and anchors the rotation on its center.
pub struct WatermarkStyle {
    image: Option<(DecodedImage, vello_cpu::Image)>,
    position: WatermarkPosition,
    scale: f64,
    margin: f64,
}

impl std::fmt::Debug for WatermarkStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkStyle")
            .field("image", &self.image.as_ref().map(|(img, _)| img))
            .field("position", &self.position)
            .field("scale", &self.scale)
            .field("margin", &self.margin)
            .finish()
    }
}

impl WatermarkStyle {
    fn new(config: &WatermarkConfig) -> WavecastResult<Self> {
        let image = match config.image_data.as_deref() {
            Some(data) => {
                let decoded = decode_base64_image(data)?;
                let paint = decoded.to_paint()?;
                Some((decoded, paint))
            }
            None => None,
        };
        Ok(Self {
            image,
            position: config.position,
            scale: config.scale,
            margin: config.margin,
        })
    }

    pub(crate) fn paint(&self, ctx: &mut NodeContext<'_>) -> WavecastResult<()> {
        let Some((img, paint)) = &self.image else {
            return Ok(());
        };
        let (iw, ih) = (f64::from(img.width), f64::from(img.height));
        let rect = placement(
            self.position,
            f64::from(ctx.canvas.width),
            f64::from(ctx.canvas.height),
            iw * self.scale,
            ih * self.scale,
            self.margin,
        );
        ctx.anchor = Some(rect.center());

        let scale = self.scale;
        ctx.layer.paint(|rc| {
            rc.set_transform(
                vello_cpu::kurbo::Affine::translate((rect.x0, rect.y0))
                    * vello_cpu::kurbo::Affine::scale(scale),
            );
            rc.set_paint(paint.clone());
            rc.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, iw, ih));
            Ok(())
        })
    }
}

/// Canvas rectangle occupied by a `w x h` watermark on a `cw x ch` canvas.
pub fn placement(position: WatermarkPosition, cw: f64, ch: f64, w: f64, h: f64, margin: f64) -> Rect {
    let origin = match position {
        WatermarkPosition::TopLeft => Point::new(margin, margin),
        WatermarkPosition::TopRight => Point::new(cw - w - margin, margin),
        WatermarkPosition::BottomLeft => Point::new(margin, ch - h - margin),
        WatermarkPosition::BottomRight => Point::new(cw - w - margin, ch - h - margin),
        WatermarkPosition::Center => Point::new((cw - w) * 0.5, (ch - h) * 0.5),
        WatermarkPosition::Custom { x, y } => Point::new(x * cw, y * ch),
    };
    Rect::from_origin_size(origin, (w, h))
}

/// Image overlay with corner/center/custom placement, scale and rotation.
pub struct WatermarkEffect {
    config: WatermarkConfig,
    chain: Option<NodeChain>,
}

impl std::fmt::Debug for WatermarkEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkEffect")
            .field("id", &self.config.common.id)
            .field("disposed", &self.chain.is_none())
            .finish()
    }
}

impl WatermarkEffect {
    pub fn new(config: WatermarkConfig) -> WavecastResult<Self> {
        let chain = build_chain(&config)?;
        Ok(Self {
            config,
            chain: Some(chain),
        })
    }
}

fn build_chain(config: &WatermarkConfig) -> WavecastResult<NodeChain> {
    NodeChain::new(vec![
        EffectNode::Style(StyleNode::Watermark(WatermarkStyle::new(config)?)),
        EffectNode::Blend(BlendNode),
        EffectNode::Transform(TransformNode::rotate(config.rotation_deg)),
    ])
}

impl VisualEffect for WatermarkEffect {
    fn config(&self) -> EffectConfig {
        EffectConfig::Watermark(self.config.clone())
    }

    fn common(&self) -> &EffectCommon {
        &self.config.common
    }

    fn render(&mut self, params: &AudioVisualParameters, target: &mut Surface) -> WavecastResult<()> {
        render_chain(&self.config.common, self.chain.as_mut(), params, target)
    }

    fn update_config(&mut self, patch: &Value) -> WavecastResult<()> {
        let next = merge_variant(&self.config(), patch, self.chain.is_none(), |c| match c {
            EffectConfig::Watermark(c) => Some(c),
            _ => None,
        })?;
        self.chain = Some(build_chain(&next)?);
        self.config = next;
        Ok(())
    }

    fn dispose(&mut self) {
        self.chain = None;
    }

    fn is_disposed(&self) -> bool {
        self.chain.is_none()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/watermark.rs"]
mod tests;
