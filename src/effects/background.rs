use serde_json::Value;

use crate::assets::decode::{DecodedImage, decode_base64_image};
use crate::audio::params::AudioVisualParameters;
use crate::effects::config::{BackgroundConfig, EffectCommon, EffectConfig, Gradient, ImageFit};
use crate::effects::effect::{VisualEffect, merge_variant, render_chain};
use crate::effects::node::{BlendNode, EffectNode, NodeChain, NodeContext, StyleNode, TransformNode};
use crate::foundation::color::ColorDef;
use crate::foundation::error::WavecastResult;
use crate::render::surface::Surface;

/// Full-canvas fill: solid color, linear gradient, and an optional image on top.
pub struct BackgroundStyle {
    color: ColorDef,
    gradient: Option<Gradient>,
    image: Option<(DecodedImage, vello_cpu::Image)>,
    fit: ImageFit,
}

impl std::fmt::Debug for BackgroundStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundStyle")
            .field("color", &self.color)
            .field("gradient", &self.gradient)
            .field("image", &self.image.as_ref().map(|(img, _)| img))
            .field("fit", &self.fit)
            .finish()
    }
}

impl BackgroundStyle {
    pub fn new(config: &BackgroundConfig) -> WavecastResult<Self> {
        let image = match config.image_data.as_deref() {
            Some(data) => {
                let decoded = decode_base64_image(data)?;
                let paint = decoded.to_paint()?;
                Some((decoded, paint))
            }
            None => None,
        };
        Ok(Self {
            color: config.color,
            gradient: config.gradient,
            image,
            fit: config.image_fit,
        })
    }

    pub(crate) fn paint(&self, ctx: &mut NodeContext<'_>) -> WavecastResult<()> {
        let w = f64::from(ctx.canvas.width);
        let h = f64::from(ctx.canvas.height);
        let full = vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h);

        ctx.layer.paint(|rc| {
            match self.gradient {
                Some(g) => rc.set_paint(linear_gradient(g, w, h)),
                None => rc.set_paint(self.color.to_cpu()),
            }
            rc.fill_rect(&full);

            if let Some((img, paint)) = &self.image {
                let (iw, ih) = (f64::from(img.width), f64::from(img.height));
                let (sx, sy) = fit_scale(self.fit, iw, ih, w, h);
                let tx = (w - iw * sx) * 0.5;
                let ty = (h - ih * sy) * 0.5;
                rc.set_transform(
                    vello_cpu::kurbo::Affine::translate((tx, ty))
                        * vello_cpu::kurbo::Affine::scale_non_uniform(sx, sy),
                );
                rc.set_paint(paint.clone());
                rc.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, iw, ih));
            }
            Ok(())
        })
    }
}

/// Scale factors that map an `iw x ih` image into a `w x h` box.
pub fn fit_scale(fit: ImageFit, iw: f64, ih: f64, w: f64, h: f64) -> (f64, f64) {
    if iw <= 0.0 || ih <= 0.0 {
        return (1.0, 1.0);
    }
    let sx = w / iw;
    let sy = h / ih;
    match fit {
        ImageFit::Cover => {
            let s = sx.max(sy);
            (s, s)
        }
        ImageFit::Contain => {
            let s = sx.min(sy);
            (s, s)
        }
        ImageFit::Stretch => (sx, sy),
    }
}

// CSS angle convention: 0deg points up, 90deg points right.
fn linear_gradient(g: Gradient, w: f64, h: f64) -> vello_cpu::peniko::Gradient {
    let a = g.angle_deg.to_radians();
    let (dx, dy) = (a.sin(), -a.cos());
    let half = (w * dx.abs() + h * dy.abs()) * 0.5;
    let (cx, cy) = (w * 0.5, h * 0.5);
    vello_cpu::peniko::Gradient::new_linear(
        vello_cpu::kurbo::Point::new(cx - dx * half, cy - dy * half),
        vello_cpu::kurbo::Point::new(cx + dx * half, cy + dy * half),
    )
    .with_stops([g.from.to_cpu(), g.to.to_cpu()])
}

pub struct BackgroundEffect {
    config: BackgroundConfig,
    chain: Option<NodeChain>,
}

impl std::fmt::Debug for BackgroundEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundEffect")
            .field("id", &self.config.common.id)
            .field("disposed", &self.chain.is_none())
            .finish()
    }
}

impl BackgroundEffect {
    pub fn new(config: BackgroundConfig) -> WavecastResult<Self> {
        let chain = build_chain(&config)?;
        Ok(Self {
            config,
            chain: Some(chain),
        })
    }
}

fn build_chain(config: &BackgroundConfig) -> WavecastResult<NodeChain> {
    NodeChain::new(vec![
        EffectNode::Style(StyleNode::Background(BackgroundStyle::new(config)?)),
        EffectNode::Blend(BlendNode),
        EffectNode::Transform(TransformNode::identity()),
    ])
}

impl VisualEffect for BackgroundEffect {
    fn config(&self) -> EffectConfig {
        EffectConfig::Background(self.config.clone())
    }

    fn common(&self) -> &EffectCommon {
        &self.config.common
    }

    fn render(&mut self, params: &AudioVisualParameters, target: &mut Surface) -> WavecastResult<()> {
        render_chain(&self.config.common, self.chain.as_mut(), params, target)
    }

    fn update_config(&mut self, patch: &Value) -> WavecastResult<()> {
        let next = merge_variant(&self.config(), patch, self.chain.is_none(), |c| match c {
            EffectConfig::Background(c) => Some(c),
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
