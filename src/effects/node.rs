use std::sync::Arc;

use crate::audio::analysis::{WaveformSummary, peak};
use crate::audio::params::AudioVisualParameters;
use crate::effects::background::BackgroundStyle;
use crate::effects::text::TextStyle;
use crate::effects::watermark::WatermarkStyle;
use crate::effects::waveform::WaveformPaint;
use crate::foundation::core::{Affine, Canvas, Point};
use crate::foundation::error::{WavecastError, WavecastResult};
use crate::render::composite::Composite;
use crate::render::layer::Layer;
use crate::render::surface::Surface;

/// Stage kind of an [`EffectNode`], in required chain order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeStage {
    Data,
    Style,
    Blend,
    Transform,
}

/// Per-frame state handed from node to node.
pub struct NodeContext<'a> {
    pub params: &'a AudioVisualParameters,
    pub canvas: Canvas,
    /// Normalized bar heights in `[0, 1]` written by the data node.
    pub bars: Vec<f32>,
    /// Overall signal level in `[0, 1]` written by the data node.
    pub level: f32,
    pub layer: &'a mut Layer,
    /// Pivot for the transform node, in canvas pixels; the origin when unset.
    pub anchor: Option<Point>,
    /// Composite resolved by the blend node; opaque source-over until then.
    pub composite: Composite,
}

/// One processing stage of an effect.
pub enum EffectNode {
    Data(DataNode),
    Style(StyleNode),
    Blend(BlendNode),
    Transform(TransformNode),
}

impl EffectNode {
    pub fn stage(&self) -> NodeStage {
        match self {
            Self::Data(_) => NodeStage::Data,
            Self::Style(_) => NodeStage::Style,
            Self::Blend(_) => NodeStage::Blend,
            Self::Transform(_) => NodeStage::Transform,
        }
    }

    fn process(&mut self, ctx: &mut NodeContext<'_>, target: &mut Surface) -> WavecastResult<()> {
        if target.is_degenerate() {
            return Ok(());
        }
        match self {
            Self::Data(n) => {
                n.process(ctx);
                Ok(())
            }
            Self::Style(n) => n.process(ctx),
            Self::Blend(n) => {
                n.process(ctx, target);
                Ok(())
            }
            Self::Transform(n) => n.process(ctx, target),
        }
    }
}

impl std::fmt::Debug for EffectNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EffectNode").field(&self.stage()).finish()
    }
}

/// Linear chain of nodes owned by one effect, plus the layer its style node paints into.
pub struct NodeChain {
    nodes: Vec<EffectNode>,
    layer: Option<Layer>,
}

impl std::fmt::Debug for NodeChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeChain")
            .field("stages", &self.stages())
            .finish_non_exhaustive()
    }
}

impl NodeChain {
    /// Build a chain. Stages must appear in data, style, blend, transform order, each at most
    /// once; style and the terminal transform are required.
    pub fn new(nodes: Vec<EffectNode>) -> WavecastResult<Self> {
        let stages: Vec<NodeStage> = nodes.iter().map(EffectNode::stage).collect();
        if !stages.windows(2).all(|w| w[0] < w[1]) {
            return Err(WavecastError::validation(format!(
                "node stages out of order: {stages:?}"
            )));
        }
        if !stages.contains(&NodeStage::Style) {
            return Err(WavecastError::validation("node chain needs a style node"));
        }
        if stages.last() != Some(&NodeStage::Transform) {
            return Err(WavecastError::validation(
                "node chain must end with a transform node",
            ));
        }
        Ok(Self { nodes, layer: None })
    }

    pub fn stages(&self) -> Vec<NodeStage> {
        self.nodes.iter().map(EffectNode::stage).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Walk the chain once for `params`, presenting the result onto `target`.
    pub fn process(
        &mut self,
        params: &AudioVisualParameters,
        target: &mut Surface,
    ) -> WavecastResult<()> {
        if target.is_degenerate() {
            return Ok(());
        }
        let canvas = target.canvas();
        let layer = match &mut self.layer {
            Some(layer) => {
                layer.ensure_size(canvas)?;
                layer
            }
            None => self.layer.insert(Layer::new(canvas)?),
        };
        layer.clear();

        let mut ctx = NodeContext {
            params,
            canvas,
            bars: Vec::new(),
            level: 0.0,
            layer,
            anchor: None,
            composite: Composite::default(),
        };
        for node in &mut self.nodes {
            node.process(&mut ctx, target)?;
        }
        Ok(())
    }
}

/// Where the data node reads waveform values from.
#[derive(Debug)]
pub enum BarSource {
    /// Rolling window of the current parameters; keeps the previous frame for smoothing.
    Realtime { previous: Vec<f32> },
    /// Precomputed whole-track summary indexed by playback time.
    Offline {
        summary: Arc<WaveformSummary>,
        duration_secs: f64,
    },
}

/// Extracts normalized bar heights and the overall level.
#[derive(Debug)]
pub struct DataNode {
    bar_count: usize,
    amplification: f32,
    smoothing: f32,
    source: BarSource,
}

impl DataNode {
    pub fn new(bar_count: usize, amplification: f32, smoothing: f32, source: BarSource) -> Self {
        Self {
            bar_count: bar_count.max(1),
            amplification,
            smoothing: smoothing.clamp(0.0, 0.99),
            source,
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.source, BarSource::Offline { .. })
    }

    fn process(&mut self, ctx: &mut NodeContext<'_>) {
        let n = self.bar_count;
        let amp = self.amplification;
        let s = self.smoothing;

        let bars = match &mut self.source {
            BarSource::Realtime { previous } => {
                let window = &ctx.params.time_domain;
                let mut bars: Vec<f32> = (0..n)
                    .map(|i| {
                        let start = i * window.len() / n;
                        let end = ((i + 1) * window.len() / n).max(start);
                        (peak(&window[start..end]) * amp).clamp(0.0, 1.0)
                    })
                    .collect();
                if previous.len() == n {
                    for (v, p) in bars.iter_mut().zip(previous.iter()) {
                        *v = *p * s + *v * (1.0 - s);
                    }
                }
                previous.clone_from(&bars);
                bars
            }
            BarSource::Offline {
                summary,
                duration_secs,
            } => {
                let raw = offline_window(summary, ctx.params.current_time, *duration_secs, n);
                smooth_spatial(&raw, s)
                    .into_iter()
                    .map(|v| (v * amp).clamp(0.0, 1.0))
                    .collect()
            }
        };

        ctx.level = (ctx.params.level() * amp).clamp(0.0, 1.0);
        ctx.bars = bars;
    }
}

/// `n` peaks centred on the segment under `time_secs`; missing segments read as silence.
fn offline_window(summary: &WaveformSummary, time_secs: f64, duration: f64, n: usize) -> Vec<f32> {
    let Some(center) = summary.segment_at(time_secs, duration) else {
        return vec![0.0; n];
    };
    let first = center as isize - (n / 2) as isize;
    (0..n)
        .map(|i| {
            let idx = first + i as isize;
            usize::try_from(idx)
                .ok()
                .and_then(|idx| summary.peaks.get(idx).copied())
                .unwrap_or(0.0)
        })
        .collect()
}

fn smooth_spatial(values: &[f32], s: f32) -> Vec<f32> {
    if s <= 0.0 || values.len() < 3 {
        return values.to_vec();
    }
    (0..values.len())
        .map(|i| {
            let left = if i == 0 { values[i] } else { values[i - 1] };
            let right = values.get(i + 1).copied().unwrap_or(values[i]);
            values[i] * (1.0 - s) + (left + right) * 0.5 * s
        })
        .collect()
}

/// Paints effect content into the layer.
#[derive(Debug)]
pub enum StyleNode {
    Background(BackgroundStyle),
    Waveform(WaveformPaint),
    Text(TextStyle),
    Watermark(WatermarkStyle),
}

impl StyleNode {
    fn process(&mut self, ctx: &mut NodeContext<'_>) -> WavecastResult<()> {
        if ctx.layer.is_degenerate() {
            return Ok(());
        }
        match self {
            Self::Background(s) => s.paint(ctx),
            Self::Waveform(s) => s.paint(ctx),
            Self::Text(s) => s.paint(ctx),
            Self::Watermark(s) => s.paint(ctx),
        }
    }
}

/// Resolves the layer composite from the target's current draw state.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlendNode;

impl BlendNode {
    fn process(&self, ctx: &mut NodeContext<'_>, target: &Surface) {
        let state = target.draw_state();
        ctx.composite = Composite {
            alpha: state.global_alpha,
            mode: state.blend_mode,
        };
    }
}

/// Terminal node: maps the layer through an affine about the context anchor and presents it
/// onto the target.
#[derive(Clone, Copy, Debug)]
pub struct TransformNode {
    transform: Affine,
}

impl Default for TransformNode {
    fn default() -> Self {
        Self::identity()
    }
}

impl TransformNode {
    pub fn identity() -> Self {
        Self {
            transform: Affine::IDENTITY,
        }
    }

    pub fn new(transform: Affine) -> Self {
        Self { transform }
    }

    pub fn rotate(degrees: f64) -> Self {
        Self::new(Affine::rotate(degrees.to_radians()))
    }

    pub fn transform(&self) -> Affine {
        self.transform
    }

    fn process(&self, ctx: &mut NodeContext<'_>, target: &mut Surface) -> WavecastResult<()> {
        if !ctx.layer.is_painted() {
            return Ok(());
        }
        if self.transform == Affine::IDENTITY {
            return target.draw_layer(ctx.layer.data(), ctx.composite);
        }
        let pivot = ctx.anchor.unwrap_or(Point::ORIGIN).to_vec2();
        let about = Affine::translate(pivot) * self.transform * Affine::translate(-pivot);
        let warped = ctx.layer.transformed(about)?;
        target.draw_layer(&warped, ctx.composite)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/node.rs"]
mod tests;
