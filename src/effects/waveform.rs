use std::sync::Arc;

use serde_json::Value;

use crate::audio::analysis::WaveformSummary;
use crate::audio::params::AudioVisualParameters;
use crate::audio::source::AudioSource;
use crate::audio::worker::{AnalysisRequest, AnalysisTicket, AnalysisWorker};
use crate::effects::config::{EffectCommon, EffectConfig, RelPoint, RelSize, WaveformConfig, WaveformStyle};
use crate::effects::effect::{VisualEffect, merge_variant, render_chain};
use crate::effects::node::{
    BarSource, BlendNode, DataNode, EffectNode, NodeChain, NodeContext, StyleNode, TransformNode,
};
use crate::foundation::color::ColorDef;
use crate::foundation::error::{WavecastError, WavecastResult};
use crate::render::surface::Surface;

/// Offline analysis progress of a waveform effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisPhase {
    Live,
    AnalyzingOffline,
    OfflineReady,
}

enum AnalysisState {
    Live,
    AnalyzingOffline {
        ticket: AnalysisTicket,
        duration_secs: f64,
    },
    OfflineReady {
        summary: Arc<WaveformSummary>,
        duration_secs: f64,
    },
}

impl AnalysisState {
    fn phase(&self) -> AnalysisPhase {
        match self {
            Self::Live => AnalysisPhase::Live,
            Self::AnalyzingOffline { .. } => AnalysisPhase::AnalyzingOffline,
            Self::OfflineReady { .. } => AnalysisPhase::OfflineReady,
        }
    }
}

/// Draws bar heights from the data node as bars, mirrored bars, or a line.
#[derive(Debug)]
pub struct WaveformPaint {
    style: WaveformStyle,
    color: ColorDef,
    bar_gap: f64,
    line_width: f64,
    position: RelPoint,
    size: RelSize,
}

impl WaveformPaint {
    pub fn new(config: &WaveformConfig) -> Self {
        Self {
            style: config.style,
            color: config.color,
            bar_gap: f64::from(config.bar_gap),
            line_width: f64::from(config.line_width),
            position: config.position,
            size: config.size,
        }
    }

    pub(crate) fn paint(&self, ctx: &mut NodeContext<'_>) -> WavecastResult<()> {
        let n = ctx.bars.len();
        if n == 0 {
            return Ok(());
        }
        let cw = f64::from(ctx.canvas.width);
        let ch = f64::from(ctx.canvas.height);
        let rx = self.position.x * cw;
        let ry = self.position.y * ch;
        let rw = self.size.width * cw;
        let rh = self.size.height * ch;
        if rw <= 0.0 || rh <= 0.0 {
            return Ok(());
        }

        let mut gap = self.bar_gap;
        if gap * (n as f64 - 1.0) >= rw {
            gap = 0.0;
        }
        let bar_w = (rw - gap * (n as f64 - 1.0)) / n as f64;
        let center_y = ry + rh * 0.5;
        let bars = &ctx.bars;

        ctx.layer.paint(|rc| {
            rc.set_paint(self.color.to_cpu());
            match self.style {
                WaveformStyle::Bars => {
                    for (i, v) in bars.iter().enumerate() {
                        let h = f64::from(*v) * rh;
                        if h <= 0.0 {
                            continue;
                        }
                        let x = rx + i as f64 * (bar_w + gap);
                        rc.fill_rect(&vello_cpu::kurbo::Rect::new(x, ry + rh - h, x + bar_w, ry + rh));
                    }
                }
                WaveformStyle::Mirror => {
                    for (i, v) in bars.iter().enumerate() {
                        let half = f64::from(*v) * rh * 0.5;
                        if half <= 0.0 {
                            continue;
                        }
                        let x = rx + i as f64 * (bar_w + gap);
                        rc.fill_rect(&vello_cpu::kurbo::Rect::new(
                            x,
                            center_y - half,
                            x + bar_w,
                            center_y + half,
                        ));
                    }
                }
                WaveformStyle::Line => {
                    let points: Vec<(f64, f64)> = bars
                        .iter()
                        .enumerate()
                        .map(|(i, v)| {
                            let x = rx + i as f64 * (bar_w + gap) + bar_w * 0.5;
                            (x, center_y - f64::from(*v) * rh * 0.5)
                        })
                        .collect();
                    let path = stroke_polyline(&points, self.line_width);
                    rc.fill_path(&path);
                }
            }
            Ok(())
        })
    }
}

// Outline of a polyline as one quad per segment, filled with the nonzero rule.
fn stroke_polyline(points: &[(f64, f64)], width: f64) -> vello_cpu::kurbo::BezPath {
    let mut path = vello_cpu::kurbo::BezPath::new();
    let half = width * 0.5;
    let mut segments: Vec<((f64, f64), (f64, f64))> =
        points.windows(2).map(|w| (w[0], w[1])).collect();
    if let [only] = points {
        segments.push(((only.0 - half, only.1), (only.0 + half, only.1)));
    }

    for ((x0, y0), (x1, y1)) in segments {
        let (dx, dy) = (x1 - x0, y1 - y0);
        let len = (dx * dx + dy * dy).sqrt();
        if len <= f64::EPSILON {
            continue;
        }
        let (nx, ny) = (-dy / len * half, dx / len * half);
        path.move_to((x0 + nx, y0 + ny));
        path.line_to((x1 + nx, y1 + ny));
        path.line_to((x1 - nx, y1 - ny));
        path.line_to((x0 - nx, y0 - ny));
        path.close_path();
    }
    path
}

/// Audio-reactive waveform with realtime or precomputed offline analysis.
pub struct WaveformEffect {
    config: WaveformConfig,
    state: AnalysisState,
    chain: Option<NodeChain>,
}

impl std::fmt::Debug for WaveformEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveformEffect")
            .field("id", &self.config.common.id)
            .field("phase", &self.state.phase())
            .field("disposed", &self.chain.is_none())
            .finish()
    }
}

impl WaveformEffect {
    pub fn new(config: WaveformConfig) -> WavecastResult<Self> {
        let state = AnalysisState::Live;
        let chain = build_chain(&config, &state)?;
        Ok(Self {
            config,
            state,
            chain: Some(chain),
        })
    }

    pub fn waveform_config(&self) -> &WaveformConfig {
        &self.config
    }

    pub fn analysis_phase(&self) -> AnalysisPhase {
        self.state.phase()
    }

    /// Precomputed summary, once offline analysis completed.
    pub fn offline_summary(&self) -> Option<Arc<WaveformSummary>> {
        match &self.state {
            AnalysisState::OfflineReady { summary, .. } => Some(summary.clone()),
            _ => None,
        }
    }

    /// Submit the mono mix of `source` to `worker`; the effect draws nothing until
    /// [`Self::wait_for_offline_analysis`] completes.
    pub fn start_offline_analysis(
        &mut self,
        source: &AudioSource,
        segment_count: usize,
        worker: &AnalysisWorker,
    ) -> WavecastResult<()> {
        self.ensure_live()?;
        let ticket = worker.submit(AnalysisRequest::Analyze {
            channel_data: source.mono_mix(),
            sample_rate: source.sample_rate(),
            segment_count,
        })?;
        tracing::debug!(
            effect = %self.config.common.id,
            segment_count,
            "offline waveform analysis started"
        );
        self.state = AnalysisState::AnalyzingOffline {
            ticket,
            duration_secs: source.duration_secs(),
        };
        Ok(())
    }

    /// Block until a pending offline analysis finishes. No-op unless analyzing.
    ///
    /// A failed analysis returns the effect to realtime mode.
    pub fn wait_for_offline_analysis(&mut self) -> WavecastResult<()> {
        let AnalysisState::AnalyzingOffline { .. } = self.state else {
            return Ok(());
        };
        let AnalysisState::AnalyzingOffline {
            ticket,
            duration_secs,
        } = std::mem::replace(&mut self.state, AnalysisState::Live)
        else {
            return Ok(());
        };
        match ticket.wait() {
            Ok(summary) => self.set_offline_summary(Arc::new(summary), duration_secs),
            Err(e) => {
                self.rebuild()?;
                Err(e)
            }
        }
    }

    /// Non-blocking variant of [`Self::wait_for_offline_analysis`]; `Ok(true)` once ready.
    pub fn poll_offline_analysis(&mut self) -> WavecastResult<bool> {
        let AnalysisState::AnalyzingOffline {
            ticket,
            duration_secs,
        } = &mut self.state
        else {
            return Ok(matches!(self.state, AnalysisState::OfflineReady { .. }));
        };
        let duration_secs = *duration_secs;
        match ticket.try_take() {
            Ok(Some(summary)) => {
                self.set_offline_summary(Arc::new(summary), duration_secs)?;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                self.state = AnalysisState::Live;
                self.rebuild()?;
                Err(e)
            }
        }
    }

    /// Switch directly to offline mode with an existing summary.
    pub fn set_offline_summary(
        &mut self,
        summary: Arc<WaveformSummary>,
        duration_secs: f64,
    ) -> WavecastResult<()> {
        self.ensure_not_disposed()?;
        self.state = AnalysisState::OfflineReady {
            summary,
            duration_secs,
        };
        self.rebuild()
    }

    /// Drop any offline analysis and go back to per-frame analysis.
    pub fn use_realtime(&mut self) -> WavecastResult<()> {
        self.ensure_not_disposed()?;
        if matches!(self.state, AnalysisState::Live) {
            return Ok(());
        }
        self.state = AnalysisState::Live;
        self.rebuild()
    }

    fn ensure_not_disposed(&self) -> WavecastResult<()> {
        if self.chain.is_none() {
            return Err(WavecastError::validation(format!(
                "effect '{}' is disposed",
                self.config.common.id
            )));
        }
        Ok(())
    }

    fn ensure_live(&self) -> WavecastResult<()> {
        self.ensure_not_disposed()?;
        if matches!(self.state, AnalysisState::AnalyzingOffline { .. }) {
            return Err(WavecastError::analysis(format!(
                "effect '{}' is already analyzing",
                self.config.common.id
            )));
        }
        Ok(())
    }

    fn rebuild(&mut self) -> WavecastResult<()> {
        self.chain = Some(build_chain(&self.config, &self.state)?);
        Ok(())
    }
}

fn build_chain(config: &WaveformConfig, state: &AnalysisState) -> WavecastResult<NodeChain> {
    let source = match state {
        AnalysisState::OfflineReady {
            summary,
            duration_secs,
        } => BarSource::Offline {
            summary: summary.clone(),
            duration_secs: *duration_secs,
        },
        _ => BarSource::Realtime {
            previous: Vec::new(),
        },
    };
    NodeChain::new(vec![
        EffectNode::Data(DataNode::new(
            config.bar_count as usize,
            config.amplification,
            config.smoothing,
            source,
        )),
        EffectNode::Style(StyleNode::Waveform(WaveformPaint::new(config))),
        EffectNode::Blend(BlendNode),
        EffectNode::Transform(TransformNode::identity()),
    ])
}

impl VisualEffect for WaveformEffect {
    fn config(&self) -> EffectConfig {
        EffectConfig::Waveform(self.config.clone())
    }

    fn common(&self) -> &EffectCommon {
        &self.config.common
    }

    fn render(&mut self, params: &AudioVisualParameters, target: &mut Surface) -> WavecastResult<()> {
        if matches!(self.state, AnalysisState::AnalyzingOffline { .. })
            && self.config.common.is_active_at(params.current_time)
        {
            tracing::warn!(
                effect = %self.config.common.id,
                t = params.current_time,
                "offline analysis not ready; skipping waveform"
            );
            return Ok(());
        }
        render_chain(&self.config.common, self.chain.as_mut(), params, target)
    }

    fn update_config(&mut self, patch: &Value) -> WavecastResult<()> {
        let next = merge_variant(&self.config(), patch, self.chain.is_none(), |c| match c {
            EffectConfig::Waveform(c) => Some(c),
            _ => None,
        })?;
        self.chain = Some(build_chain(&next, &self.state)?);
        self.config = next;
        Ok(())
    }

    fn dispose(&mut self) {
        self.state = AnalysisState::Live;
        self.chain = None;
    }

    fn is_disposed(&self) -> bool {
        self.chain.is_none()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/waveform.rs"]
mod tests;
