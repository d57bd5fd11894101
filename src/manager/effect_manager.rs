use std::sync::Arc;

use serde_json::Value;

use crate::audio::analysis::RealtimeAnalyzer;
use crate::audio::params::AudioVisualParameters;
use crate::audio::source::AudioSource;
use crate::audio::worker::AnalysisWorker;
use crate::effects::config::{AnalysisMode, EffectConfig};
use crate::effects::effect::{Effect, VisualEffect, create_effect};
use crate::foundation::color::ColorDef;
use crate::foundation::core::Canvas;
use crate::foundation::error::{WavecastError, WavecastResult};
use crate::manager::clock::PlaybackClock;
use crate::render::surface::{FrameRGBA, Surface};

/// What [`EffectManager::render`] does when a single effect fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderErrorPolicy {
    /// Abort the frame and return the effect's error.
    FailFast,
    /// Log the error, skip the effect, and keep compositing.
    #[default]
    SkipAndLog,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerOpts {
    pub canvas: Canvas,
    pub clear_color: ColorDef,
    pub render_error_policy: RenderErrorPolicy,
}

impl Default for ManagerOpts {
    fn default() -> Self {
        Self {
            canvas: Canvas::default(),
            clear_color: ColorDef::rgba8(0, 0, 0, 0),
            render_error_policy: RenderErrorPolicy::default(),
        }
    }
}

/// Counters for the real-time loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub starts: u64,
    pub stops: u64,
    pub frames: u64,
}

struct Slot {
    seq: u64,
    effect: Effect,
}

/// Owns the effects, the shared drawing surface, and the preview loop state.
pub struct EffectManager {
    opts: ManagerOpts,
    surface: Surface,
    slots: Vec<Slot>,
    next_seq: u64,
    audio: Option<Arc<AudioSource>>,
    analyzer: RealtimeAnalyzer,
    pending_params: Option<AudioVisualParameters>,
    last_params: AudioVisualParameters,
    worker: Option<AnalysisWorker>,
    clock: PlaybackClock,
    stats: LoopStats,
}

impl std::fmt::Debug for EffectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectManager")
            .field("canvas", &self.opts.canvas)
            .field("effects", &self.effect_ids())
            .field("audio", &self.audio.is_some())
            .field("running", &self.clock.is_running())
            .finish()
    }
}

impl EffectManager {
    pub fn new(opts: ManagerOpts) -> WavecastResult<Self> {
        let surface = Surface::new(opts.canvas)?;
        Ok(Self {
            opts,
            surface,
            slots: Vec::new(),
            next_seq: 0,
            audio: None,
            analyzer: RealtimeAnalyzer::new(),
            pending_params: None,
            last_params: AudioVisualParameters::silent(0.0),
            worker: None,
            clock: PlaybackClock::new(),
            stats: LoopStats::default(),
        })
    }

    pub fn opts(&self) -> &ManagerOpts {
        &self.opts
    }

    pub fn canvas(&self) -> Canvas {
        self.opts.canvas
    }

    /// Factory dispatch on the config's type tag.
    pub fn create_effect(config: EffectConfig) -> WavecastResult<Effect> {
        create_effect(config)
    }

    /// Append `effect`; ids must be unique within the manager.
    pub fn add_effect(&mut self, effect: Effect) -> WavecastResult<()> {
        if self.position(effect.id()).is_some() {
            return Err(WavecastError::validation(format!(
                "effect '{}' already exists",
                effect.id()
            )));
        }
        tracing::debug!(effect = %effect.id(), "effect added");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.push(Slot { seq, effect });
        Ok(())
    }

    /// Build an effect from `config` and add it.
    pub fn add_effect_config(&mut self, config: EffectConfig) -> WavecastResult<()> {
        let effect = create_effect(config)?;
        self.add_effect(effect)
    }

    /// Dispose and drop the effect. Returns `false` when the id is unknown.
    pub fn remove_effect(&mut self, id: &str) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let mut slot = self.slots.remove(index);
        slot.effect.dispose();
        tracing::debug!(effect = %id, "effect removed");
        true
    }

    /// Apply a partial config to the effect with `id`.
    pub fn update_effect(&mut self, id: &str, patch: &Value) -> WavecastResult<()> {
        let effect = self
            .effect_mut(id)
            .ok_or_else(|| WavecastError::validation(format!("no effect with id '{id}'")))?;
        effect.update_config(patch)
    }

    pub fn effect(&self, id: &str) -> Option<&Effect> {
        self.position(id).map(|i| &self.slots[i].effect)
    }

    pub fn effect_mut(&mut self, id: &str) -> Option<&mut Effect> {
        self.position(id).map(|i| &mut self.slots[i].effect)
    }

    /// Ids in insertion order.
    pub fn effect_ids(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.effect.id().to_owned()).collect()
    }

    /// Ids in composite order: ascending `zIndex`, ties by insertion.
    pub fn draw_order(&self) -> Vec<String> {
        self.sorted_indices()
            .into_iter()
            .map(|i| self.slots[i].effect.id().to_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Load the audio frames are analyzed from. Waveforms configured for offline analysis start
    /// analyzing it in the background.
    pub fn set_audio(&mut self, source: Arc<AudioSource>) -> WavecastResult<()> {
        tracing::debug!(
            sample_rate = source.sample_rate(),
            channels = source.channel_count(),
            duration_secs = source.duration_secs(),
            "audio loaded"
        );
        self.audio = Some(Arc::clone(&source));
        self.pending_params = None;

        self.start_offline_for(&source, configured_offline_segments)
    }

    pub fn clear_audio(&mut self) -> WavecastResult<()> {
        self.audio = None;
        self.pending_params = None;
        self.use_realtime()
    }

    pub fn audio(&self) -> Option<&Arc<AudioSource>> {
        self.audio.as_ref()
    }

    /// Use `params` for the next render instead of analyzing the loaded audio.
    pub fn update_params(&mut self, params: AudioVisualParameters) {
        self.pending_params = Some(params);
    }

    /// Parameters the last frame was rendered with.
    pub fn last_params(&self) -> &AudioVisualParameters {
        &self.last_params
    }

    /// Switch every waveform to offline analysis of `source` and return without waiting.
    ///
    /// Waveforms configured for offline analysis use their own `segmentCount`, the others use
    /// `default_segments`; both are scaled by `quality_multiplier`.
    pub fn prepare_offline(
        &mut self,
        source: &AudioSource,
        default_segments: usize,
        quality_multiplier: usize,
    ) -> WavecastResult<()> {
        let multiplier = quality_multiplier.max(1);
        self.start_offline_for(source, |effect| {
            let Effect::Waveform(waveform) = effect else {
                return None;
            };
            let config = waveform.waveform_config();
            let base = match config.analysis_mode {
                AnalysisMode::Offline => config.segment_count as usize,
                AnalysisMode::Realtime => default_segments,
            };
            Some(base.max(1).saturating_mul(multiplier))
        })
    }

    /// Block until every pending offline analysis completes.
    pub fn wait_offline(&mut self) -> WavecastResult<()> {
        for slot in self.slots.iter_mut().filter(|s| !s.effect.is_disposed()) {
            if let Some(waveform) = slot.effect.as_waveform_mut() {
                waveform.wait_for_offline_analysis()?;
            }
        }
        Ok(())
    }

    /// Put every waveform back into its configured analysis mode for the loaded audio, blocking
    /// until offline summaries are ready.
    pub fn restore_analysis_modes(&mut self) -> WavecastResult<()> {
        self.use_realtime()?;
        let Some(source) = self.audio.clone() else {
            return Ok(());
        };
        self.start_offline_for(&source, configured_offline_segments)?;
        self.wait_offline()
    }

    /// Return every waveform to per-frame analysis.
    pub fn use_realtime(&mut self) -> WavecastResult<()> {
        for slot in self.slots.iter_mut().filter(|s| !s.effect.is_disposed()) {
            if let Some(waveform) = slot.effect.as_waveform_mut() {
                waveform.use_realtime()?;
            }
        }
        Ok(())
    }

    /// Composite every effect for `current_time` onto the shared surface.
    pub fn render(&mut self, current_time: f64) -> WavecastResult<()> {
        self.render_with_policy(current_time, self.opts.render_error_policy)
    }

    #[tracing::instrument(skip(self), fields(effects = self.slots.len()))]
    pub fn render_with_policy(
        &mut self,
        current_time: f64,
        policy: RenderErrorPolicy,
    ) -> WavecastResult<()> {
        let params = self.params_at(current_time)?;
        self.surface.clear(self.opts.clear_color.to_rgba8_premul());

        for index in self.sorted_indices() {
            let effect = &mut self.slots[index].effect;
            let common = effect.common();
            let (opacity, blend_mode) = (common.opacity, common.blend_mode);

            self.surface.save();
            self.surface.set_global_alpha(opacity);
            self.surface.set_blend_mode(blend_mode);
            let result = effect.render(&params, &mut self.surface);
            self.surface.restore();

            if let Err(e) = result {
                match policy {
                    RenderErrorPolicy::FailFast => return Err(e),
                    RenderErrorPolicy::SkipAndLog => {
                        tracing::warn!(effect = %effect.id(), error = %e, "effect render failed, skipped");
                    }
                }
            }
        }

        self.last_params = params;
        Ok(())
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Copy of the last composited frame.
    pub fn frame(&self) -> FrameRGBA {
        self.surface.snapshot()
    }

    /// Start the real-time loop. No-op while running.
    pub fn start(&mut self) {
        if self.clock.is_running() {
            return;
        }
        self.clock.start();
        self.stats.starts += 1;
        tracing::info!(position = self.clock.position_secs(), "playback started");
    }

    /// Stop the real-time loop, keeping the playback position. No-op while stopped.
    pub fn stop(&mut self) {
        if !self.clock.is_running() {
            return;
        }
        self.clock.pause();
        self.stats.stops += 1;
        tracing::info!(position = self.clock.position_secs(), "playback stopped");
    }

    pub fn seek(&mut self, secs: f64) {
        self.clock.seek(secs);
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    pub fn position_secs(&self) -> f64 {
        self.clock.position_secs()
    }

    /// One iteration of the real-time loop: render at the playback position when running.
    ///
    /// Returns the rendered time, or `None` while stopped.
    pub fn tick(&mut self) -> WavecastResult<Option<f64>> {
        if !self.clock.is_running() {
            return Ok(None);
        }
        let t = self.clock.position_secs();
        self.render(t)?;
        self.stats.frames += 1;
        Ok(Some(t))
    }

    pub fn loop_stats(&self) -> LoopStats {
        self.stats
    }

    /// Stop the real-time loop until the returned guard drops.
    pub fn suspend_loop(&mut self) -> LoopSuspension<'_> {
        let resume = self.clock.is_running();
        self.stop();
        LoopSuspension {
            manager: self,
            resume,
        }
    }

    /// Dispose every effect, stop the loop, and release the audio and the analysis worker.
    pub fn dispose(&mut self) {
        self.stop();
        for slot in &mut self.slots {
            slot.effect.dispose();
        }
        self.slots.clear();
        self.audio = None;
        self.pending_params = None;
        self.worker = None;
        tracing::debug!("effect manager disposed");
    }

    fn params_at(&mut self, current_time: f64) -> WavecastResult<AudioVisualParameters> {
        if let Some(mut params) = self.pending_params.take() {
            params.current_time = current_time;
            return Ok(params);
        }
        match &self.audio {
            Some(source) => self.analyzer.analyze(source, current_time),
            None => Ok(AudioVisualParameters::silent(current_time)),
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.effect.id() == id)
    }

    fn sorted_indices(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.slots.len()).collect();
        order.sort_by_key(|&i| (self.slots[i].effect.common().z_index, self.slots[i].seq));
        order
    }

    fn start_offline_for(
        &mut self,
        source: &AudioSource,
        segments_for: impl Fn(&Effect) -> Option<usize>,
    ) -> WavecastResult<()> {
        let jobs: Vec<(usize, usize)> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.effect.is_disposed())
            .filter_map(|(i, s)| segments_for(&s.effect).map(|n| (i, n)))
            .collect();
        if jobs.is_empty() {
            return Ok(());
        }
        if self.worker.is_none() {
            self.worker = Some(AnalysisWorker::spawn()?);
        }
        let Some(worker) = self.worker.as_ref() else {
            return Err(WavecastError::analysis("analysis worker unavailable"));
        };
        for (index, segment_count) in jobs {
            if let Some(waveform) = self.slots[index].effect.as_waveform_mut() {
                waveform.use_realtime()?;
                waveform.start_offline_analysis(source, segment_count, worker)?;
            }
        }
        Ok(())
    }
}

fn configured_offline_segments(effect: &Effect) -> Option<usize> {
    match effect {
        Effect::Waveform(waveform) => {
            let config = waveform.waveform_config();
            (config.analysis_mode == AnalysisMode::Offline).then_some(config.segment_count as usize)
        }
        _ => None,
    }
}

/// Scoped suspension of the real-time loop; restarts it on drop if it was running.
pub struct LoopSuspension<'a> {
    manager: &'a mut EffectManager,
    resume: bool,
}

impl std::ops::Deref for LoopSuspension<'_> {
    type Target = EffectManager;

    fn deref(&self) -> &EffectManager {
        self.manager
    }
}

impl std::ops::DerefMut for LoopSuspension<'_> {
    fn deref_mut(&mut self) -> &mut EffectManager {
        self.manager
    }
}

impl Drop for LoopSuspension<'_> {
    fn drop(&mut self) {
        if self.resume {
            self.manager.start();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/manager/effect_manager.rs"]
mod tests;
