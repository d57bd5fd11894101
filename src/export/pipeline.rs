use std::sync::Arc;

use crate::audio::source::AudioSource;
use crate::encode::codec::AudioBlock;
use crate::encode::session::EncodeTarget;
use crate::export::cancel::CancelToken;
use crate::export::settings::ExportSettings;
use crate::export::timeline::{
    KeyFrameScheduler, frame_timestamp_us, sample_timestamp_us, samples_per_block, total_frames,
};
use crate::foundation::error::{WavecastError, WavecastResult};
use crate::manager::effect_manager::{EffectManager, RenderErrorPolicy};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportState {
    #[default]
    Idle,
    Initializing,
    Encoding,
    Finalizing,
    Completed,
    Cancelled,
    Failed,
}

impl ExportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Counters for the last export run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub total_frames: u64,
    pub video_frames: u64,
    pub key_frames: u64,
    pub audio_blocks: u64,
    pub rejected_video: u64,
    pub rejected_audio: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

impl ExportedFile {
    /// `wavecast-export-YYYYMMDD-HHMMSS.mp4` in local time.
    pub fn timestamped_name() -> String {
        chrono::Local::now()
            .format("wavecast-export-%Y%m%d-%H%M%S.mp4")
            .to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed(ExportedFile),
    Cancelled,
}

/// Drives an [`EffectManager`] through virtual time and feeds every frame and audio block to an
/// [`EncodeTarget`].
#[derive(Debug)]
pub struct ExportPipeline {
    settings: ExportSettings,
    state: ExportState,
    progress: f64,
    cancel: CancelToken,
    stats: ExportStats,
}

impl ExportPipeline {
    pub fn new(settings: ExportSettings) -> WavecastResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            state: ExportState::Idle,
            progress: 0.0,
            cancel: CancelToken::new(),
            stats: ExportStats::default(),
        })
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    /// Fraction of video frames encoded, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Token that cancels the running export at its next frame or block.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn stats(&self) -> ExportStats {
        self.stats
    }

    /// Render `audio` through `manager` and encode the result into `target`.
    ///
    /// The manager's real-time loop is stopped for the whole call and restarted afterwards if
    /// it was running. Waveforms return to their configured analysis mode once the run ends. Cancellation is reported as [`ExportOutcome::Cancelled`]; any other
    /// failure tears the target down and returns the error with progress reset to zero.
    #[tracing::instrument(skip_all, fields(fps = self.settings.fps))]
    pub fn export(
        &mut self,
        manager: &mut EffectManager,
        audio: &Arc<AudioSource>,
        target: &mut dyn EncodeTarget,
        mut on_progress: impl FnMut(f64),
    ) -> WavecastResult<ExportOutcome> {
        self.cancel.reset();
        self.stats = ExportStats::default();
        self.progress = 0.0;

        let mut manager = manager.suspend_loop();
        let result = self.run(&mut manager, audio, target, &mut on_progress);
        if let Err(e) = manager.restore_analysis_modes() {
            tracing::warn!(error = %e, "failed to restore waveform analysis after export");
        }

        match result {
            Ok(bytes) => {
                self.transition(ExportState::Completed);
                let file = ExportedFile {
                    bytes,
                    file_name: ExportedFile::timestamped_name(),
                };
                tracing::info!(
                    bytes = file.bytes.len(),
                    frames = self.stats.video_frames,
                    audio_blocks = self.stats.audio_blocks,
                    file = %file.file_name,
                    "export completed"
                );
                Ok(ExportOutcome::Completed(file))
            }
            Err(e) if e.is_cancelled() => {
                target.cancel();
                self.progress = 0.0;
                self.transition(ExportState::Cancelled);
                Ok(ExportOutcome::Cancelled)
            }
            Err(e) => {
                target.cancel();
                self.progress = 0.0;
                self.transition(ExportState::Failed);
                tracing::warn!(error = %e, "export failed");
                Err(e)
            }
        }
    }

    fn run(
        &mut self,
        manager: &mut EffectManager,
        audio: &Arc<AudioSource>,
        target: &mut dyn EncodeTarget,
        on_progress: &mut dyn FnMut(f64),
    ) -> WavecastResult<Vec<u8>> {
        self.transition(ExportState::Initializing);
        if audio.total_samples() == 0 {
            return Err(WavecastError::validation("cannot export empty audio"));
        }
        if !manager.audio().is_some_and(|a| Arc::ptr_eq(a, audio)) {
            manager.set_audio(Arc::clone(audio))?;
        }

        let fps = self.settings.fps;
        let sample_rate = audio.sample_rate();
        let total = total_frames(audio.total_samples(), sample_rate, fps);
        self.stats.total_frames = total;

        let config = self.settings.encoder_config(manager.canvas(), audio)?;
        target.initialize(config, total)?;

        manager.prepare_offline(
            audio,
            self.settings.offline_segment_count as usize,
            self.settings.export_quality_multiplier as usize,
        )?;
        manager.wait_offline()?;

        self.transition(ExportState::Encoding);
        self.encode_video(manager, target, total, on_progress)?;
        self.encode_audio(audio, target)?;

        self.transition(ExportState::Finalizing);
        self.check_cancelled()?;
        let bytes = target.finalize()?;
        let rejected = target.rejected();
        self.stats.rejected_video = rejected.video;
        self.stats.rejected_audio = rejected.audio;
        Ok(bytes)
    }

    fn encode_video(
        &mut self,
        manager: &mut EffectManager,
        target: &mut dyn EncodeTarget,
        total: u64,
        on_progress: &mut dyn FnMut(f64),
    ) -> WavecastResult<()> {
        let fps = self.settings.fps;
        let mut keys = KeyFrameScheduler::new(self.settings.key_frame_interval_secs);

        for index in 0..total {
            self.check_cancelled()?;

            let t = index as f64 / f64::from(fps);
            manager.render_with_policy(t, RenderErrorPolicy::FailFast)?;
            let timestamp_us = frame_timestamp_us(index, fps);
            let key_frame = keys.is_key(timestamp_us);
            target.encode_video(manager.frame(), index, timestamp_us, key_frame)?;

            self.stats.video_frames += 1;
            self.stats.key_frames += u64::from(key_frame);
            self.progress = (index + 1) as f64 / total as f64;
            on_progress(self.progress);
        }
        tracing::debug!(frames = self.stats.video_frames, "video track encoded");
        Ok(())
    }

    fn encode_audio(
        &mut self,
        audio: &AudioSource,
        target: &mut dyn EncodeTarget,
    ) -> WavecastResult<()> {
        let sample_rate = audio.sample_rate();
        let block_len = samples_per_block(sample_rate, self.settings.fps);
        let channels = audio.channel_count() as u16;

        for (frame_index, offset) in (0..audio.total_samples()).step_by(block_len).enumerate() {
            self.check_cancelled()?;

            let timestamp_us = sample_timestamp_us(offset, sample_rate);
            target.encode_audio(AudioBlock {
                samples: audio.interleaved_block(offset, block_len),
                channels,
                sample_rate,
                frame_index: frame_index as u64,
                timestamp_us,
            })?;
            self.stats.audio_blocks += 1;
        }
        tracing::debug!(blocks = self.stats.audio_blocks, "audio track encoded");
        Ok(())
    }

    fn check_cancelled(&self) -> WavecastResult<()> {
        if self.cancel.is_cancelled() {
            return Err(WavecastError::Cancelled);
        }
        Ok(())
    }

    fn transition(&mut self, next: ExportState) {
        tracing::info!(from = ?self.state, to = ?next, "export state");
        self.state = next;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/pipeline.rs"]
mod tests;
