use serde::{Deserialize, Serialize};

use crate::audio::source::AudioSource;
use crate::encode::codec::{EncoderConfig, HardwareAcceleration, VideoCodec};
use crate::foundation::core::Canvas;
use crate::foundation::error::{WavecastError, WavecastResult};

/// User-facing export options, persisted with the project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportSettings {
    pub fps: u32,
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub key_frame_interval_secs: f64,
    pub codec: VideoCodec,
    pub hardware_acceleration: HardwareAcceleration,
    pub offline_segment_count: u32,
    pub export_quality_multiplier: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            video_bitrate: 5_000_000,
            audio_bitrate: 128_000,
            key_frame_interval_secs: 2.0,
            codec: VideoCodec::H264,
            hardware_acceleration: HardwareAcceleration::NoPreference,
            offline_segment_count: 1024,
            export_quality_multiplier: 2,
        }
    }
}

impl ExportSettings {
    pub fn validate(&self) -> WavecastResult<()> {
        if self.fps == 0 {
            return Err(WavecastError::validation("export fps must be non-zero"));
        }
        if self.video_bitrate == 0 || self.audio_bitrate == 0 {
            return Err(WavecastError::validation("export bitrates must be non-zero"));
        }
        if !self.key_frame_interval_secs.is_finite() || self.key_frame_interval_secs < 0.0 {
            return Err(WavecastError::validation(
                "keyFrameIntervalSecs must be a non-negative number",
            ));
        }
        if self.offline_segment_count == 0 || self.export_quality_multiplier == 0 {
            return Err(WavecastError::validation(
                "offlineSegmentCount and exportQualityMultiplier must be non-zero",
            ));
        }
        Ok(())
    }

    /// Segment count used during export for waveforms not configured for offline analysis.
    pub fn export_segment_count(&self) -> usize {
        (self.offline_segment_count as usize).saturating_mul(self.export_quality_multiplier as usize)
    }

    /// Resolve the encoder configuration for `canvas` and `audio`.
    pub fn encoder_config(&self, canvas: Canvas, audio: &AudioSource) -> WavecastResult<EncoderConfig> {
        let channels = u16::try_from(audio.channel_count())
            .map_err(|_| WavecastError::validation("too many audio channels"))?;
        let key_frame_interval_frames =
            (self.key_frame_interval_secs * f64::from(self.fps)).round().max(1.0) as u32;
        Ok(EncoderConfig {
            codec: self.codec,
            width: canvas.width,
            height: canvas.height,
            fps: self.fps,
            video_bitrate: self.video_bitrate,
            audio_bitrate: self.audio_bitrate,
            sample_rate: audio.sample_rate(),
            channels,
            hardware_acceleration: self.hardware_acceleration,
            key_frame_interval_frames,
        })
    }
}
