use crate::foundation::error::{WavecastError, WavecastResult};
use crate::foundation::math::mul_div255_u16;
use crate::render::surface::FrameRGBA;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VideoCodec {
    #[default]
    H264,
    Vp9,
}

impl VideoCodec {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Vp9 => "vp9",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HardwareAcceleration {
    #[default]
    NoPreference,
    PreferHardware,
    PreferSoftware,
}

/// Resolved encoder settings for one export session.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderConfig {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Bits per second.
    pub video_bitrate: u32,
    /// Bits per second.
    pub audio_bitrate: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub hardware_acceleration: HardwareAcceleration,
    pub key_frame_interval_frames: u32,
}

impl EncoderConfig {
    /// Reject configurations no encoder can honor.
    pub fn validate(&self) -> WavecastResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(WavecastError::init_failed("width/height must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(WavecastError::init_failed(format!(
                "width/height must be even for yuv420p output, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(WavecastError::init_failed("fps must be non-zero"));
        }
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(WavecastError::init_failed(
                "audio sample rate and channel count must be non-zero",
            ));
        }
        if self.video_bitrate == 0 || self.audio_bitrate == 0 {
            return Err(WavecastError::init_failed("bitrates must be non-zero"));
        }
        Ok(())
    }

    /// Duration of one video frame in microseconds.
    pub fn frame_duration_us(&self) -> i64 {
        if self.fps == 0 {
            return 0;
        }
        1_000_000 / i64::from(self.fps)
    }

    pub fn video_track(&self) -> VideoTrackConfig {
        VideoTrackConfig {
            codec: self.codec,
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }

    pub fn audio_track(&self) -> AudioTrackConfig {
        AudioTrackConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bitrate: self.audio_bitrate,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoTrackConfig {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioTrackConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoChunk {
    pub data: Vec<u8>,
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub key_frame: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioChunk {
    pub data: Vec<u8>,
    pub timestamp_us: i64,
    pub duration_us: i64,
}

/// One contiguous block of interleaved PCM.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBlock {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    pub frame_index: u64,
    pub timestamp_us: i64,
}

impl AudioBlock {
    /// Samples per channel.
    pub fn sample_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration_us(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.sample_count() as i64).saturating_mul(1_000_000) / i64::from(self.sample_rate)
    }
}

/// Receives encoded chunks as an encoder emits them.
pub trait ChunkSink {
    fn video_chunk(&mut self, chunk: VideoChunk) -> WavecastResult<()>;
    fn audio_chunk(&mut self, chunk: AudioChunk) -> WavecastResult<()>;
}

/// Turns frames and PCM blocks into encoded chunks.
///
/// Encoders may emit any number of chunks per call; everything still buffered must reach the
/// sink by the end of [`Encoder::flush`].
pub trait Encoder: Send {
    /// Fails with `InitFailed` when the configuration is unsupported.
    fn configure(&mut self, config: &EncoderConfig) -> WavecastResult<()>;
    fn encode_video(
        &mut self,
        frame: &FrameRGBA,
        timestamp_us: i64,
        key_frame: bool,
        sink: &mut dyn ChunkSink,
    ) -> WavecastResult<()>;
    fn encode_audio(&mut self, block: &AudioBlock, sink: &mut dyn ChunkSink) -> WavecastResult<()>;
    fn flush(&mut self, sink: &mut dyn ChunkSink) -> WavecastResult<()>;
    /// Release encoder resources. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Packages encoded chunks into a container.
pub trait Muxer: Send {
    fn add_video_track(&mut self, track: &VideoTrackConfig) -> WavecastResult<()>;
    fn add_audio_track(&mut self, track: &AudioTrackConfig) -> WavecastResult<()>;
    fn add_video_chunk(&mut self, chunk: VideoChunk) -> WavecastResult<()>;
    fn add_audio_chunk(&mut self, chunk: AudioChunk) -> WavecastResult<()>;
    /// Container bytes; fails with `FinalizeFailed` when no frames were added.
    fn finalize(&mut self) -> WavecastResult<Vec<u8>>;
    /// Release muxer resources. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Flatten premultiplied RGBA8 over an opaque background color.
pub fn flatten_premul_over_bg(
    dst: &mut [u8],
    src_premul: &[u8],
    bg_rgb: [u8; 3],
) -> WavecastResult<()> {
    if dst.len() != src_premul.len() || !dst.len().is_multiple_of(4) {
        return Err(WavecastError::encode_failed(
            "flatten expects equal-length rgba8 buffers",
        ));
    }

    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        let a = s[3];
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255 - u16::from(a);
        for c in 0..3 {
            let v = u16::from(s[c]) + mul_div255_u16(u16::from(bg_rgb[c]), inv);
            d[c] = v.min(255) as u8;
        }
        d[3] = 255;
    }
    Ok(())
}
