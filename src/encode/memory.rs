//! Deterministic in-process encoder and muxer for tests and debugging.
//!
//! The "encoder" flattens each frame to opaque RGB and converts PCM to 16-bit integers; the
//! muxer writes a small length-prefixed container that [`parse_container`] reads back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::encode::codec::{
    AudioBlock, AudioChunk, AudioTrackConfig, ChunkSink, Encoder, EncoderConfig, Muxer,
    VideoChunk, VideoCodec, VideoTrackConfig, flatten_premul_over_bg,
};
use crate::foundation::error::{WavecastError, WavecastResult};
use crate::render::surface::FrameRGBA;

const MAGIC: &[u8; 4] = b"WCMC";
const VERSION: u8 = 1;
const KIND_VIDEO: u8 = 1;
const KIND_AUDIO: u8 = 2;
const FLAG_KEY: u8 = 1;

/// Shared call counters observable after the encoder/muxer moved into a session.
#[derive(Clone, Debug, Default)]
pub struct CallProbe {
    inner: Arc<ProbeCounts>,
}

#[derive(Debug, Default)]
struct ProbeCounts {
    configures: AtomicU64,
    video_encodes: AtomicU64,
    key_frames: AtomicU64,
    audio_encodes: AtomicU64,
    flushes: AtomicU64,
    encoder_closes: AtomicU64,
    muxer_finalizes: AtomicU64,
    muxer_closes: AtomicU64,
}

/// Point-in-time copy of a [`CallProbe`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProbeSnapshot {
    pub configures: u64,
    pub video_encodes: u64,
    pub key_frames: u64,
    pub audio_encodes: u64,
    pub flushes: u64,
    pub encoder_closes: u64,
    pub muxer_finalizes: u64,
    pub muxer_closes: u64,
}

impl CallProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProbeSnapshot {
        let c = &self.inner;
        let load = |v: &AtomicU64| v.load(Ordering::SeqCst);
        ProbeSnapshot {
            configures: load(&c.configures),
            video_encodes: load(&c.video_encodes),
            key_frames: load(&c.key_frames),
            audio_encodes: load(&c.audio_encodes),
            flushes: load(&c.flushes),
            encoder_closes: load(&c.encoder_closes),
            muxer_finalizes: load(&c.muxer_finalizes),
            muxer_closes: load(&c.muxer_closes),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory [`Encoder`].
#[derive(Debug, Default)]
pub struct InMemoryEncoder {
    config: Option<EncoderConfig>,
    scratch: Vec<u8>,
    probe: CallProbe,
    fail_video_at: Option<u64>,
    frames: u64,
}

impl InMemoryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(probe: CallProbe) -> Self {
        Self {
            probe,
            ..Self::default()
        }
    }

    /// Fail the `index`-th (zero-based) `encode_video` call with `EncodeFailed`.
    pub fn fail_video_at(mut self, index: u64) -> Self {
        self.fail_video_at = Some(index);
        self
    }

    fn config(&self) -> WavecastResult<&EncoderConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| WavecastError::encode_failed("encoder is not configured"))
    }
}

impl Encoder for InMemoryEncoder {
    fn configure(&mut self, config: &EncoderConfig) -> WavecastResult<()> {
        CallProbe::bump(&self.probe.inner.configures);
        config.validate()?;
        self.scratch = vec![0u8; (config.width as usize) * (config.height as usize) * 4];
        self.config = Some(config.clone());
        self.frames = 0;
        Ok(())
    }

    fn encode_video(
        &mut self,
        frame: &FrameRGBA,
        timestamp_us: i64,
        key_frame: bool,
        sink: &mut dyn ChunkSink,
    ) -> WavecastResult<()> {
        CallProbe::bump(&self.probe.inner.video_encodes);
        if key_frame {
            CallProbe::bump(&self.probe.inner.key_frames);
        }
        let index = self.frames;
        self.frames += 1;
        if self.fail_video_at == Some(index) {
            return Err(WavecastError::encode_failed(format!(
                "simulated failure at frame {index}"
            )));
        }

        let cfg = self.config()?;
        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(WavecastError::encode_failed(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        let duration_us = cfg.frame_duration_us();
        flatten_premul_over_bg(&mut self.scratch, &frame.data, [0, 0, 0])?;

        let rgb: Vec<u8> = self
            .scratch
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        sink.video_chunk(VideoChunk {
            data: rgb,
            timestamp_us,
            duration_us,
            key_frame,
        })
    }

    fn encode_audio(&mut self, block: &AudioBlock, sink: &mut dyn ChunkSink) -> WavecastResult<()> {
        CallProbe::bump(&self.probe.inner.audio_encodes);
        let cfg = self.config()?;
        if block.channels != cfg.channels {
            return Err(WavecastError::encode_failed(format!(
                "audio channel mismatch: got {}, expected {}",
                block.channels, cfg.channels
            )));
        }
        let data = block
            .samples
            .iter()
            .flat_map(|s| ((s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16).to_le_bytes())
            .collect();
        sink.audio_chunk(AudioChunk {
            data,
            timestamp_us: block.timestamp_us,
            duration_us: block.duration_us(),
        })
    }

    fn flush(&mut self, _sink: &mut dyn ChunkSink) -> WavecastResult<()> {
        CallProbe::bump(&self.probe.inner.flushes);
        self.config()?;
        Ok(())
    }

    fn close(&mut self) {
        CallProbe::bump(&self.probe.inner.encoder_closes);
        self.config = None;
        self.scratch = Vec::new();
    }
}

/// In-memory [`Muxer`] producing the length-prefixed container read by [`parse_container`].
#[derive(Debug, Default)]
pub struct InMemoryMuxer {
    video: Option<VideoTrackConfig>,
    audio: Option<AudioTrackConfig>,
    records: Vec<u8>,
    video_chunks: u64,
    probe: CallProbe,
}

impl InMemoryMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(probe: CallProbe) -> Self {
        Self {
            probe,
            ..Self::default()
        }
    }

    fn push_record(&mut self, kind: u8, flags: u8, timestamp_us: i64, duration_us: i64, data: &[u8]) {
        self.records.push(kind);
        self.records.push(flags);
        self.records.extend_from_slice(&timestamp_us.to_le_bytes());
        self.records.extend_from_slice(&duration_us.to_le_bytes());
        self.records
            .extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.records.extend_from_slice(data);
    }
}

impl Muxer for InMemoryMuxer {
    fn add_video_track(&mut self, track: &VideoTrackConfig) -> WavecastResult<()> {
        if track.width == 0 || track.height == 0 {
            return Err(WavecastError::init_failed("video track needs non-zero size"));
        }
        self.video = Some(*track);
        Ok(())
    }

    fn add_audio_track(&mut self, track: &AudioTrackConfig) -> WavecastResult<()> {
        if track.sample_rate == 0 || track.channels == 0 {
            return Err(WavecastError::init_failed(
                "audio track needs a sample rate and channels",
            ));
        }
        self.audio = Some(*track);
        Ok(())
    }

    fn add_video_chunk(&mut self, chunk: VideoChunk) -> WavecastResult<()> {
        if self.video.is_none() {
            return Err(WavecastError::encode_failed("no video track"));
        }
        let flags = if chunk.key_frame { FLAG_KEY } else { 0 };
        self.push_record(KIND_VIDEO, flags, chunk.timestamp_us, chunk.duration_us, &chunk.data);
        self.video_chunks += 1;
        Ok(())
    }

    fn add_audio_chunk(&mut self, chunk: AudioChunk) -> WavecastResult<()> {
        if self.audio.is_none() {
            return Err(WavecastError::encode_failed("no audio track"));
        }
        self.push_record(KIND_AUDIO, 0, chunk.timestamp_us, chunk.duration_us, &chunk.data);
        Ok(())
    }

    fn finalize(&mut self) -> WavecastResult<Vec<u8>> {
        CallProbe::bump(&self.probe.inner.muxer_finalizes);
        let (Some(video), Some(audio)) = (self.video, self.audio) else {
            return Err(WavecastError::finalize_failed("tracks were never added"));
        };
        if self.video_chunks == 0 {
            return Err(WavecastError::finalize_failed("no video frames were added"));
        }

        let mut out = Vec::with_capacity(self.records.len() + 32);
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.push(match video.codec {
            VideoCodec::H264 => 0,
            VideoCodec::Vp9 => 1,
        });
        out.extend_from_slice(&video.width.to_le_bytes());
        out.extend_from_slice(&video.height.to_le_bytes());
        out.extend_from_slice(&video.fps.to_le_bytes());
        out.extend_from_slice(&audio.sample_rate.to_le_bytes());
        out.extend_from_slice(&audio.channels.to_le_bytes());
        out.append(&mut self.records);
        self.video_chunks = 0;
        Ok(out)
    }

    fn close(&mut self) {
        CallProbe::bump(&self.probe.inner.muxer_closes);
        self.records = Vec::new();
    }
}

/// Chunk metadata recovered from an in-memory container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerChunk {
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub key_frame: bool,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedContainer {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub video: Vec<ContainerChunk>,
    pub audio: Vec<ContainerChunk>,
}

/// Read back bytes produced by [`InMemoryMuxer::finalize`].
pub fn parse_container(bytes: &[u8]) -> WavecastResult<ParsedContainer> {
    let mut r = Reader { bytes, pos: 0 };
    if r.take(4)? != MAGIC {
        return Err(WavecastError::validation("not an in-memory container"));
    }
    let version = r.u8()?;
    if version != VERSION {
        return Err(WavecastError::validation(format!(
            "unsupported container version {version}"
        )));
    }
    let codec = match r.u8()? {
        0 => VideoCodec::H264,
        1 => VideoCodec::Vp9,
        other => {
            return Err(WavecastError::validation(format!("unknown codec id {other}")));
        }
    };
    let mut parsed = ParsedContainer {
        codec,
        width: r.u32()?,
        height: r.u32()?,
        fps: r.u32()?,
        sample_rate: r.u32()?,
        channels: r.u16()?,
        video: Vec::new(),
        audio: Vec::new(),
    };

    while !r.is_empty() {
        let kind = r.u8()?;
        let flags = r.u8()?;
        let timestamp_us = r.i64()?;
        let duration_us = r.i64()?;
        let len = r.u32()? as usize;
        let chunk = ContainerChunk {
            timestamp_us,
            duration_us,
            key_frame: flags & FLAG_KEY != 0,
            data: r.take(len)?.to_vec(),
        };
        match kind {
            KIND_VIDEO => parsed.video.push(chunk),
            KIND_AUDIO => parsed.audio.push(chunk),
            other => {
                return Err(WavecastError::validation(format!("unknown record kind {other}")));
            }
        }
    }
    Ok(parsed)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> WavecastResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| WavecastError::validation("truncated container"))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> WavecastResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> WavecastResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> WavecastResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> WavecastResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> WavecastResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/memory.rs"]
mod tests;
