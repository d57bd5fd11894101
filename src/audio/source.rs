use std::io::Cursor;
use std::sync::Arc;

use anyhow::Context as _;

use crate::foundation::error::{WavecastError, WavecastResult};

/// Decoded, immutable audio: planar `f32` samples in `[-1, 1]` plus the original encoded bytes.
///
/// Created once per loaded file and shared by `Arc`; nothing mutates it afterwards.
#[derive(Clone)]
pub struct AudioSource {
    channels: Vec<Arc<[f32]>>,
    sample_rate: u32,
    raw: Arc<[u8]>,
}

impl AudioSource {
    /// Build a source from planar channel buffers of equal length.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> WavecastResult<Self> {
        Self::from_channels_with_raw(channels, sample_rate, Vec::new())
    }

    fn from_channels_with_raw(
        channels: Vec<Vec<f32>>,
        sample_rate: u32,
        raw: Vec<u8>,
    ) -> WavecastResult<Self> {
        if sample_rate == 0 {
            return Err(WavecastError::validation("audio sample_rate must be > 0"));
        }
        if channels.is_empty() {
            return Err(WavecastError::validation(
                "audio must have at least one channel",
            ));
        }
        let len = channels[0].len();
        if channels.iter().any(|c| c.len() != len) {
            return Err(WavecastError::validation(
                "audio channels must all have the same length",
            ));
        }
        Ok(Self {
            channels: channels.into_iter().map(Arc::from).collect(),
            sample_rate,
            raw: Arc::from(raw),
        })
    }

    /// Decode a RIFF/WAVE file (integer PCM up to 32 bits, or 32-bit float).
    pub fn from_wav_bytes(bytes: Vec<u8>) -> WavecastResult<Self> {
        let mut reader =
            hound::WavReader::new(Cursor::new(bytes.as_slice())).context("parse wav header")?;
        let spec = reader.spec();
        let channel_count = usize::from(spec.channels);
        if channel_count == 0 {
            return Err(WavecastError::validation("wav file declares zero channels"));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("decode float wav samples")?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("decode integer wav samples")?
            }
        };

        let frames = interleaved.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in interleaved.chunks_exact(channel_count) {
            for (ch, &s) in channels.iter_mut().zip(frame) {
                ch.push(s.clamp(-1.0, 1.0));
            }
        }

        tracing::debug!(
            sample_rate = spec.sample_rate,
            channels = channel_count,
            frames,
            "decoded wav"
        );
        drop(reader);
        Self::from_channels_with_raw(channels, spec.sample_rate, bytes)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn total_samples(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    pub fn duration_secs(&self) -> f64 {
        self.total_samples() as f64 / f64::from(self.sample_rate)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(|c| c.as_ref())
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(|c| c.as_ref())
    }

    /// Shared handle to one channel, for moving into a worker without copying the source.
    pub fn channel_arc(&self, index: usize) -> Option<Arc<[f32]>> {
        self.channels.get(index).cloned()
    }

    /// Original encoded bytes (empty when built from raw channels).
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Sample index at `time_secs`, clamped into `[0, total_samples]`.
    pub fn sample_index_at(&self, time_secs: f64) -> usize {
        if !time_secs.is_finite() || time_secs <= 0.0 {
            return 0;
        }
        let idx = (time_secs * f64::from(self.sample_rate)).floor() as usize;
        idx.min(self.total_samples())
    }

    /// Average of all channels.
    pub fn mono_mix(&self) -> Vec<f32> {
        self.mono_range(0, self.total_samples())
    }

    /// Average of all channels over `[start, end)`.
    pub fn mono_range(&self, start: usize, end: usize) -> Vec<f32> {
        let end = end.min(self.total_samples());
        let start = start.min(end);
        let inv = 1.0 / self.channels.len() as f32;
        (start..end)
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() * inv)
            .collect()
    }

    /// Interleaved samples for `[start, start + len)`, truncated at the end of the source.
    pub fn interleaved_block(&self, start: usize, len: usize) -> Vec<f32> {
        let end = start.saturating_add(len).min(self.total_samples());
        let start = start.min(end);
        let mut out = Vec::with_capacity((end - start) * self.channels.len());
        for i in start..end {
            for c in &self.channels {
                out.push(c[i]);
            }
        }
        out
    }
}

impl std::fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSource")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels.len())
            .field("total_samples", &self.total_samples())
            .field("raw_bytes", &self.raw.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/audio/source.rs"]
mod tests;
