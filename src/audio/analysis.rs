use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use realfft::{RealFftPlanner, RealToComplex, num_complex::Complex32};

use crate::audio::params::AudioVisualParameters;
use crate::audio::source::AudioSource;
use crate::foundation::error::{WavecastError, WavecastResult};

/// Default rolling-window length for realtime analysis.
pub const DEFAULT_WINDOW_SAMPLES: usize = 2048;

/// Precomputed per-segment waveform statistics over a whole track.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WaveformSummary {
    pub peaks: Vec<f32>,
    pub rms: Vec<f32>,
}

impl WaveformSummary {
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Segment covering `time_secs` for a track of `duration_secs`, clamped to the last segment.
    pub fn segment_at(&self, time_secs: f64, duration_secs: f64) -> Option<usize> {
        if self.is_empty() || !(duration_secs > 0.0) || !time_secs.is_finite() {
            return None;
        }
        let t = (time_secs / duration_secs).clamp(0.0, 1.0);
        let idx = (t * self.len() as f64).floor() as usize;
        Some(idx.min(self.len() - 1))
    }
}

/// Root mean square; `0` for empty input.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Maximum absolute value; `0` for empty input.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, &s| m.max(s.abs()))
}

/// Sample range of segment `i` out of `n` over `len` samples.
///
/// Every segment but the last holds `len / n` samples; the last takes the remainder.
fn segment_bounds(i: usize, n: usize, len: usize) -> (usize, usize) {
    let base = len / n;
    let start = i * base;
    let end = if i + 1 == n { len } else { start + base };
    (start, end)
}

/// Partition `channel` into `segment_count` contiguous blocks and compute peak and RMS per block.
#[tracing::instrument(skip(channel), fields(samples = channel.len()))]
pub fn analyze_offline(channel: &[f32], segment_count: usize) -> WavecastResult<WaveformSummary> {
    if segment_count == 0 {
        return Err(WavecastError::validation("segment_count must be >= 1"));
    }

    let (peaks, rms_values): (Vec<f32>, Vec<f32>) = (0..segment_count)
        .into_par_iter()
        .map(|i| {
            let (start, end) = segment_bounds(i, segment_count, channel.len());
            let block = &channel[start..end];
            (peak(block), rms(block))
        })
        .unzip();

    Ok(WaveformSummary {
        peaks,
        rms: rms_values,
    })
}

/// Multi-channel variant: per-segment max peak and root of the mean of channel mean-squares.
pub fn analyze_offline_channels(
    channels: &[&[f32]],
    segment_count: usize,
) -> WavecastResult<WaveformSummary> {
    let Some(first) = channels.first() else {
        return Err(WavecastError::validation(
            "offline analysis needs at least one channel",
        ));
    };
    if channels.len() == 1 {
        return analyze_offline(first, segment_count);
    }

    let per_channel = channels
        .iter()
        .map(|c| analyze_offline(c, segment_count))
        .collect::<WavecastResult<Vec<_>>>()?;

    let inv = 1.0 / per_channel.len() as f32;
    let mut out = WaveformSummary {
        peaks: vec![0.0; segment_count],
        rms: vec![0.0; segment_count],
    };
    for s in &per_channel {
        for i in 0..segment_count {
            out.peaks[i] = out.peaks[i].max(s.peaks[i]);
            out.rms[i] += s.rms[i] * s.rms[i] * inv;
        }
    }
    for v in &mut out.rms {
        *v = v.sqrt();
    }
    Ok(out)
}

/// Realtime analyzer over a rolling window ending at the playback position.
///
/// Owns its FFT plan and scratch buffers; each call returns a fresh [`AudioVisualParameters`].
pub struct RealtimeAnalyzer {
    window: usize,
    planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl RealtimeAnalyzer {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW_SAMPLES)
    }

    /// Window lengths below 2 are raised to 2.
    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(2),
            planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Analyze the window of `source` ending at `current_time`.
    pub fn analyze(
        &mut self,
        source: &Arc<AudioSource>,
        current_time: f64,
    ) -> WavecastResult<AudioVisualParameters> {
        let end = source.sample_index_at(current_time);
        let start = end.saturating_sub(self.window);
        let windows: Vec<&[f32]> = source.channels().map(|c| &c[start..end]).collect();

        let mut params = self.analyze_window(&windows, current_time)?;
        params.source = Some(Arc::clone(source));
        Ok(params)
    }

    /// Analyze caller-supplied live sample windows (one slice per channel).
    pub fn analyze_window(
        &mut self,
        channels: &[&[f32]],
        current_time: f64,
    ) -> WavecastResult<AudioVisualParameters> {
        let len = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        if channels.is_empty() || len == 0 {
            return Ok(AudioVisualParameters::silent(current_time));
        }

        let inv = 1.0 / channels.len() as f32;
        let mono: Vec<f32> = (0..len)
            .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() * inv)
            .collect();

        let volume: Vec<f32> = channels.iter().map(|c| rms(&c[..len])).collect();
        let amplitude: Vec<f32> = channels.iter().map(|c| peak(&c[..len])).collect();
        let dynamic_range: Vec<f32> = volume
            .iter()
            .zip(&amplitude)
            .map(|(&r, &p)| crest_factor_db(p, r))
            .collect();
        let stereo: Vec<f32> = if channels.len() >= 2 {
            (0..len)
                .map(|i| (channels[0][i] - channels[1][i]) * 0.5)
                .collect()
        } else {
            Vec::new()
        };

        let (frequency, phase) = self.spectrum(&mono)?;

        Ok(AudioVisualParameters {
            time_domain: Arc::from(mono),
            volume: Arc::from(volume),
            amplitude: Arc::from(amplitude),
            frequency: Arc::from(frequency),
            phase: Arc::from(phase),
            stereo: Arc::from(stereo),
            dynamic_range: Arc::from(dynamic_range),
            current_time,
            source: None,
        })
    }

    fn spectrum(&mut self, mono: &[f32]) -> WavecastResult<(Vec<f32>, Vec<f32>)> {
        let size = self.window;
        let fft = self.prepare_fft(size);

        // Short windows (track start) are zero-padded at the front.
        let pad = size.saturating_sub(mono.len());
        fft.input[..pad].fill(0.0);
        let tail = &mono[mono.len().saturating_sub(size)..];
        for (i, &s) in tail.iter().enumerate() {
            let idx = pad + i;
            fft.input[idx] = s * hann_value(idx, size);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
            .map_err(|e| WavecastError::analysis(format!("fft failed: {e}")))?;

        // A full-scale Hann-windowed sine peaks at about size / 4.
        let norm = 4.0 / size as f32;
        let frequency = fft
            .spectrum
            .iter()
            .map(|b| (b.norm() * norm).clamp(0.0, 1.0))
            .collect();
        let phase = fft.spectrum.iter().map(|b| b.im.atan2(b.re)).collect();
        Ok((frequency, phase))
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        if self.fft.as_ref().is_some_and(|fft| fft.size != size) {
            self.fft = None;
        }
        let planner = &mut self.planner;
        self.fft.get_or_insert_with(|| {
            let plan = planner.plan_fft_forward(size);
            FftResources {
                size,
                input: plan.make_input_vec(),
                spectrum: plan.make_output_vec(),
                scratch: plan.make_scratch_vec(),
                plan,
            }
        })
    }
}

impl Default for RealtimeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RealtimeAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeAnalyzer")
            .field("window", &self.window)
            .field("fft_ready", &self.fft.is_some())
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }
    0.5 - 0.5 * (2.0 * PI * index as f32 / (len as f32 - 1.0)).cos()
}

fn crest_factor_db(peak: f32, rms: f32) -> f32 {
    if rms <= 1e-9 || peak <= 0.0 {
        return 0.0;
    }
    20.0 * (peak / rms).log10()
}

#[cfg(test)]
#[path = "../../tests/unit/audio/analysis.rs"]
mod tests;
