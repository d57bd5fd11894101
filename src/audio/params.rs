use std::sync::Arc;

use crate::audio::source::AudioSource;

/// Per-instant snapshot of everything effects may react to.
///
/// A fresh value is produced for every rendered frame; it is never mutated after construction,
/// so concurrent readers never observe a half-updated snapshot.
#[derive(Debug, Clone, Default)]
pub struct AudioVisualParameters {
    /// Mono time-domain window ending at `current_time`.
    pub time_domain: Arc<[f32]>,
    /// Per-channel RMS over the window.
    pub volume: Arc<[f32]>,
    /// Per-channel peak absolute value over the window.
    pub amplitude: Arc<[f32]>,
    /// Normalized (`0..=1`) magnitude spectrum of the window.
    pub frequency: Arc<[f32]>,
    /// Per-bin phase in radians.
    pub phase: Arc<[f32]>,
    /// Side signal `(L - R) / 2`; empty for mono sources.
    pub stereo: Arc<[f32]>,
    /// Per-channel crest factor in dB (`0` for silence).
    pub dynamic_range: Arc<[f32]>,
    /// Playback position in seconds.
    pub current_time: f64,
    /// Source the snapshot was computed from.
    pub source: Option<Arc<AudioSource>>,
}

impl AudioVisualParameters {
    /// Parameters for a frame with no audio loaded.
    pub fn silent(current_time: f64) -> Self {
        Self {
            current_time,
            ..Self::default()
        }
    }

    /// Mean of the per-channel RMS values.
    pub fn level(&self) -> f32 {
        if self.volume.is_empty() {
            return 0.0;
        }
        self.volume.iter().sum::<f32>() / self.volume.len() as f32
    }

    /// Largest per-channel peak.
    pub fn peak(&self) -> f32 {
        self.amplitude.iter().copied().fold(0.0, f32::max)
    }
}
