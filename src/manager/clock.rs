use std::time::{Duration, Instant};

/// Wall-clock playback position for the real-time preview loop.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    started_at: Option<Instant>,
    offset: Duration,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            started_at: None,
            offset: Duration::ZERO,
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Freeze the position where it is.
    pub fn pause(&mut self) {
        if let Some(at) = self.started_at.take() {
            self.offset += at.elapsed();
        }
    }

    /// Jump to `secs`; negative and non-finite values clamp to zero.
    pub fn seek(&mut self, secs: f64) {
        let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
        self.offset = Duration::from_secs_f64(secs);
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    pub fn position_secs(&self) -> f64 {
        let running = self.started_at.map(|at| at.elapsed()).unwrap_or_default();
        (self.offset + running).as_secs_f64()
    }
}
