//! Virtual-time arithmetic for export: frame counts, timestamps, and key frames.

/// Video frames needed to cover `total_samples` at `fps`, rounded up.
pub fn total_frames(total_samples: usize, sample_rate: u32, fps: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    let num = (total_samples as u128) * u128::from(fps);
    num.div_ceil(u128::from(sample_rate)) as u64
}

/// Presentation timestamp of video frame `index`, in microseconds.
pub fn frame_timestamp_us(index: u64, fps: u32) -> i64 {
    if fps == 0 {
        return 0;
    }
    (i128::from(index) * 1_000_000 / i128::from(fps)) as i64
}

/// Timestamp of the audio block starting at sample `offset`, in microseconds.
pub fn sample_timestamp_us(offset: usize, sample_rate: u32) -> i64 {
    if sample_rate == 0 {
        return 0;
    }
    ((offset as i128) * 1_000_000 / i128::from(sample_rate)) as i64
}

/// Samples per channel in one audio block: one video frame's worth, at least one.
pub fn samples_per_block(sample_rate: u32, fps: u32) -> usize {
    if fps == 0 {
        return sample_rate.max(1) as usize;
    }
    (sample_rate / fps).max(1) as usize
}

/// Emits a key frame whenever the running timestamp reaches the next scheduled boundary.
#[derive(Debug)]
pub struct KeyFrameScheduler {
    interval_us: i64,
    next_us: i64,
}

impl KeyFrameScheduler {
    /// Intervals that are not positive put a key frame on every frame.
    pub fn new(interval_secs: f64) -> Self {
        let interval_us = if interval_secs.is_finite() && interval_secs > 0.0 {
            (interval_secs * 1_000_000.0).round() as i64
        } else {
            0
        };
        Self {
            interval_us,
            next_us: 0,
        }
    }

    pub fn is_key(&mut self, timestamp_us: i64) -> bool {
        if timestamp_us < self.next_us {
            return false;
        }
        if self.interval_us == 0 {
            return true;
        }
        while self.next_us <= timestamp_us {
            self.next_us += self.interval_us;
        }
        true
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/timeline.rs"]
mod tests;
