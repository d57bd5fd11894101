use crate::encode::codec::{AudioBlock, AudioChunk, ChunkSink, Encoder, EncoderConfig, Muxer, VideoChunk};
use crate::foundation::error::{WavecastError, WavecastResult};
use crate::render::surface::FrameRGBA;

/// Destination the export pipeline drives: an in-thread [`EncodeSession`] or a worker handle.
pub trait EncodeTarget {
    /// Configure the encoder and muxer for `total_frames` video frames.
    fn initialize(&mut self, config: EncoderConfig, total_frames: u64) -> WavecastResult<()>;
    fn encode_video(
        &mut self,
        frame: FrameRGBA,
        frame_index: u64,
        timestamp_us: i64,
        key_frame: bool,
    ) -> WavecastResult<()>;
    fn encode_audio(&mut self, block: AudioBlock) -> WavecastResult<()>;
    /// Flush, close, and return the container bytes.
    fn finalize(&mut self) -> WavecastResult<Vec<u8>>;
    /// Tear down without output. Idempotent.
    fn cancel(&mut self);
    /// Encode calls dropped so far for out-of-order timestamps.
    fn rejected(&self) -> RejectedTimestamps;
}

/// Per-track counts of dropped out-of-order encode calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RejectedTimestamps {
    pub video: u64,
    pub audio: u64,
}

/// Per-track guard that only admits strictly increasing timestamps.
#[derive(Debug)]
pub struct TimestampTrack {
    name: &'static str,
    last: Option<i64>,
    rejected: u64,
}

impl TimestampTrack {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            last: None,
            rejected: 0,
        }
    }

    /// `true` when `timestamp_us` may be encoded; otherwise the call is counted and logged.
    pub fn admit(&mut self, timestamp_us: i64) -> bool {
        let in_order = timestamp_us >= 0 && self.last.is_none_or(|last| timestamp_us > last);
        if !in_order {
            self.rejected += 1;
            tracing::warn!(
                track = self.name,
                timestamp_us,
                last = self.last,
                "out-of-order timestamp rejected"
            );
            return false;
        }
        self.last = Some(timestamp_us);
        true
    }

    pub fn last(&self) -> Option<i64> {
        self.last
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Active,
    Finalized,
    Cancelled,
    Failed,
}

struct MuxerSink<'a>(&'a mut dyn Muxer);

impl ChunkSink for MuxerSink<'_> {
    fn video_chunk(&mut self, chunk: VideoChunk) -> WavecastResult<()> {
        self.0.add_video_chunk(chunk)
    }

    fn audio_chunk(&mut self, chunk: AudioChunk) -> WavecastResult<()> {
        self.0.add_audio_chunk(chunk)
    }
}

/// One export's encoder and muxer.
///
/// Both collaborators are closed exactly once, whichever way the session ends. Each track only
/// accepts strictly increasing timestamps; regressing calls are dropped before they reach the
/// encoder.
pub struct EncodeSession {
    encoder: Box<dyn Encoder>,
    muxer: Box<dyn Muxer>,
    state: SessionState,
    closed: bool,
    video_track: TimestampTrack,
    audio_track: TimestampTrack,
}

impl std::fmt::Debug for EncodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeSession")
            .field("state", &self.state)
            .field("closed", &self.closed)
            .field("rejected", &self.rejected())
            .finish()
    }
}

impl EncodeSession {
    pub fn new(encoder: Box<dyn Encoder>, muxer: Box<dyn Muxer>) -> Self {
        Self {
            encoder,
            muxer,
            state: SessionState::Created,
            closed: false,
            video_track: TimestampTrack::new("video"),
            audio_track: TimestampTrack::new("audio"),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn ensure_active(&self) -> WavecastResult<()> {
        match self.state {
            SessionState::Active => Ok(()),
            other => Err(WavecastError::encode_failed(format!(
                "no active encode session ({other:?})"
            ))),
        }
    }

    fn close_all(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.encoder.close();
        self.muxer.close();
    }

    fn fail(&mut self, err: WavecastError) -> WavecastError {
        self.state = SessionState::Failed;
        self.close_all();
        err
    }
}

impl EncodeTarget for EncodeSession {
    fn initialize(&mut self, config: EncoderConfig, total_frames: u64) -> WavecastResult<()> {
        if self.state != SessionState::Created {
            return Err(WavecastError::init_failed(format!(
                "session cannot be initialized from {:?}",
                self.state
            )));
        }
        let result = config
            .validate()
            .and_then(|()| self.encoder.configure(&config))
            .and_then(|()| self.muxer.add_video_track(&config.video_track()))
            .and_then(|()| self.muxer.add_audio_track(&config.audio_track()));
        match result {
            Ok(()) => {
                tracing::debug!(
                    width = config.width,
                    height = config.height,
                    fps = config.fps,
                    codec = config.codec.as_str(),
                    total_frames,
                    "encode session initialized"
                );
                self.state = SessionState::Active;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn encode_video(
        &mut self,
        frame: FrameRGBA,
        _frame_index: u64,
        timestamp_us: i64,
        key_frame: bool,
    ) -> WavecastResult<()> {
        self.ensure_active()?;
        if !self.video_track.admit(timestamp_us) {
            return Ok(());
        }
        let result = {
            let mut sink = MuxerSink(self.muxer.as_mut());
            self.encoder
                .encode_video(&frame, timestamp_us, key_frame, &mut sink)
        };
        result.map_err(|e| self.fail(e))
    }

    fn encode_audio(&mut self, block: AudioBlock) -> WavecastResult<()> {
        self.ensure_active()?;
        if !self.audio_track.admit(block.timestamp_us) {
            return Ok(());
        }
        let result = {
            let mut sink = MuxerSink(self.muxer.as_mut());
            self.encoder.encode_audio(&block, &mut sink)
        };
        result.map_err(|e| self.fail(e))
    }

    fn finalize(&mut self) -> WavecastResult<Vec<u8>> {
        if self.state != SessionState::Active {
            return Err(WavecastError::finalize_failed(format!(
                "no active encode session ({:?})",
                self.state
            )));
        }
        let flushed = {
            let mut sink = MuxerSink(self.muxer.as_mut());
            self.encoder.flush(&mut sink)
        };
        let bytes = flushed.and_then(|()| self.muxer.finalize());
        match bytes {
            Ok(bytes) if !bytes.is_empty() => {
                self.state = SessionState::Finalized;
                self.close_all();
                Ok(bytes)
            }
            Ok(_) => Err(self.fail(WavecastError::finalize_failed(
                "muxer produced no output",
            ))),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn cancel(&mut self) {
        if matches!(self.state, SessionState::Created | SessionState::Active) {
            self.state = SessionState::Cancelled;
        }
        self.close_all();
    }

    fn rejected(&self) -> RejectedTimestamps {
        RejectedTimestamps {
            video: self.video_track.rejected(),
            audio: self.audio_track.rejected(),
        }
    }
}

impl Drop for EncodeSession {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/session.rs"]
mod tests;
