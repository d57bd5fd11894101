//! Encode session on a dedicated thread.
//!
//! The controller talks to the worker only through messages: frames and PCM blocks move into the
//! worker, progress and the final container bytes move back.

use std::sync::mpsc;
use std::thread::JoinHandle;

use crate::encode::codec::{AudioBlock, Encoder, EncoderConfig, Muxer};
use crate::encode::session::{EncodeSession, EncodeTarget, RejectedTimestamps};
use crate::foundation::error::{WavecastError, WavecastResult};
use crate::render::surface::FrameRGBA;

pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Controller-to-worker messages.
#[derive(Debug)]
pub enum EncodeRequest {
    Initialize {
        config: EncoderConfig,
        total_frames: u64,
    },
    EncodeVideo {
        frame: FrameRGBA,
        frame_index: u64,
        timestamp_us: i64,
        key_frame: bool,
    },
    EncodeAudio(AudioBlock),
    Finalize,
    Cancel,
}

/// Worker-to-controller messages.
#[derive(Debug)]
pub enum EncodeResponse {
    Progress {
        processed: u64,
        total: u64,
        rejected: RejectedTimestamps,
    },
    Result(Vec<u8>),
    Error(WavecastError),
}

/// Spawns encode workers.
pub struct EncodeWorker;

impl EncodeWorker {
    /// Move `encoder` and `muxer` onto a new thread; at most `capacity` requests queue up before
    /// sends block.
    pub fn spawn(
        encoder: Box<dyn Encoder>,
        muxer: Box<dyn Muxer>,
        capacity: usize,
    ) -> WavecastResult<EncodeWorkerHandle> {
        let (tx, rx) = mpsc::sync_channel::<EncodeRequest>(capacity.max(1));
        let (resp_tx, resp_rx) = mpsc::channel::<EncodeResponse>();
        let handle = std::thread::Builder::new()
            .name("wavecast-encode".to_owned())
            .spawn(move || run(EncodeSession::new(encoder, muxer), rx, resp_tx))
            .map_err(|e| WavecastError::init_failed(format!("failed to spawn encode worker: {e}")))?;

        Ok(EncodeWorkerHandle {
            tx: Some(tx),
            rx: resp_rx,
            handle: Some(handle),
            processed: 0,
            total: 0,
            rejected: RejectedTimestamps::default(),
        })
    }
}

fn run(
    mut session: EncodeSession,
    rx: mpsc::Receiver<EncodeRequest>,
    tx: mpsc::Sender<EncodeResponse>,
) {
    tracing::debug!("encode worker started");
    let mut processed = 0u64;
    let mut total = 0u64;
    let mut failed = false;

    while let Ok(request) = rx.recv() {
        let response = match request {
            EncodeRequest::Initialize {
                config,
                total_frames,
            } => {
                total = total_frames;
                session
                    .initialize(config, total_frames)
                    .map(|()| EncodeResponse::Progress {
                        processed: 0,
                        total,
                        rejected: RejectedTimestamps::default(),
                    })
            }
            EncodeRequest::EncodeVideo { .. } | EncodeRequest::EncodeAudio(_) if failed => continue,
            EncodeRequest::EncodeVideo {
                frame,
                frame_index,
                timestamp_us,
                key_frame,
            } => session
                .encode_video(frame, frame_index, timestamp_us, key_frame)
                .map(|()| {
                    processed += 1;
                    EncodeResponse::Progress {
                        processed,
                        total,
                        rejected: session.rejected(),
                    }
                }),
            EncodeRequest::EncodeAudio(block) => match session.encode_audio(block) {
                Ok(()) => continue,
                Err(e) => Err(e),
            },
            EncodeRequest::Finalize => {
                let _ = tx.send(EncodeResponse::Progress {
                    processed,
                    total,
                    rejected: session.rejected(),
                });
                let response = session.finalize().map(EncodeResponse::Result);
                let _ = tx.send(response.unwrap_or_else(EncodeResponse::Error));
                break;
            }
            EncodeRequest::Cancel => {
                session.cancel();
                break;
            }
        };

        let response = response.unwrap_or_else(|e| {
            failed = true;
            EncodeResponse::Error(e)
        });
        // The controller may already be gone; the session still closes on drop.
        if tx.send(response).is_err() {
            break;
        }
    }
    tracing::debug!(processed, "encode worker stopped");
}

/// Controller side of an [`EncodeWorker`]. Refuses further sends after `finalize` or `cancel`.
pub struct EncodeWorkerHandle {
    tx: Option<mpsc::SyncSender<EncodeRequest>>,
    rx: mpsc::Receiver<EncodeResponse>,
    handle: Option<JoinHandle<()>>,
    processed: u64,
    total: u64,
    rejected: RejectedTimestamps,
}

impl std::fmt::Debug for EncodeWorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeWorkerHandle")
            .field("open", &self.tx.is_some())
            .field("processed", &self.processed)
            .field("total", &self.total)
            .finish()
    }
}

impl EncodeWorkerHandle {
    /// Frames acknowledged by the worker so far, and the expected total.
    pub fn progress(&self) -> (u64, u64) {
        (self.processed, self.total)
    }

    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }

    fn send(&mut self, request: EncodeRequest) -> WavecastResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| WavecastError::encode_failed("encode worker no longer accepts requests"))?;
        if tx.send(request).is_err() {
            self.close();
            return Err(self
                .drain_error()
                .unwrap_or_else(|| WavecastError::encode_failed("encode worker disconnected")));
        }
        Ok(())
    }

    // Apply queued responses; the first error closes the handle.
    fn poll(&mut self) -> WavecastResult<()> {
        while let Ok(response) = self.rx.try_recv() {
            if let Err(e) = self.apply(response) {
                self.close();
                return Err(e);
            }
        }
        Ok(())
    }

    fn apply(&mut self, response: EncodeResponse) -> WavecastResult<Option<Vec<u8>>> {
        match response {
            EncodeResponse::Progress {
                processed,
                total,
                rejected,
            } => {
                self.processed = processed;
                self.total = total;
                self.rejected = rejected;
                Ok(None)
            }
            EncodeResponse::Result(bytes) => Ok(Some(bytes)),
            EncodeResponse::Error(e) => Err(e),
        }
    }

    fn drain_error(&mut self) -> Option<WavecastError> {
        self.rx.try_iter().find_map(|r| match r {
            EncodeResponse::Error(e) => Some(e),
            _ => None,
        })
    }

    fn close(&mut self) {
        self.tx = None;
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("encode worker panicked");
        }
    }
}

impl EncodeTarget for EncodeWorkerHandle {
    fn initialize(&mut self, config: EncoderConfig, total_frames: u64) -> WavecastResult<()> {
        self.send(EncodeRequest::Initialize {
            config,
            total_frames,
        })?;
        let response = self.rx.recv().map_err(|_| {
            WavecastError::init_failed("encode worker exited during initialization")
        })?;
        if let Err(e) = self.apply(response) {
            self.close();
            return Err(e);
        }
        Ok(())
    }

    fn encode_video(
        &mut self,
        frame: FrameRGBA,
        frame_index: u64,
        timestamp_us: i64,
        key_frame: bool,
    ) -> WavecastResult<()> {
        self.poll()?;
        self.send(EncodeRequest::EncodeVideo {
            frame,
            frame_index,
            timestamp_us,
            key_frame,
        })
    }

    fn encode_audio(&mut self, block: AudioBlock) -> WavecastResult<()> {
        self.poll()?;
        self.send(EncodeRequest::EncodeAudio(block))
    }

    fn finalize(&mut self) -> WavecastResult<Vec<u8>> {
        self.send(EncodeRequest::Finalize)
            .map_err(|e| WavecastError::finalize_failed(e.to_string()))?;
        self.tx = None;

        let outcome = loop {
            let Ok(response) = self.rx.recv() else {
                break Err(WavecastError::finalize_failed(
                    "encode worker exited before producing output",
                ));
            };
            match self.apply(response) {
                Ok(Some(bytes)) => break Ok(bytes),
                Ok(None) => continue,
                Err(e) => break Err(e),
            }
        };
        self.close();
        outcome
    }

    fn cancel(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(EncodeRequest::Cancel);
        }
        self.close();
    }

    /// Rejections the worker has reported so far; complete once `finalize` returns.
    fn rejected(&self) -> RejectedTimestamps {
        self.rejected
    }
}

impl Drop for EncodeWorkerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/worker.rs"]
mod tests;
