//! Offline waveform analysis on a dedicated thread.
//!
//! Requests move their sample buffer into the worker and responses move the result arrays back,
//! so no sample memory is shared between the caller and the worker.

use std::sync::mpsc;
use std::thread::JoinHandle;

use crate::audio::analysis::{WaveformSummary, analyze_offline};
use crate::foundation::error::{WavecastError, WavecastResult};

/// Request accepted by [`AnalysisWorker`].
#[derive(Debug)]
pub enum AnalysisRequest {
    Analyze {
        channel_data: Vec<f32>,
        sample_rate: u32,
        segment_count: usize,
    },
}

/// Response produced by [`AnalysisWorker`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResponse {
    Result { peaks: Vec<f32>, rms: Vec<f32> },
    Error { message: String },
}

struct Job {
    request: AnalysisRequest,
    reply: mpsc::Sender<AnalysisResponse>,
}

/// Thread actor that runs [`analyze_offline`] off the rendering path.
pub struct AnalysisWorker {
    tx: Option<mpsc::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl AnalysisWorker {
    pub fn spawn() -> WavecastResult<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let handle = std::thread::Builder::new()
            .name("wavecast-analysis".to_owned())
            .spawn(move || {
                tracing::debug!("analysis worker started");
                while let Ok(job) = rx.recv() {
                    let response = handle_request(job.request);
                    // The requester may have given up on the ticket; that is not an error.
                    let _ = job.reply.send(response);
                }
                tracing::debug!("analysis worker stopped");
            })
            .map_err(|e| WavecastError::analysis(format!("failed to spawn analysis worker: {e}")))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Queue a request; the returned ticket yields the response.
    pub fn submit(&self, request: AnalysisRequest) -> WavecastResult<AnalysisTicket> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| WavecastError::analysis("analysis worker is shut down"))?;
        let (reply, rx) = mpsc::channel();
        tx.send(Job { request, reply })
            .map_err(|_| WavecastError::analysis("analysis worker disconnected"))?;
        Ok(AnalysisTicket { rx })
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("analysis worker panicked");
        }
    }
}

fn handle_request(request: AnalysisRequest) -> AnalysisResponse {
    match request {
        AnalysisRequest::Analyze {
            channel_data,
            sample_rate,
            segment_count,
        } => {
            if sample_rate == 0 {
                return AnalysisResponse::Error {
                    message: "sample_rate must be > 0".to_owned(),
                };
            }
            match analyze_offline(&channel_data, segment_count) {
                Ok(WaveformSummary { peaks, rms }) => AnalysisResponse::Result { peaks, rms },
                Err(e) => AnalysisResponse::Error {
                    message: e.to_string(),
                },
            }
        }
    }
}

/// Pending response for one submitted request.
#[derive(Debug)]
pub struct AnalysisTicket {
    rx: mpsc::Receiver<AnalysisResponse>,
}

impl AnalysisTicket {
    /// Block until the worker answers.
    pub fn wait(self) -> WavecastResult<WaveformSummary> {
        let response = self
            .rx
            .recv()
            .map_err(|_| WavecastError::analysis("analysis worker dropped the request"))?;
        into_summary(response)
    }

    /// Non-blocking poll. Returns `Ok(None)` while the worker is still busy.
    pub fn try_take(&mut self) -> WavecastResult<Option<WaveformSummary>> {
        match self.rx.try_recv() {
            Ok(r) => into_summary(r).map(Some),
            Err(mpsc::TryRecvError::Empty) => Ok(None),
            Err(mpsc::TryRecvError::Disconnected) => Err(WavecastError::analysis(
                "analysis worker dropped the request",
            )),
        }
    }
}

fn into_summary(response: AnalysisResponse) -> WavecastResult<WaveformSummary> {
    match response {
        AnalysisResponse::Result { peaks, rms } => Ok(WaveformSummary { peaks, rms }),
        AnalysisResponse::Error { message } => Err(WavecastError::analysis(message)),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/audio/worker.rs"]
mod tests;
