//! System-`ffmpeg` backed encoder and MP4 muxer.
//!
//! The encoder streams flattened RGBA frames into an `ffmpeg` child that writes an elementary
//! video stream to stdout; PCM passes through as `f32le` chunks. The muxer spools both tracks to
//! temp files and packages them into an MP4 with AAC audio on finalize.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread::JoinHandle;

use anyhow::Context as _;

use crate::encode::codec::{
    AudioBlock, AudioChunk, AudioTrackConfig, ChunkSink, Encoder, EncoderConfig,
    HardwareAcceleration, Muxer, VideoChunk, VideoCodec, VideoTrackConfig, flatten_premul_over_bg,
};
use crate::foundation::error::{WavecastError, WavecastResult};
use crate::render::surface::FrameRGBA;

const READ_CHUNK: usize = 64 * 1024;

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> WavecastResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

fn temp_path(stem: &str, ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "wavecast_{stem}_{}_{}.{ext}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ))
}

struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn elementary_format(codec: VideoCodec) -> (&'static str, &'static str) {
    match codec {
        VideoCodec::H264 => ("libx264", "h264"),
        VideoCodec::Vp9 => ("libvpx-vp9", "ivf"),
    }
}

fn spawn_failed(e: std::io::Error) -> WavecastError {
    WavecastError::init_failed(format!(
        "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
    ))
}

fn join_stderr(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .and_then(|r| r.ok())
        .unwrap_or_default()
}

struct Running {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout_rx: mpsc::Receiver<Vec<u8>>,
    stdout_drain: Option<JoinHandle<std::io::Result<()>>>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

/// [`Encoder`] that pipes raw frames through a system `ffmpeg`.
pub struct FfmpegEncoder {
    bg_rgb: [u8; 3],
    config: Option<EncoderConfig>,
    running: Option<Running>,
    scratch: Vec<u8>,
    last_timestamp_us: i64,
    emitted_key: bool,
}

impl std::fmt::Debug for FfmpegEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegEncoder")
            .field("config", &self.config)
            .field("running", &self.running.is_some())
            .finish()
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new([0, 0, 0])
    }
}

impl FfmpegEncoder {
    /// `bg_rgb` is the opaque color transparent pixels are flattened over.
    pub fn new(bg_rgb: [u8; 3]) -> Self {
        Self {
            bg_rgb,
            config: None,
            running: None,
            scratch: Vec::new(),
            last_timestamp_us: 0,
            emitted_key: false,
        }
    }

    fn emit_pending(&mut self, sink: &mut dyn ChunkSink) -> WavecastResult<()> {
        let Some(running) = self.running.as_ref() else {
            return Ok(());
        };
        let mut data = Vec::new();
        while let Ok(bytes) = running.stdout_rx.try_recv() {
            data.extend_from_slice(&bytes);
        }
        self.emit(data, sink)
    }

    fn emit(&mut self, data: Vec<u8>, sink: &mut dyn ChunkSink) -> WavecastResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let duration_us = self.config.as_ref().map_or(0, |c| c.frame_duration_us());
        let key_frame = !self.emitted_key;
        self.emitted_key = true;
        sink.video_chunk(VideoChunk {
            data,
            timestamp_us: self.last_timestamp_us,
            duration_us,
            key_frame,
        })
    }
}

impl Encoder for FfmpegEncoder {
    fn configure(&mut self, config: &EncoderConfig) -> WavecastResult<()> {
        config.validate()?;
        if !is_ffmpeg_on_path() {
            return Err(WavecastError::init_failed(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }
        if config.hardware_acceleration == HardwareAcceleration::PreferHardware {
            tracing::debug!("hardware acceleration requested; using the ffmpeg software encoder");
        }

        let (encoder, format) = elementary_format(config.codec);
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", config.width, config.height),
            "-r",
            &config.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            encoder,
            "-b:v",
            &config.video_bitrate.to_string(),
            "-g",
            &config.key_frame_interval_frames.max(1).to_string(),
            "-pix_fmt",
            "yuv420p",
            "-f",
            format,
            "pipe:1",
        ]);

        let mut child = cmd.spawn().map_err(spawn_failed)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WavecastError::init_failed("failed to open ffmpeg stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| WavecastError::init_failed("failed to open ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| WavecastError::init_failed("failed to open ffmpeg stderr"))?;

        let (tx, stdout_rx) = mpsc::channel::<Vec<u8>>();
        let stdout_drain = std::thread::spawn(move || -> std::io::Result<()> {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                let n = stdout.read(&mut buf)?;
                if n == 0 {
                    return Ok(());
                }
                if tx.send(buf[..n].to_vec()).is_err() {
                    return Ok(());
                }
            }
        });
        let stderr_drain = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        self.scratch = vec![0u8; (config.width as usize) * (config.height as usize) * 4];
        self.config = Some(config.clone());
        self.running = Some(Running {
            child,
            stdin: Some(stdin),
            stdout_rx,
            stdout_drain: Some(stdout_drain),
            stderr_drain: Some(stderr_drain),
        });
        self.last_timestamp_us = 0;
        self.emitted_key = false;
        Ok(())
    }

    fn encode_video(
        &mut self,
        frame: &FrameRGBA,
        timestamp_us: i64,
        _key_frame: bool,
        sink: &mut dyn ChunkSink,
    ) -> WavecastResult<()> {
        let cfg = self
            .config
            .as_ref()
            .ok_or_else(|| WavecastError::encode_failed("ffmpeg encoder not configured"))?;
        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(WavecastError::encode_failed(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        flatten_premul_over_bg(&mut self.scratch, &frame.data, self.bg_rgb)?;

        let stdin = self
            .running
            .as_mut()
            .and_then(|r| r.stdin.as_mut())
            .ok_or_else(|| WavecastError::encode_failed("ffmpeg encoder is already flushed"))?;
        stdin.write_all(&self.scratch).map_err(|e| {
            WavecastError::encode_failed(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        self.last_timestamp_us = timestamp_us;
        self.emit_pending(sink)
    }

    fn encode_audio(&mut self, block: &AudioBlock, sink: &mut dyn ChunkSink) -> WavecastResult<()> {
        if self.config.is_none() {
            return Err(WavecastError::encode_failed("ffmpeg encoder not configured"));
        }
        let data = block.samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        sink.audio_chunk(AudioChunk {
            data,
            timestamp_us: block.timestamp_us,
            duration_us: block.duration_us(),
        })
    }

    fn flush(&mut self, sink: &mut dyn ChunkSink) -> WavecastResult<()> {
        let Some(mut running) = self.running.take() else {
            return Err(WavecastError::encode_failed("ffmpeg encoder not configured"));
        };
        drop(running.stdin.take());

        let drained = running
            .stdout_drain
            .take()
            .map(|h| h.join())
            .transpose()
            .map_err(|_| WavecastError::encode_failed("ffmpeg stdout drain thread panicked"))?;
        if let Some(Err(e)) = drained {
            return Err(WavecastError::encode_failed(format!("ffmpeg stdout read failed: {e}")));
        }
        let mut rest = Vec::new();
        while let Ok(bytes) = running.stdout_rx.try_recv() {
            rest.extend_from_slice(&bytes);
        }

        let status = running.child.wait().map_err(|e| {
            WavecastError::encode_failed(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr = join_stderr(running.stderr_drain.take());
        if !status.success() {
            return Err(WavecastError::encode_failed(format!(
                "ffmpeg exited with status {}: {}",
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }
        self.emit(rest, sink)
    }

    fn close(&mut self) {
        if let Some(mut running) = self.running.take() {
            drop(running.stdin.take());
            let _ = running.child.kill();
            let _ = running.child.wait();
            if let Some(h) = running.stdout_drain.take() {
                let _ = h.join();
            }
            let _ = join_stderr(running.stderr_drain.take());
        }
        self.config = None;
    }
}

/// [`Muxer`] that packages the elementary stream and PCM into an MP4 with `ffmpeg`.
pub struct FfmpegMuxer {
    video: Option<(VideoTrackConfig, TempFileGuard, BufWriter<File>)>,
    audio: Option<(AudioTrackConfig, TempFileGuard, BufWriter<File>)>,
    video_bytes: u64,
}

impl std::fmt::Debug for FfmpegMuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegMuxer")
            .field("video", &self.video.as_ref().map(|(t, ..)| t))
            .field("audio", &self.audio.as_ref().map(|(t, ..)| t))
            .field("video_bytes", &self.video_bytes)
            .finish()
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegMuxer {
    pub fn new() -> Self {
        Self {
            video: None,
            audio: None,
            video_bytes: 0,
        }
    }
}

fn spool(stem: &str, ext: &str) -> WavecastResult<(TempFileGuard, BufWriter<File>)> {
    let path = temp_path(stem, ext);
    let file = File::create(&path)
        .with_context(|| format!("failed to create spool file '{}'", path.display()))?;
    Ok((TempFileGuard(Some(path)), BufWriter::new(file)))
}

fn write_spool(writer: &mut BufWriter<File>, data: &[u8]) -> WavecastResult<()> {
    writer
        .write_all(data)
        .map_err(|e| WavecastError::encode_failed(format!("failed to spool chunk: {e}")))
}

impl Muxer for FfmpegMuxer {
    fn add_video_track(&mut self, track: &VideoTrackConfig) -> WavecastResult<()> {
        let (_, ext) = elementary_format(track.codec);
        let (guard, writer) = spool("video", ext)?;
        self.video = Some((*track, guard, writer));
        self.video_bytes = 0;
        Ok(())
    }

    fn add_audio_track(&mut self, track: &AudioTrackConfig) -> WavecastResult<()> {
        let (guard, writer) = spool("audio", "f32le")?;
        self.audio = Some((*track, guard, writer));
        Ok(())
    }

    fn add_video_chunk(&mut self, chunk: VideoChunk) -> WavecastResult<()> {
        let (_, _, writer) = self
            .video
            .as_mut()
            .ok_or_else(|| WavecastError::encode_failed("no video track"))?;
        write_spool(writer, &chunk.data)?;
        self.video_bytes += chunk.data.len() as u64;
        Ok(())
    }

    fn add_audio_chunk(&mut self, chunk: AudioChunk) -> WavecastResult<()> {
        let (_, _, writer) = self
            .audio
            .as_mut()
            .ok_or_else(|| WavecastError::encode_failed("no audio track"))?;
        write_spool(writer, &chunk.data)
    }

    fn finalize(&mut self) -> WavecastResult<Vec<u8>> {
        let (Some((video, video_file, mut video_w)), Some((audio, audio_file, mut audio_w))) =
            (self.video.take(), self.audio.take())
        else {
            return Err(WavecastError::finalize_failed("tracks were never added"));
        };
        if self.video_bytes == 0 {
            return Err(WavecastError::finalize_failed("no video frames were added"));
        }
        for w in [&mut video_w, &mut audio_w] {
            w.flush()
                .map_err(|e| WavecastError::finalize_failed(format!("failed to flush spool: {e}")))?;
        }
        drop((video_w, audio_w));
        let (Some(video_path), Some(audio_path)) = (video_file.0.as_ref(), audio_file.0.as_ref())
        else {
            return Err(WavecastError::finalize_failed("spool files missing"));
        };

        let out = TempFileGuard(Some(temp_path("mux", "mp4")));
        let Some(out_path) = out.0.as_ref() else {
            return Err(WavecastError::finalize_failed("output path missing"));
        };
        let (_, format) = elementary_format(video.codec);
        let output = Command::new("ffmpeg")
            .args(["-y", "-loglevel", "error", "-f", format, "-framerate"])
            .arg(video.fps.to_string())
            .arg("-i")
            .arg(video_path)
            .args(["-f", "f32le", "-ar"])
            .arg(audio.sample_rate.to_string())
            .arg("-ac")
            .arg(audio.channels.to_string())
            .arg("-i")
            .arg(audio_path)
            .args(["-c:v", "copy", "-c:a", "aac", "-b:a"])
            .arg(audio.bitrate.to_string())
            .args(["-shortest", "-movflags", "+faststart"])
            .arg(out_path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| WavecastError::finalize_failed(format!("failed to run ffmpeg: {e}")))?;
        if !output.status.success() {
            return Err(WavecastError::finalize_failed(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let bytes = std::fs::read(out_path)
            .with_context(|| format!("failed to read muxed output '{}'", out_path.display()))?;
        tracing::debug!(bytes = bytes.len(), "mp4 muxed");
        Ok(bytes)
    }

    fn close(&mut self) {
        self.video = None;
        self.audio = None;
    }
}
