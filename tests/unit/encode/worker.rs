use super::*;
use crate::encode::codec::{HardwareAcceleration, VideoCodec};
use crate::encode::memory::{CallProbe, InMemoryEncoder, InMemoryMuxer, parse_container};

fn config() -> EncoderConfig {
    EncoderConfig {
        codec: VideoCodec::H264,
        width: 2,
        height: 2,
        fps: 10,
        video_bitrate: 500_000,
        audio_bitrate: 64_000,
        sample_rate: 8_000,
        channels: 1,
        hardware_acceleration: HardwareAcceleration::NoPreference,
        key_frame_interval_frames: 20,
    }
}

fn frame() -> FrameRGBA {
    FrameRGBA {
        width: 2,
        height: 2,
        data: vec![255; 16],
    }
}

fn spawn(probe: &CallProbe, encoder: InMemoryEncoder) -> EncodeWorkerHandle {
    EncodeWorker::spawn(
        Box::new(encoder),
        Box::new(InMemoryMuxer::with_probe(probe.clone())),
        2,
    )
    .unwrap()
}

#[test]
fn worker_encodes_and_returns_container() {
    let probe = CallProbe::new();
    let mut handle = spawn(&probe, InMemoryEncoder::with_probe(probe.clone()));
    handle.initialize(config(), 5).unwrap();
    for i in 0..5u64 {
        handle
            .encode_video(frame(), i, i as i64 * 100_000, i == 0)
            .unwrap();
    }
    handle
        .encode_audio(AudioBlock {
            samples: vec![0.25; 800],
            channels: 1,
            sample_rate: 8_000,
            frame_index: 0,
            timestamp_us: 0,
        })
        .unwrap();
    let bytes = handle.finalize().unwrap();

    assert_eq!(handle.progress(), (5, 5));
    assert!(!handle.is_open());
    let parsed = parse_container(&bytes).unwrap();
    assert_eq!(parsed.video.len(), 5);
    assert_eq!(parsed.audio.len(), 1);

    let err = handle.encode_video(frame(), 5, 500_000, false).unwrap_err();
    assert!(matches!(err, WavecastError::EncodeFailed(_)));
    drop(handle);
    assert_eq!(probe.snapshot().encoder_closes, 1);
}

#[test]
fn init_failure_is_reported_synchronously() {
    let probe = CallProbe::new();
    let mut handle = spawn(&probe, InMemoryEncoder::with_probe(probe.clone()));
    let err = handle
        .initialize(
            EncoderConfig {
                height: 0,
                ..config()
            },
            1,
        )
        .unwrap_err();
    assert!(matches!(err, WavecastError::InitFailed(_)));
    assert!(!handle.is_open());
}

#[test]
fn encode_failure_surfaces_on_a_later_call() {
    let probe = CallProbe::new();
    let mut handle = spawn(
        &probe,
        InMemoryEncoder::with_probe(probe.clone()).fail_video_at(0),
    );
    handle.initialize(config(), 3).unwrap();
    handle.encode_video(frame(), 0, 0, true).unwrap();

    let err = handle.finalize().unwrap_err();
    assert!(matches!(err, WavecastError::EncodeFailed(_)), "{err}");
    assert_eq!(probe.snapshot().muxer_closes, 1);
}

#[test]
fn cancel_stops_the_worker_and_refuses_sends() {
    let probe = CallProbe::new();
    let mut handle = spawn(&probe, InMemoryEncoder::with_probe(probe.clone()));
    handle.initialize(config(), 10).unwrap();
    handle.encode_video(frame(), 0, 0, true).unwrap();
    handle.cancel();
    handle.cancel();

    assert!(handle.encode_video(frame(), 1, 100_000, false).is_err());
    let err = handle.finalize().unwrap_err();
    assert!(matches!(err, WavecastError::FinalizeFailed(_)));

    let snap = probe.snapshot();
    assert_eq!((snap.encoder_closes, snap.muxer_closes), (1, 1));
    assert_eq!(snap.muxer_finalizes, 0);
}

#[test]
fn worker_reports_rejected_timestamps_after_finalize() {
    let probe = CallProbe::new();
    let mut handle = spawn(&probe, InMemoryEncoder::with_probe(probe.clone()));
    handle.initialize(config(), 3).unwrap();
    handle.encode_video(frame(), 0, 100_000, true).unwrap();
    handle.encode_video(frame(), 1, 100_000, false).unwrap();
    handle.encode_video(frame(), 2, 200_000, false).unwrap();
    let bytes = handle.finalize().unwrap();

    assert_eq!(handle.rejected(), RejectedTimestamps { video: 1, audio: 0 });
    assert_eq!(parse_container(&bytes).unwrap().video.len(), 2);
    assert_eq!(probe.snapshot().video_encodes, 2);
}
