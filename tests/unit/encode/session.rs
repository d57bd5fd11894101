use super::*;
use crate::encode::codec::{HardwareAcceleration, VideoCodec};
use crate::encode::memory::{CallProbe, InMemoryEncoder, InMemoryMuxer, parse_container};

fn config() -> EncoderConfig {
    EncoderConfig {
        codec: VideoCodec::H264,
        width: 2,
        height: 2,
        fps: 25,
        video_bitrate: 500_000,
        audio_bitrate: 64_000,
        sample_rate: 8_000,
        channels: 1,
        hardware_acceleration: HardwareAcceleration::NoPreference,
        key_frame_interval_frames: 50,
    }
}

fn frame() -> FrameRGBA {
    FrameRGBA {
        width: 2,
        height: 2,
        data: vec![255; 16],
    }
}

fn block(timestamp_us: i64) -> AudioBlock {
    AudioBlock {
        samples: vec![0.0; 320],
        channels: 1,
        sample_rate: 8_000,
        frame_index: 0,
        timestamp_us,
    }
}

fn session(probe: &CallProbe) -> EncodeSession {
    EncodeSession::new(
        Box::new(InMemoryEncoder::with_probe(probe.clone())),
        Box::new(InMemoryMuxer::with_probe(probe.clone())),
    )
}

#[test]
fn finalize_returns_container_and_closes_once() {
    let probe = CallProbe::new();
    let mut s = session(&probe);
    s.initialize(config(), 1).unwrap();
    s.encode_video(frame(), 0, 0, true).unwrap();
    s.encode_audio(AudioBlock {
        samples: vec![0.0; 320],
        channels: 1,
        sample_rate: 8_000,
        frame_index: 0,
        timestamp_us: 0,
    })
    .unwrap();
    let bytes = s.finalize().unwrap();
    assert_eq!(s.state(), SessionState::Finalized);

    let parsed = parse_container(&bytes).unwrap();
    assert_eq!((parsed.video.len(), parsed.audio.len()), (1, 1));

    s.cancel();
    drop(s);
    let snap = probe.snapshot();
    assert_eq!((snap.encoder_closes, snap.muxer_closes), (1, 1));
}

#[test]
fn calls_after_finalize_or_cancel_fail() {
    let probe = CallProbe::new();
    let mut s = session(&probe);
    s.initialize(config(), 1).unwrap();
    s.cancel();
    s.cancel();
    assert_eq!(s.state(), SessionState::Cancelled);

    let err = s.encode_video(frame(), 0, 0, true).unwrap_err();
    assert!(matches!(err, WavecastError::EncodeFailed(_)));
    let err = s.finalize().unwrap_err();
    assert!(matches!(err, WavecastError::FinalizeFailed(_)));
    drop(s);
    assert_eq!(probe.snapshot().encoder_closes, 1);
}

#[test]
fn init_failure_tears_down() {
    let probe = CallProbe::new();
    let mut s = session(&probe);
    let err = s
        .initialize(
            EncoderConfig {
                width: 3,
                ..config()
            },
            1,
        )
        .unwrap_err();
    assert!(matches!(err, WavecastError::InitFailed(_)));
    assert_eq!(s.state(), SessionState::Failed);
    assert_eq!(probe.snapshot().muxer_closes, 1);
}

#[test]
fn finalize_without_frames_fails() {
    let probe = CallProbe::new();
    let mut s = session(&probe);
    s.initialize(config(), 1).unwrap();
    let err = s.finalize().unwrap_err();
    assert!(matches!(err, WavecastError::FinalizeFailed(_)));
    assert_eq!(s.state(), SessionState::Failed);
}

#[test]
fn encode_error_is_fatal_to_the_session() {
    let probe = CallProbe::new();
    let mut s = EncodeSession::new(
        Box::new(InMemoryEncoder::with_probe(probe.clone()).fail_video_at(0)),
        Box::new(InMemoryMuxer::with_probe(probe.clone())),
    );
    s.initialize(config(), 1).unwrap();
    assert!(s.encode_video(frame(), 0, 0, true).is_err());
    assert_eq!(s.state(), SessionState::Failed);
    assert!(s.encode_video(frame(), 1, 40_000, false).is_err());
    assert_eq!(probe.snapshot().video_encodes, 1);
}

#[test]
fn track_rejects_out_of_order_and_keeps_last() {
    let mut track = TimestampTrack::new("video");
    assert!(track.admit(0));
    assert!(track.admit(33_333));
    assert!(!track.admit(33_333));
    assert!(!track.admit(10));
    assert!(!track.admit(-1));
    assert_eq!(track.last(), Some(33_333));
    assert_eq!(track.rejected(), 3);
    assert!(track.admit(66_666));
}

#[test]
fn regressing_timestamps_are_dropped_before_the_encoder() {
    let probe = CallProbe::new();
    let mut s = session(&probe);
    s.initialize(config(), 2).unwrap();
    s.encode_video(frame(), 0, 40_000, true).unwrap();
    s.encode_video(frame(), 1, 0, false).unwrap();
    s.encode_audio(block(40_000)).unwrap();
    s.encode_audio(block(0)).unwrap();
    assert_eq!(s.rejected(), RejectedTimestamps { video: 1, audio: 1 });
    assert_eq!(s.state(), SessionState::Active);

    let parsed = parse_container(&s.finalize().unwrap()).unwrap();
    let video: Vec<i64> = parsed.video.iter().map(|c| c.timestamp_us).collect();
    let audio: Vec<i64> = parsed.audio.iter().map(|c| c.timestamp_us).collect();
    assert_eq!(video, vec![40_000]);
    assert_eq!(audio, vec![40_000]);

    let snap = probe.snapshot();
    assert_eq!((snap.video_encodes, snap.audio_encodes), (1, 1));
}
