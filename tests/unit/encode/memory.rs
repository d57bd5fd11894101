use super::*;
use crate::encode::codec::HardwareAcceleration;

fn config() -> EncoderConfig {
    EncoderConfig {
        codec: VideoCodec::H264,
        width: 4,
        height: 2,
        fps: 10,
        video_bitrate: 1_000_000,
        audio_bitrate: 64_000,
        sample_rate: 8_000,
        channels: 1,
        hardware_acceleration: HardwareAcceleration::NoPreference,
        key_frame_interval_frames: 20,
    }
}

fn frame(value: u8) -> FrameRGBA {
    FrameRGBA {
        width: 4,
        height: 2,
        data: [value, value, value, 255].repeat(8),
    }
}

#[derive(Default)]
struct Collect {
    video: Vec<VideoChunk>,
    audio: Vec<AudioChunk>,
}

impl ChunkSink for Collect {
    fn video_chunk(&mut self, chunk: VideoChunk) -> WavecastResult<()> {
        self.video.push(chunk);
        Ok(())
    }

    fn audio_chunk(&mut self, chunk: AudioChunk) -> WavecastResult<()> {
        self.audio.push(chunk);
        Ok(())
    }
}

#[test]
fn encoder_rejects_odd_or_empty_sizes() {
    let mut enc = InMemoryEncoder::new();
    for bad in [
        EncoderConfig { width: 0, ..config() },
        EncoderConfig { width: 5, ..config() },
    ] {
        let err = enc.configure(&bad).unwrap_err();
        assert!(matches!(err, WavecastError::InitFailed(_)));
    }
    enc.configure(&config()).unwrap();
}

#[test]
fn encoder_emits_one_chunk_per_call() {
    let probe = CallProbe::new();
    let mut enc = InMemoryEncoder::with_probe(probe.clone());
    enc.configure(&config()).unwrap();
    let mut sink = Collect::default();

    enc.encode_video(&frame(7), 0, true, &mut sink).unwrap();
    enc.encode_video(&frame(9), 100_000, false, &mut sink).unwrap();
    enc.encode_audio(
        &AudioBlock {
            samples: vec![1.0, -1.0, 0.0, 0.5],
            channels: 1,
            sample_rate: 8_000,
            frame_index: 0,
            timestamp_us: 0,
        },
        &mut sink,
    )
    .unwrap();

    assert_eq!(sink.video.len(), 2);
    assert_eq!(sink.video[0].data, vec![7u8; 24]);
    assert!(sink.video[0].key_frame && !sink.video[1].key_frame);
    assert_eq!(sink.video[1].duration_us, 100_000);
    assert_eq!(sink.audio[0].data.len(), 8);
    assert_eq!(&sink.audio[0].data[0..2], &i16::MAX.to_le_bytes());

    let snap = probe.snapshot();
    assert_eq!((snap.video_encodes, snap.key_frames, snap.audio_encodes), (2, 1, 1));
}

#[test]
fn encoder_fails_on_the_requested_frame() {
    let mut enc = InMemoryEncoder::new().fail_video_at(1);
    enc.configure(&config()).unwrap();
    let mut sink = Collect::default();
    enc.encode_video(&frame(1), 0, true, &mut sink).unwrap();
    let err = enc.encode_video(&frame(1), 1, false, &mut sink).unwrap_err();
    assert!(matches!(err, WavecastError::EncodeFailed(_)));
}

#[test]
fn unconfigured_encoder_refuses_frames() {
    let mut enc = InMemoryEncoder::new();
    let mut sink = Collect::default();
    assert!(enc.encode_video(&frame(0), 0, true, &mut sink).is_err());
}

#[test]
fn muxer_without_frames_fails_to_finalize() {
    let mut mux = InMemoryMuxer::new();
    mux.add_video_track(&config().video_track()).unwrap();
    mux.add_audio_track(&config().audio_track()).unwrap();
    let err = mux.finalize().unwrap_err();
    assert!(matches!(err, WavecastError::FinalizeFailed(_)));
}

#[test]
fn container_parses_back() {
    let mut mux = InMemoryMuxer::new();
    mux.add_video_track(&config().video_track()).unwrap();
    mux.add_audio_track(&config().audio_track()).unwrap();
    mux.add_video_chunk(VideoChunk {
        data: vec![1, 2, 3],
        timestamp_us: 0,
        duration_us: 100_000,
        key_frame: true,
    })
    .unwrap();
    mux.add_audio_chunk(AudioChunk {
        data: vec![9, 9],
        timestamp_us: 0,
        duration_us: 125,
    })
    .unwrap();
    let bytes = mux.finalize().unwrap();

    let parsed = parse_container(&bytes).unwrap();
    assert_eq!((parsed.width, parsed.height, parsed.fps), (4, 2, 10));
    assert_eq!((parsed.sample_rate, parsed.channels), (8_000, 1));
    assert_eq!(parsed.video.len(), 1);
    assert!(parsed.video[0].key_frame);
    assert_eq!(parsed.audio[0].data, vec![9, 9]);

    assert!(parse_container(&bytes[..bytes.len() - 1]).is_err());
    assert!(parse_container(b"nope").is_err());
}

#[test]
fn chunks_before_tracks_are_rejected() {
    let mut mux = InMemoryMuxer::new();
    let err = mux
        .add_audio_chunk(AudioChunk {
            data: vec![],
            timestamp_us: 0,
            duration_us: 0,
        })
        .unwrap_err();
    assert!(matches!(err, WavecastError::EncodeFailed(_)));
}
