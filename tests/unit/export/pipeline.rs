use super::*;
use crate::effects::config::EffectConfig;
use crate::effects::waveform::AnalysisPhase;
use crate::encode::memory::{CallProbe, InMemoryEncoder, InMemoryMuxer, parse_container};
use crate::encode::session::{EncodeSession, SessionState};
use crate::encode::worker::EncodeWorker;
use crate::foundation::core::Canvas;
use crate::manager::effect_manager::ManagerOpts;
use serde_json::json;

const RATE: u32 = 8_000;

fn tone(seconds: f64) -> Arc<AudioSource> {
    let n = (f64::from(RATE) * seconds) as usize;
    let samples = (0..n).map(|i| ((i as f32) * 0.03).sin() * 0.4).collect();
    Arc::new(AudioSource::from_channels(vec![samples], RATE).unwrap())
}

fn manager() -> EffectManager {
    let mut m = EffectManager::new(ManagerOpts {
        canvas: Canvas::new(8, 8),
        ..ManagerOpts::default()
    })
    .unwrap();
    m.add_effect_config(
        EffectConfig::from_json(json!({"type": "background", "id": "bg", "color": "#102030"}))
            .unwrap(),
    )
    .unwrap();
    m.add_effect_config(
        EffectConfig::from_json(json!({"type": "waveform", "id": "wave", "barCount": 4}))
            .unwrap(),
    )
    .unwrap();
    m
}

fn session(probe: &CallProbe) -> EncodeSession {
    EncodeSession::new(
        Box::new(InMemoryEncoder::with_probe(probe.clone())),
        Box::new(InMemoryMuxer::with_probe(probe.clone())),
    )
}

#[test]
fn two_second_export_encodes_every_frame_and_block() {
    let audio = tone(2.0);
    let mut m = manager();
    let probe = CallProbe::new();
    let mut target = session(&probe);
    let mut pipeline = ExportPipeline::new(ExportSettings::default()).unwrap();
    let mut reported = Vec::new();

    let outcome = pipeline
        .export(&mut m, &audio, &mut target, |p| reported.push(p))
        .unwrap();

    let ExportOutcome::Completed(file) = outcome else {
        panic!("export did not complete");
    };
    assert!(file.file_name.starts_with("wavecast-export-"));
    assert!(file.file_name.ends_with(".mp4"));

    let block = samples_per_block(RATE, 30) as u64;
    let expected_blocks = (2 * u64::from(RATE)).div_ceil(block);
    let snap = probe.snapshot();
    assert_eq!(snap.video_encodes, 60);
    assert_eq!(snap.audio_encodes, expected_blocks);
    assert_eq!(snap.key_frames, 1);
    assert_eq!((snap.encoder_closes, snap.muxer_closes), (1, 1));

    assert_eq!(pipeline.state(), ExportState::Completed);
    assert_eq!(pipeline.progress(), 1.0);
    assert_eq!(reported.len(), 60);
    assert_eq!(reported.last().copied(), Some(1.0));
    assert!(reported.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(target.state(), SessionState::Finalized);

    let stats = pipeline.stats();
    assert_eq!((stats.total_frames, stats.video_frames), (60, 60));
    assert_eq!(stats.audio_blocks, expected_blocks);
    assert_eq!((stats.rejected_video, stats.rejected_audio), (0, 0));

    let parsed = parse_container(&file.bytes).unwrap();
    assert_eq!((parsed.width, parsed.height, parsed.fps), (8, 8, 30));
    assert!(parsed.video.windows(2).all(|w| w[0].timestamp_us < w[1].timestamp_us));
    assert!(parsed.audio.windows(2).all(|w| w[0].timestamp_us < w[1].timestamp_us));
    assert_eq!(parsed.video[0].timestamp_us, 0);
    assert_eq!(parsed.audio[0].timestamp_us, 0);
}

#[test]
fn key_frames_follow_the_interval() {
    let audio = tone(5.0);
    let mut m = manager();
    let probe = CallProbe::new();
    let mut target = session(&probe);
    let mut pipeline = ExportPipeline::new(ExportSettings::default()).unwrap();

    let ExportOutcome::Completed(file) = pipeline.export(&mut m, &audio, &mut target, |_| {}).unwrap()
    else {
        panic!("export did not complete");
    };
    let parsed = parse_container(&file.bytes).unwrap();
    let keys: Vec<usize> = parsed
        .video
        .iter()
        .enumerate()
        .filter(|(_, c)| c.key_frame)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(keys, vec![0, 60, 120]);
    assert_eq!(pipeline.stats().key_frames, 3);
}

#[test]
fn cancelling_mid_export_delivers_nothing_and_resumes_the_loop() {
    let audio = tone(2.0);
    let mut m = manager();
    m.start();
    let probe = CallProbe::new();
    let mut target = session(&probe);
    let mut pipeline = ExportPipeline::new(ExportSettings::default()).unwrap();
    let token = pipeline.cancel_token();

    let outcome = pipeline
        .export(&mut m, &audio, &mut target, |p| {
            if p >= 0.5 {
                token.cancel();
            }
        })
        .unwrap();

    assert_eq!(outcome, ExportOutcome::Cancelled);
    assert_eq!(pipeline.state(), ExportState::Cancelled);
    assert_eq!(pipeline.progress(), 0.0);
    assert_eq!(target.state(), SessionState::Cancelled);

    let snap = probe.snapshot();
    assert_eq!(snap.video_encodes, 30);
    assert_eq!(snap.audio_encodes, 0);
    assert_eq!(snap.muxer_finalizes, 0);
    assert_eq!((snap.encoder_closes, snap.muxer_closes), (1, 1));

    let stats = m.loop_stats();
    assert_eq!((stats.starts, stats.stops), (2, 1));
    assert!(m.is_running());
}

#[test]
fn a_new_export_clears_a_previous_cancel() {
    let audio = tone(0.5);
    let mut m = manager();
    let mut pipeline = ExportPipeline::new(ExportSettings::default()).unwrap();
    pipeline.cancel_token().cancel();

    let probe = CallProbe::new();
    let outcome = pipeline
        .export(&mut m, &audio, &mut session(&probe), |_| {})
        .unwrap();
    assert!(matches!(outcome, ExportOutcome::Completed(_)));
}

#[test]
fn encode_failure_aborts_and_resets_progress() {
    let audio = tone(1.0);
    let mut m = manager();
    m.start();
    let probe = CallProbe::new();
    let mut target = EncodeSession::new(
        Box::new(InMemoryEncoder::with_probe(probe.clone()).fail_video_at(10)),
        Box::new(InMemoryMuxer::with_probe(probe.clone())),
    );
    let mut pipeline = ExportPipeline::new(ExportSettings::default()).unwrap();

    let err = pipeline
        .export(&mut m, &audio, &mut target, |_| {})
        .unwrap_err();

    assert!(matches!(err, WavecastError::EncodeFailed(_)), "{err}");
    assert_eq!(pipeline.state(), ExportState::Failed);
    assert_eq!(pipeline.progress(), 0.0);
    assert_eq!(probe.snapshot().muxer_finalizes, 0);
    assert_eq!(probe.snapshot().encoder_closes, 1);
    assert!(m.is_running());
}

#[test]
fn unsupported_config_fails_initialization() {
    let audio = tone(0.5);
    let mut m = EffectManager::new(ManagerOpts {
        canvas: Canvas::new(7, 8),
        ..ManagerOpts::default()
    })
    .unwrap();
    let probe = CallProbe::new();
    let mut pipeline = ExportPipeline::new(ExportSettings::default()).unwrap();

    let err = pipeline
        .export(&mut m, &audio, &mut session(&probe), |_| {})
        .unwrap_err();
    assert!(matches!(err, WavecastError::InitFailed(_)), "{err}");
    assert_eq!(pipeline.state(), ExportState::Failed);
    assert_eq!(probe.snapshot().video_encodes, 0);
}

#[test]
fn empty_audio_is_rejected() {
    let audio = Arc::new(AudioSource::from_channels(vec![Vec::new()], RATE).unwrap());
    let mut m = manager();
    let probe = CallProbe::new();
    let mut pipeline = ExportPipeline::new(ExportSettings::default()).unwrap();

    let err = pipeline
        .export(&mut m, &audio, &mut session(&probe), |_| {})
        .unwrap_err();
    assert!(matches!(err, WavecastError::Validation(_)));
    assert_eq!(probe.snapshot().configures, 0);
}

#[test]
fn waveforms_return_to_their_configured_mode_after_export() {
    let audio = tone(0.5);
    let mut m = manager();
    m.add_effect_config(
        EffectConfig::from_json(json!({
            "type": "waveform",
            "id": "offline",
            "analysisMode": "offline",
            "segmentCount": 12
        }))
        .unwrap(),
    )
    .unwrap();
    m.set_audio(Arc::clone(&audio)).unwrap();
    m.wait_offline().unwrap();
    let before = m.effect("offline").and_then(|e| e.as_waveform()).unwrap();
    assert_eq!(before.analysis_phase(), AnalysisPhase::OfflineReady);

    let probe = CallProbe::new();
    let mut pipeline = ExportPipeline::new(ExportSettings {
        offline_segment_count: 8,
        export_quality_multiplier: 2,
        ..ExportSettings::default()
    })
    .unwrap();
    pipeline
        .export(&mut m, &audio, &mut session(&probe), |_| {})
        .unwrap();

    let live = m.effect("wave").and_then(|e| e.as_waveform()).unwrap();
    assert_eq!(live.analysis_phase(), AnalysisPhase::Live);
    let offline = m.effect("offline").and_then(|e| e.as_waveform()).unwrap();
    assert_eq!(offline.analysis_phase(), AnalysisPhase::OfflineReady);
    assert_eq!(offline.offline_summary().unwrap().len(), 12);
    assert!(m.audio().is_some_and(|a| Arc::ptr_eq(a, &audio)));
}

#[test]
fn exports_through_the_encode_worker() {
    let audio = tone(1.0);
    let mut m = manager();
    let probe = CallProbe::new();
    let mut handle = EncodeWorker::spawn(
        Box::new(InMemoryEncoder::with_probe(probe.clone())),
        Box::new(InMemoryMuxer::with_probe(probe.clone())),
        4,
    )
    .unwrap();
    let mut pipeline = ExportPipeline::new(ExportSettings::default()).unwrap();

    let ExportOutcome::Completed(file) = pipeline.export(&mut m, &audio, &mut handle, |_| {}).unwrap()
    else {
        panic!("export did not complete");
    };
    let parsed = parse_container(&file.bytes).unwrap();
    assert_eq!(parsed.video.len(), 30);
    assert_eq!(handle.progress(), (30, 30));
    assert!(!handle.is_open());
}
