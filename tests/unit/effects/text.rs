use super::*;
use crate::foundation::core::Canvas;

const SYSTEM_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

fn system_font() -> Option<Vec<u8>> {
    std::fs::read(SYSTEM_FONT).ok()
}

fn config(text: &str) -> TextConfig {
    TextConfig {
        common: crate::effects::config::EffectCommon::new("title"),
        text: text.to_owned(),
        font_size: 24.0,
        position: RelPoint { x: 0.5, y: 0.25 },
        ..TextConfig::default()
    }
}

#[test]
fn without_font_nothing_is_drawn() {
    let mut effect = TextEffect::new(config("hello")).unwrap();
    assert!(effect.font_family().is_none());
    let mut s = Surface::new(Canvas::new(64, 32)).unwrap();
    effect
        .render(&AudioVisualParameters::silent(0.0), &mut s)
        .unwrap();
    assert!(s.data().iter().all(|b| *b == 0));
}

#[test]
fn missing_font_file_is_an_error() {
    let mut cfg = config("hello");
    cfg.font_path = Some(PathBuf::from("/definitely/not/here.ttf"));
    assert!(TextEffect::new(cfg).is_err());
}

#[test]
fn renders_glyphs_with_font_bytes() {
    let Some(font) = system_font() else {
        return;
    };
    let mut effect = TextEffect::with_font_bytes(config("Wave"), font).unwrap();
    assert!(effect.font_family().is_some());

    let mut s = Surface::new(Canvas::new(128, 64)).unwrap();
    effect
        .render(&AudioVisualParameters::silent(0.0), &mut s)
        .unwrap();
    assert!(s.data().chunks_exact(4).any(|px| px[3] > 0));
}

#[test]
fn alignment_moves_the_text_block() {
    let Some(font) = system_font() else {
        return;
    };
    let ink_columns = |align: TextAlign| {
        let mut cfg = config("Wave");
        cfg.align = align;
        let mut effect = TextEffect::with_font_bytes(cfg, font.clone()).unwrap();
        let mut s = Surface::new(Canvas::new(200, 64)).unwrap();
        effect
            .render(&AudioVisualParameters::silent(0.0), &mut s)
            .unwrap();
        let frame = s.snapshot();
        let mut cols: Vec<u32> = (0..frame.width)
            .filter(|x| (0..frame.height).any(|y| frame.pixel(*x, y).unwrap()[3] > 0))
            .collect();
        cols.sort_unstable();
        (cols[0], cols[cols.len() - 1])
    };

    let (left_min, _) = ink_columns(TextAlign::Left);
    let (_, right_max) = ink_columns(TextAlign::Right);
    assert!(left_min >= 100, "left aligned text starts at the anchor");
    assert!(right_max <= 100, "right aligned text ends at the anchor");
}

#[test]
fn font_path_is_loaded_and_updates_rebuild_layout() {
    if system_font().is_none() {
        return;
    }
    let mut cfg = config("A");
    cfg.font_path = Some(PathBuf::from(SYSTEM_FONT));
    let mut effect = TextEffect::new(cfg).unwrap();
    assert!(effect.font_family().is_some());

    effect
        .update_config(&serde_json::json!({"text": "", "fontSize": 32.0}))
        .unwrap();
    let mut s = Surface::new(Canvas::new(64, 32)).unwrap();
    effect
        .render(&AudioVisualParameters::silent(0.0), &mut s)
        .unwrap();
    assert!(s.data().iter().all(|b| *b == 0));

    assert!(
        effect
            .update_config(&serde_json::json!({"fontPath": "/definitely/not/here.ttf"}))
            .is_err()
    );
    let EffectConfig::Text(kept) = effect.config() else {
        panic!("expected text config");
    };
    assert_eq!(kept.font_path, Some(PathBuf::from(SYSTEM_FONT)));
}

#[test]
fn failed_rebuild_keeps_the_previous_font() {
    let Some(bytes) = system_font() else {
        return;
    };
    let copy = std::env::temp_dir().join(format!("wavecast_font_{}.ttf", std::process::id()));
    std::fs::write(&copy, bytes).unwrap();

    let mut cfg = config("A");
    cfg.font_path = Some(PathBuf::from(SYSTEM_FONT));
    let mut effect = TextEffect::new(cfg.clone()).unwrap();

    let mut broken = cfg.clone();
    broken.font_path = Some(copy.clone());
    broken.font_size = -1.0;
    assert!(effect.apply_config(broken).is_err());

    let loaded = effect.font.as_ref().and_then(|(p, _)| p.clone());
    assert_eq!(loaded, Some(PathBuf::from(SYSTEM_FONT)));
    assert_eq!(effect.config, cfg);
    assert!(!effect.is_disposed());

    let _ = std::fs::remove_file(&copy);
}
