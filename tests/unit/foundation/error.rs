use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        WavecastError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        WavecastError::unknown_effect_type("sparkles")
            .to_string()
            .contains("unknown effect type: sparkles")
    );
    assert!(
        WavecastError::init_failed("x")
            .to_string()
            .contains("encoder initialization failed:")
    );
    assert!(
        WavecastError::encode_failed("x")
            .to_string()
            .contains("encode failed:")
    );
    assert!(
        WavecastError::finalize_failed("x")
            .to_string()
            .contains("finalize failed:")
    );
    assert_eq!(WavecastError::Cancelled.to_string(), "export cancelled");
}

#[test]
fn only_cancelled_is_cancelled() {
    assert!(WavecastError::Cancelled.is_cancelled());
    assert!(!WavecastError::render("boom").is_cancelled());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = WavecastError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
