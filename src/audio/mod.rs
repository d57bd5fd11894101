/// Whole-track and rolling-window analysis.
pub mod analysis;
/// Per-frame analysis snapshot consumed by effects.
pub mod params;
/// Decoded audio input.
pub mod source;
/// Threaded offline analysis.
pub mod worker;
