/// Wall-clock position for the preview loop.
pub mod clock;
/// Effect registry, composite order, and the shared surface.
pub mod effect_manager;
