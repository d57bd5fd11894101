//! Offline export: virtual-time rendering into an encode target.

pub mod cancel;
pub mod pipeline;
pub mod settings;
pub mod timeline;
