//! Visual effects and their node chains.
//!
//! An effect owns one [`config::EffectConfig`] and one [`node::NodeChain`]. Chains run data,
//! style, blend and transform stages in that order; configuration updates rebuild the chain.

pub mod background;
pub mod config;
pub mod effect;
pub mod node;
pub mod text;
pub mod watermark;
pub mod waveform;

pub use config::EffectConfig;
pub use effect::{Effect, VisualEffect, create_effect, create_effect_from_json};
