#![forbid(unsafe_code)]

pub(crate) mod foundation;

pub mod assets;
pub mod audio;
pub mod effects;
pub mod encode;
pub mod export;
pub mod manager;
pub mod render;
pub mod settings;

pub use audio::params::AudioVisualParameters;
pub use audio::source::AudioSource;
pub use effects::{Effect, EffectConfig, VisualEffect};
pub use encode::session::{EncodeSession, EncodeTarget};
pub use export::cancel::CancelToken;
pub use export::pipeline::{ExportOutcome, ExportPipeline, ExportState, ExportedFile};
pub use export::settings::ExportSettings;
pub use foundation::color::ColorDef;
pub use foundation::core::{Affine, Canvas, Point, Rgba8Premul};
pub use foundation::error::{WavecastError, WavecastResult};
pub use manager::effect_manager::{EffectManager, ManagerOpts, RenderErrorPolicy};
pub use render::surface::FrameRGBA;
pub use settings::project::Project;
