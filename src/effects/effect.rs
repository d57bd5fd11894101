use serde_json::Value;

use crate::audio::params::AudioVisualParameters;
use crate::effects::background::BackgroundEffect;
use crate::effects::config::{EffectCommon, EffectConfig};
use crate::effects::node::NodeChain;
use crate::effects::text::TextEffect;
use crate::effects::watermark::WatermarkEffect;
use crate::effects::waveform::WaveformEffect;
use crate::foundation::error::{WavecastError, WavecastResult};
use crate::render::surface::Surface;

/// Capabilities shared by every effect variant.
pub trait VisualEffect {
    /// Current configuration.
    fn config(&self) -> EffectConfig;

    /// Shared fields of the current configuration, without cloning it.
    fn common(&self) -> &EffectCommon;

    /// Draw onto `target` for `params.current_time`.
    ///
    /// Outside `[startTime, endTime)`, when hidden, or once disposed this draws nothing.
    fn render(&mut self, params: &AudioVisualParameters, target: &mut Surface) -> WavecastResult<()>;

    /// Merge `patch` into the configuration and rebuild the node chain.
    ///
    /// On error the previous configuration stays in effect.
    fn update_config(&mut self, patch: &Value) -> WavecastResult<()>;

    /// Release decoded images, fonts, analysis results and the node chain. Idempotent.
    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;
}

/// A configured visual layer.
#[derive(Debug)]
pub enum Effect {
    Background(BackgroundEffect),
    Waveform(WaveformEffect),
    Text(TextEffect),
    Watermark(WatermarkEffect),
}

/// Build the effect variant selected by the configuration's type tag.
pub fn create_effect(config: EffectConfig) -> WavecastResult<Effect> {
    config.validate()?;
    let effect = match config {
        EffectConfig::Background(c) => Effect::Background(BackgroundEffect::new(c)?),
        EffectConfig::Waveform(c) => Effect::Waveform(WaveformEffect::new(c)?),
        EffectConfig::Text(c) => Effect::Text(TextEffect::new(c)?),
        EffectConfig::Watermark(c) => Effect::Watermark(WatermarkEffect::new(c)?),
    };
    Ok(effect)
}

/// [`create_effect`] from untyped JSON; unrecognized tags fail with `UnknownEffectType`.
pub fn create_effect_from_json(value: Value) -> WavecastResult<Effect> {
    create_effect(EffectConfig::from_json(value)?)
}

impl Effect {
    fn inner(&self) -> &dyn VisualEffect {
        match self {
            Self::Background(e) => e,
            Self::Waveform(e) => e,
            Self::Text(e) => e,
            Self::Watermark(e) => e,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn VisualEffect {
        match self {
            Self::Background(e) => e,
            Self::Waveform(e) => e,
            Self::Text(e) => e,
            Self::Watermark(e) => e,
        }
    }

    pub fn id(&self) -> &str {
        &self.common().id
    }

    pub fn as_waveform(&self) -> Option<&WaveformEffect> {
        match self {
            Self::Waveform(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_waveform_mut(&mut self) -> Option<&mut WaveformEffect> {
        match self {
            Self::Waveform(w) => Some(w),
            _ => None,
        }
    }
}

impl VisualEffect for Effect {
    fn config(&self) -> EffectConfig {
        self.inner().config()
    }

    fn common(&self) -> &EffectCommon {
        self.inner().common()
    }

    fn render(&mut self, params: &AudioVisualParameters, target: &mut Surface) -> WavecastResult<()> {
        self.inner_mut().render(params, target)
    }

    fn update_config(&mut self, patch: &Value) -> WavecastResult<()> {
        self.inner_mut().update_config(patch)
    }

    fn dispose(&mut self) {
        self.inner_mut().dispose();
    }

    fn is_disposed(&self) -> bool {
        self.inner().is_disposed()
    }
}

/// Visibility gate followed by one walk of `chain`.
pub(crate) fn render_chain(
    common: &EffectCommon,
    chain: Option<&mut NodeChain>,
    params: &AudioVisualParameters,
    target: &mut Surface,
) -> WavecastResult<()> {
    let Some(chain) = chain else {
        return Ok(());
    };
    if !common.is_active_at(params.current_time) {
        return Ok(());
    }
    chain.process(params, target)
}

/// Merge `patch` into `current` and extract the variant payload with `pick`.
pub(crate) fn merge_variant<T>(
    current: &EffectConfig,
    patch: &Value,
    disposed: bool,
    pick: impl FnOnce(EffectConfig) -> Option<T>,
) -> WavecastResult<T> {
    if disposed {
        return Err(WavecastError::validation(format!(
            "effect '{}' is disposed",
            current.id()
        )));
    }
    let merged = current.merged(patch)?;
    pick(merged).ok_or_else(|| {
        WavecastError::validation(format!("effect '{}': type cannot change", current.id()))
    })
}

#[cfg(test)]
#[path = "../../tests/unit/effects/effect.rs"]
mod tests;
