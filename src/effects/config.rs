use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::foundation::color::ColorDef;
use crate::foundation::error::{WavecastError, WavecastResult};
use crate::render::composite::BlendMode;

/// Type tags accepted by [`EffectConfig::from_json`].
pub const EFFECT_TYPES: [&str; 4] = ["background", "waveform", "text", "watermark"];

/// Fields shared by every effect configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectCommon {
    pub id: String,
    pub start_time: f64,
    /// `None` keeps the effect visible until the end of the track.
    pub end_time: Option<f64>,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub z_index: i32,
    pub visible: bool,
}

impl Default for EffectCommon {
    fn default() -> Self {
        Self {
            id: String::new(),
            start_time: 0.0,
            end_time: None,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            z_index: 0,
            visible: true,
        }
    }
}

impl EffectCommon {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Visibility gate: `visible` and `start_time <= t < end_time`.
    pub fn is_active_at(&self, time_secs: f64) -> bool {
        if !self.visible || !time_secs.is_finite() || time_secs < self.start_time {
            return false;
        }
        match self.end_time {
            Some(end) => time_secs < end,
            None => true,
        }
    }

    pub fn validate(&self) -> WavecastResult<()> {
        if self.id.trim().is_empty() {
            return Err(WavecastError::validation("effect id must be non-empty"));
        }
        if !self.start_time.is_finite() || self.start_time < 0.0 {
            return Err(WavecastError::validation(format!(
                "effect '{}': startTime must be finite and >= 0",
                self.id
            )));
        }
        if let Some(end) = self.end_time
            && (!end.is_finite() || end < self.start_time)
        {
            return Err(WavecastError::validation(format!(
                "effect '{}': startTime must be <= endTime",
                self.id
            )));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(WavecastError::validation(format!(
                "effect '{}': opacity must be in [0, 1]",
                self.id
            )));
        }
        Ok(())
    }
}

/// Point expressed as fractions of the canvas size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelPoint {
    pub x: f64,
    pub y: f64,
}

/// Size expressed as fractions of the canvas size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gradient {
    pub from: ColorDef,
    pub to: ColorDef,
    #[serde(default)]
    pub angle_deg: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageFit {
    #[default]
    Cover,
    Contain,
    Stretch,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackgroundConfig {
    #[serde(flatten)]
    pub common: EffectCommon,
    pub color: ColorDef,
    pub gradient: Option<Gradient>,
    /// Base64 image data, optionally a `data:` URI.
    pub image_data: Option<String>,
    pub image_fit: ImageFit,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            common: EffectCommon::default(),
            color: ColorDef::rgb8(0, 0, 0),
            gradient: None,
            image_data: None,
            image_fit: ImageFit::Cover,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaveformStyle {
    #[default]
    Bars,
    Mirror,
    Line,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisMode {
    #[default]
    Realtime,
    Offline,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaveformConfig {
    #[serde(flatten)]
    pub common: EffectCommon,
    pub style: WaveformStyle,
    pub color: ColorDef,
    pub amplification: f32,
    /// `0` disables smoothing; values approach `1` for heavier smoothing.
    pub smoothing: f32,
    pub bar_count: u32,
    /// Gap between bars in pixels.
    pub bar_gap: f32,
    /// Stroke width in pixels for the `line` style.
    pub line_width: f32,
    /// Top-left corner of the waveform box.
    pub position: RelPoint,
    pub size: RelSize,
    pub analysis_mode: AnalysisMode,
    pub segment_count: u32,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            common: EffectCommon::default(),
            style: WaveformStyle::Bars,
            color: ColorDef::rgb8(255, 255, 255),
            amplification: 1.0,
            smoothing: 0.5,
            bar_count: 64,
            bar_gap: 2.0,
            line_width: 2.0,
            position: RelPoint { x: 0.0, y: 0.25 },
            size: RelSize {
                width: 1.0,
                height: 0.5,
            },
            analysis_mode: AnalysisMode::Realtime,
            segment_count: 1024,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

impl TextAlign {
    /// Fraction of the text width that sits left of the anchor.
    pub fn anchor_factor(self) -> f32 {
        match self {
            Self::Left => 0.0,
            Self::Center => 0.5,
            Self::Right => 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextConfig {
    #[serde(flatten)]
    pub common: EffectCommon,
    pub text: String,
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    pub color: ColorDef,
    /// Anchor point; `align` decides which side of the text sits on it.
    pub position: RelPoint,
    pub align: TextAlign,
    /// Wrap width in pixels.
    pub max_width: Option<f32>,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            common: EffectCommon::default(),
            text: String::new(),
            font_path: None,
            font_size: 48.0,
            color: ColorDef::rgb8(255, 255, 255),
            position: RelPoint { x: 0.5, y: 0.1 },
            align: TextAlign::Center,
            max_width: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
    /// Top-left corner as fractions of the canvas.
    Custom { x: f64, y: f64 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatermarkConfig {
    #[serde(flatten)]
    pub common: EffectCommon,
    pub image_data: Option<String>,
    pub position: WatermarkPosition,
    /// Multiplier on the image's natural size.
    pub scale: f64,
    pub rotation_deg: f64,
    /// Distance from the canvas edge in pixels for the corner positions.
    pub margin: f64,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            common: EffectCommon::default(),
            image_data: None,
            position: WatermarkPosition::BottomRight,
            scale: 1.0,
            rotation_deg: 0.0,
            margin: 16.0,
        }
    }
}

/// Configuration of one effect, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EffectConfig {
    Background(BackgroundConfig),
    Waveform(WaveformConfig),
    Text(TextConfig),
    Watermark(WatermarkConfig),
}

impl EffectConfig {
    /// Parse and validate a JSON configuration.
    ///
    /// The `type` tag is checked before the rest of the schema so unrecognized tags surface as
    /// [`WavecastError::UnknownEffectType`].
    pub fn from_json(value: Value) -> WavecastResult<Self> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| WavecastError::validation("effect config is missing a string 'type'"))?;
        if !EFFECT_TYPES.contains(&tag) {
            return Err(WavecastError::unknown_effect_type(tag));
        }
        let config: Self = serde_json::from_value(value)
            .map_err(|e| WavecastError::validation(format!("invalid effect config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> WavecastResult<Value> {
        serde_json::to_value(self)
            .map_err(|e| WavecastError::validation(format!("serialize effect config: {e}")))
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Background(_) => "background",
            Self::Waveform(_) => "waveform",
            Self::Text(_) => "text",
            Self::Watermark(_) => "watermark",
        }
    }

    pub fn common(&self) -> &EffectCommon {
        match self {
            Self::Background(c) => &c.common,
            Self::Waveform(c) => &c.common,
            Self::Text(c) => &c.common,
            Self::Watermark(c) => &c.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut EffectCommon {
        match self {
            Self::Background(c) => &mut c.common,
            Self::Waveform(c) => &mut c.common,
            Self::Text(c) => &mut c.common,
            Self::Watermark(c) => &mut c.common,
        }
    }

    pub fn id(&self) -> &str {
        &self.common().id
    }

    pub fn validate(&self) -> WavecastResult<()> {
        let common = self.common();
        common.validate()?;
        let id = common.id.as_str();
        match self {
            Self::Background(c) => {
                if let Some(g) = &c.gradient
                    && !g.angle_deg.is_finite()
                {
                    return Err(invalid(id, "gradient angleDeg must be finite"));
                }
            }
            Self::Waveform(c) => {
                if c.bar_count == 0 {
                    return Err(invalid(id, "barCount must be >= 1"));
                }
                if c.segment_count == 0 {
                    return Err(invalid(id, "segmentCount must be >= 1"));
                }
                if !c.amplification.is_finite() || c.amplification < 0.0 {
                    return Err(invalid(id, "amplification must be finite and >= 0"));
                }
                if !(0.0..1.0).contains(&c.smoothing) {
                    return Err(invalid(id, "smoothing must be in [0, 1)"));
                }
                if !c.bar_gap.is_finite() || c.bar_gap < 0.0 {
                    return Err(invalid(id, "barGap must be finite and >= 0"));
                }
                if !c.line_width.is_finite() || c.line_width <= 0.0 {
                    return Err(invalid(id, "lineWidth must be finite and > 0"));
                }
                if !(c.size.width.is_finite() && c.size.height.is_finite())
                    || c.size.width < 0.0
                    || c.size.height < 0.0
                {
                    return Err(invalid(id, "size must be finite and >= 0"));
                }
            }
            Self::Text(c) => {
                if !c.font_size.is_finite() || c.font_size <= 0.0 {
                    return Err(invalid(id, "fontSize must be finite and > 0"));
                }
                if let Some(w) = c.max_width
                    && (!w.is_finite() || w <= 0.0)
                {
                    return Err(invalid(id, "maxWidth must be finite and > 0"));
                }
            }
            Self::Watermark(c) => {
                if !c.scale.is_finite() || c.scale <= 0.0 {
                    return Err(invalid(id, "scale must be finite and > 0"));
                }
                if !c.rotation_deg.is_finite() || !c.margin.is_finite() {
                    return Err(invalid(id, "rotationDeg and margin must be finite"));
                }
            }
        }
        Ok(())
    }

    /// Apply a JSON merge patch and return the validated result.
    ///
    /// Objects merge recursively and `null` resets a field to its default, clearing optional
    /// fields. `id` and `type` cannot be changed or cleared.
    pub fn merged(&self, patch: &Value) -> WavecastResult<Self> {
        let Value::Object(fields) = patch else {
            return Err(WavecastError::validation(
                "effect config update must be a JSON object",
            ));
        };
        if let Some(key) = ["id", "type"]
            .into_iter()
            .find(|k| fields.get(*k).is_some_and(Value::is_null))
        {
            return Err(WavecastError::validation(format!(
                "effect '{}': {key} cannot be cleared",
                self.id()
            )));
        }
        if let Some(tag) = fields.get("type").and_then(Value::as_str)
            && tag != self.type_tag()
        {
            return Err(WavecastError::validation(format!(
                "effect '{}': type cannot change from '{}' to '{tag}'",
                self.id(),
                self.type_tag()
            )));
        }
        if let Some(id) = fields.get("id").and_then(Value::as_str)
            && id != self.id()
        {
            return Err(WavecastError::validation(format!(
                "effect '{}': id is immutable",
                self.id()
            )));
        }

        let mut base = self.to_json()?;
        merge_patch(&mut base, patch);
        Self::from_json(base)
    }
}

fn invalid(id: &str, msg: &str) -> WavecastError {
    WavecastError::validation(format!("effect '{id}': {msg}"))
}

fn merge_patch(target: &mut Value, patch: &Value) {
    let (Value::Object(target), Value::Object(patch)) = (target, patch) else {
        return;
    };
    for (key, value) in patch {
        if value.is_null() {
            target.remove(key);
            continue;
        }
        match target.get_mut(key) {
            Some(existing) if existing.is_object() && value.is_object() => {
                merge_patch(existing, value);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/config.rs"]
mod tests;
