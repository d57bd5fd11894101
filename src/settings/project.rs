use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::effects::config::EffectConfig;
use crate::effects::effect::VisualEffect;
use crate::export::settings::ExportSettings;
use crate::foundation::core::Canvas;
use crate::foundation::error::{WavecastError, WavecastResult};
use crate::manager::effect_manager::{EffectManager, ManagerOpts};
use crate::settings::store::SettingsStore;

pub const PROJECT_VERSION: u32 = 1;

/// Key under which the last-used project is stored.
pub const SESSION_KEY: &str = "session";

/// Persisted record: canvas, effect configurations in insertion order, and export settings.
///
/// Image payloads stay inline as base64 inside the effect configurations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub canvas: Canvas,
    #[serde(default)]
    pub effects: Vec<EffectConfig>,
    #[serde(default)]
    pub export: ExportSettings,
}

fn default_version() -> u32 {
    PROJECT_VERSION
}

impl Default for Project {
    fn default() -> Self {
        Self {
            version: PROJECT_VERSION,
            canvas: Canvas::default(),
            effects: Vec::new(),
            export: ExportSettings::default(),
        }
    }
}

impl Project {
    /// Parse and validate a project document.
    ///
    /// Effects go through [`EffectConfig::from_json`] so unknown types report
    /// `UnknownEffectType` rather than a generic schema error.
    pub fn from_json(value: Value) -> WavecastResult<Self> {
        let Value::Object(mut map) = value else {
            return Err(WavecastError::validation("project must be a JSON object"));
        };
        let effects = match map.remove("effects") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(EffectConfig::from_json)
                .collect::<WavecastResult<Vec<_>>>()?,
            Some(_) => return Err(WavecastError::validation("project.effects must be an array")),
        };
        let mut project: Project = serde_json::from_value(Value::Object(map))
            .map_err(|e| WavecastError::validation(format!("invalid project: {e}")))?;
        project.effects = effects;
        project.validate()?;
        Ok(project)
    }

    pub fn from_json_str(text: &str) -> WavecastResult<Self> {
        let value = serde_json::from_str(text)
            .map_err(|e| WavecastError::validation(format!("project is not valid JSON: {e}")))?;
        Self::from_json(value)
    }

    pub fn to_json(&self) -> WavecastResult<Value> {
        serde_json::to_value(self)
            .map_err(|e| WavecastError::settings(format!("failed to serialize project: {e}")))
    }

    pub fn validate(&self) -> WavecastResult<()> {
        if self.version == 0 || self.version > PROJECT_VERSION {
            return Err(WavecastError::validation(format!(
                "unsupported project version {} (expected <= {PROJECT_VERSION})",
                self.version
            )));
        }
        self.canvas.validate()?;
        self.export.validate()?;
        for effect in &self.effects {
            effect.validate()?;
        }
        Ok(())
    }

    pub fn load(path: &Path) -> WavecastResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read project: {}", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn save(&self, path: &Path) -> WavecastResult<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| WavecastError::settings(format!("failed to serialize project: {e}")))?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write project: {}", path.display()))?;
        Ok(())
    }

    /// Build an [`EffectManager`] holding every effect of the project.
    pub fn build_manager(&self) -> WavecastResult<EffectManager> {
        let mut manager = EffectManager::new(ManagerOpts {
            canvas: self.canvas,
            ..ManagerOpts::default()
        })?;
        for config in &self.effects {
            manager.add_effect_config(config.clone())?;
        }
        Ok(manager)
    }

    /// Snapshot of `manager`'s current effects (insertion order) and canvas.
    pub fn capture(manager: &EffectManager, export: ExportSettings) -> Self {
        let effects = manager
            .effect_ids()
            .iter()
            .filter_map(|id| manager.effect(id))
            .map(|e| e.config())
            .collect();
        Self {
            version: PROJECT_VERSION,
            canvas: manager.canvas(),
            effects,
            export,
        }
    }

    /// Last project written to `store` under [`SESSION_KEY`].
    pub fn restore(store: &dyn SettingsStore) -> WavecastResult<Option<Self>> {
        store.read(SESSION_KEY)?.map(Self::from_json).transpose()
    }

    pub fn persist(&self, store: &mut dyn SettingsStore) -> WavecastResult<()> {
        store.write(SESSION_KEY, &self.to_json()?)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/settings/project.rs"]
mod tests;
