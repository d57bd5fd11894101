use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;

use crate::foundation::error::{WavecastError, WavecastResult};

/// Keyed persistence for session records.
///
/// A store must be opened before use; `close` is idempotent and a closed store can be reopened.
pub trait SettingsStore {
    fn open(&mut self) -> WavecastResult<()>;
    /// Record stored under `key`, or `None` when nothing was written yet.
    fn read(&self, key: &str) -> WavecastResult<Option<Value>>;
    fn write(&mut self, key: &str, value: &Value) -> WavecastResult<()>;
    fn close(&mut self);
}

fn check_key(key: &str) -> WavecastResult<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(WavecastError::settings(format!(
            "invalid settings key {key:?} (use ASCII letters, digits, '-' or '_')"
        )));
    }
    Ok(())
}

fn not_open(key: &str) -> WavecastError {
    WavecastError::settings(format!("settings store is not open (key {key:?})"))
}

/// One pretty-printed `<key>.json` file per record inside a directory.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    open: bool,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            open: false,
        }
    }

    /// Store under the platform config directory (`~/.config/wavecast` on Linux).
    pub fn in_config_dir() -> WavecastResult<Self> {
        let dir = Self::default_dir()
            .ok_or_else(|| WavecastError::settings("failed to determine config directory"))?;
        Ok(Self::new(dir))
    }

    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("wavecast"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SettingsStore for JsonFileStore {
    fn open(&mut self) -> WavecastResult<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("failed to create settings directory: {}", self.dir.display())
        })?;
        self.open = true;
        tracing::debug!(dir = %self.dir.display(), "settings store opened");
        Ok(())
    }

    fn read(&self, key: &str) -> WavecastResult<Option<Value>> {
        if !self.open {
            return Err(not_open(key));
        }
        check_key(key)?;
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read settings record: {}", path.display()))?;
        let value = serde_json::from_str(&text).map_err(|e| {
            WavecastError::settings(format!("corrupt settings record {}: {e}", path.display()))
        })?;
        Ok(Some(value))
    }

    fn write(&mut self, key: &str, value: &Value) -> WavecastResult<()> {
        if !self.open {
            return Err(not_open(key));
        }
        check_key(key)?;
        let path = self.entry_path(key);
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| WavecastError::settings(format!("failed to serialize {key:?}: {e}")))?;
        // Replaced atomically via rename.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text)
            .with_context(|| format!("failed to write settings record: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace settings record: {}", path.display()))?;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Store kept in memory; records survive `close`/`open` for the store's lifetime.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, Value>,
    open: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SettingsStore for MemoryStore {
    fn open(&mut self) -> WavecastResult<()> {
        self.open = true;
        Ok(())
    }

    fn read(&self, key: &str) -> WavecastResult<Option<Value>> {
        if !self.open {
            return Err(not_open(key));
        }
        check_key(key)?;
        Ok(self.records.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &Value) -> WavecastResult<()> {
        if !self.open {
            return Err(not_open(key));
        }
        check_key(key)?;
        self.records.insert(key.to_owned(), value.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/settings/store.rs"]
mod tests;
