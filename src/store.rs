//! Key/value settings store
//!
//! The add-on reads its user settings through [`SettingsStore`] using
//! get-with-default patterns: every getter returns `None` when the key is
//! absent or its text does not parse as the requested type.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::SettingsResult;
use crate::settings_xml::{save_setting, SettingsDocument};

/// A typed setting value as delivered by a change notification
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    String(String),
    Int(i32),
    Bool(bool),
}

impl SettingValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            SettingValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        SettingValue::String(s.to_string())
    }
}

impl From<i32> for SettingValue {
    fn from(i: i32) -> Self {
        SettingValue::Int(i)
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        SettingValue::Bool(b)
    }
}

/// Host-provided settings store
pub trait SettingsStore {
    fn get_string(&self, key: &str) -> Option<String>;

    /// Write a string setting; failures are the store's own business
    fn set_string(&mut self, key: &str, value: &str);

    fn get_int(&self, key: &str) -> Option<i32> {
        self.get_string(key)?.trim().parse().ok()
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        parse_bool(&self.get_string(key)?)
    }
}

/// Parse the host's boolean spellings
pub fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") || s == "1" {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") || s == "0" {
        Some(false)
    } else {
        None
    }
}

/// Store kept entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

impl SettingsStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set_string(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

/// Store backed by the add-on's `settings.xml`
///
/// Values are read once at load time. Writes update the cached value and
/// are persisted immediately with [`save_setting`].
#[derive(Debug, Clone)]
pub struct XmlSettingsStore {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl XmlSettingsStore {
    pub fn load(path: &Path) -> SettingsResult<Self> {
        let doc = SettingsDocument::load(path)?;
        let values = doc
            .entries
            .iter()
            .filter_map(|e| Some((e.id()?.to_string(), e.value.clone()?)))
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    /// Load, or start empty when the document cannot be read
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(store) => store,
            Err(e) => {
                log::error!("Error loading settings.xml {}: {}", path.display(), e);
                Self {
                    path: path.to_path_buf(),
                    values: HashMap::new(),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for XmlSettingsStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set_string(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
        if let Err(e) = save_setting(&self.path, key, value) {
            log::warn!("Could not persist setting '{}': {}", key, e);
        }
    }
}
