//! Key/value properties file
//!
//! Arrays are stored one property group per attribute, keyed
//! `<kind>_<index>`. Absent optional values are written as [`VALUE_NULL`],
//! which is distinct from both an empty string and a missing key.
//!
//! On disk the map is a flat YAML mapping, read and written with
//! `serde_yaml` like `config.yaml`.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{AutomatorError, Result};

/// Sentinel for "no value"
pub const VALUE_NULL: &str = "null";

/// In-memory property map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMap {
    entries: BTreeMap<String, String>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML mapping of scalars
    ///
    /// Hand-edited numbers and booleans are kept as their text, YAML `~` and
    /// `null` become the sentinel. Nested values are skipped with a warning.
    pub fn from_yaml(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if text
            .lines()
            .all(|line| line.trim().is_empty() || line.trim_start().starts_with('#'))
        {
            return Ok(Self::new());
        }

        let raw: BTreeMap<String, Value> = serde_yaml::from_str(text)?;
        let entries = raw
            .into_iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Null => VALUE_NULL.to_string(),
                    other => {
                        warn!("Ignoring property {}: not a scalar ({:?})", key, other);
                        return None;
                    }
                };
                Some((key, text))
            })
            .collect();
        Ok(Self { entries })
    }

    /// Render as YAML under a title and timestamp comment
    pub fn to_yaml(&self, title: &str) -> std::result::Result<String, serde_yaml::Error> {
        let body = if self.entries.is_empty() {
            String::new()
        } else {
            serde_yaml::to_string(self)?
        };
        Ok(format!(
            "# {}\n# {}\n{}",
            title,
            Local::now().format("%a %b %d %H:%M:%S %Z %Y"),
            body
        ))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All `<kind>_<index>` entries, sorted by index
    ///
    /// Keys whose suffix is not an index are skipped.
    pub fn group(&self, kind: &str) -> Vec<(usize, &str)> {
        let prefix = format!("{}_", kind);
        let mut found: Vec<(usize, &str)> = self
            .entries
            .iter()
            .filter_map(|(key, value)| {
                let index = key.strip_prefix(&prefix)?.parse().ok()?;
                Some((index, value.as_str()))
            })
            .collect();
        found.sort_by_key(|(index, _)| *index);
        found
    }

    /// Value of one group slot, `None` for the sentinel or a missing key
    pub fn group_value(&self, kind: &str, index: usize) -> Option<&str> {
        self.get(&group_key(kind, index))
            .filter(|value| *value != VALUE_NULL)
    }

    /// Remove every entry of a group
    pub fn remove_group(&mut self, kind: &str) {
        let prefix = format!("{}_", kind);
        self.entries.retain(|key, _| {
            key.strip_prefix(&prefix)
                .map_or(true, |suffix| suffix.parse::<usize>().is_err())
        });
    }

    /// Replace a group with `values`, `None` and empty strings become the sentinel
    pub fn set_group<I, S>(&mut self, kind: &str, values: I)
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        self.remove_group(kind);
        for (index, value) in values.into_iter().enumerate() {
            let value = value
                .map(|v| -> String { v.into() })
                .filter(|v| !v.is_empty() && v != VALUE_NULL)
                .unwrap_or_else(|| VALUE_NULL.to_string());
            self.entries.insert(group_key(kind, index), value);
        }
    }
}

pub fn group_key(kind: &str, index: usize) -> String {
    format!("{}_{}", kind, index)
}

/// Properties file on disk, edits are serialized and written through
pub struct PropertiesFile {
    path: PathBuf,
    title: String,
    map: Mutex<PropertyMap>,
}

impl PropertiesFile {
    pub fn new(path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            map: Mutex::new(PropertyMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file, replacing the in-memory map
    ///
    /// A file that is not a YAML mapping is a `PersistenceIo` error and leaves
    /// the in-memory map untouched.
    pub async fn load(&self) -> Result<PropertyMap> {
        let mut map = self.map.lock().await;
        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|e| AutomatorError::persistence(&self.path, e))?;
        *map = PropertyMap::from_yaml(&text).map_err(|e| self.format_error(e))?;
        debug!(
            "Loaded {} properties from {}",
            map.len(),
            self.path.display()
        );
        Ok(map.clone())
    }

    /// Copy of the in-memory map
    pub async fn snapshot(&self) -> PropertyMap {
        self.map.lock().await.clone()
    }

    /// Apply `edit` and write the whole file while holding the lock
    pub async fn update(&self, edit: impl FnOnce(&mut PropertyMap)) -> Result<()> {
        let mut map = self.map.lock().await;
        let mut working = map.clone();
        edit(&mut working);

        let text = working
            .to_yaml(&self.title)
            .map_err(|e| self.format_error(e))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AutomatorError::persistence(parent, e))?;
        }
        fs::write(&self.path, text)
            .await
            .map_err(|e| AutomatorError::persistence(&self.path, e))?;

        *map = working;
        Ok(())
    }

    fn format_error(&self, err: serde_yaml::Error) -> AutomatorError {
        AutomatorError::PersistenceIo {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}
