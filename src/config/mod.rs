//! Configuration management for MIDI Automator
//!
//! Handles loading, parsing, and hot-reloading of the YAML configuration file.

pub mod watcher;

use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::automation::WorkerTiming;
use crate::navigation::NavigationSettings;
use crate::signature;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub switch: SwitchConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
}

/// MIDI port name patterns (case-insensitive substrings)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MidiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_command_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_out: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_notifier_out: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_item_out: Option<String>,
}

/// Switch command and notifier signatures
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SwitchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_signature: Option<String>,
    #[serde(default = "default_notifier_signature")]
    pub notifier_signature: Option<String>,
}

/// Data files, relative paths resolve against the config directory
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilesConfig {
    #[serde(default = "default_playlist_file")]
    pub playlist: PathBuf,
    #[serde(default = "default_automations_file")]
    pub automations: PathBuf,
}

/// Automation worker timing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AutomationConfig {
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,
    #[serde(default = "default_search_timeout")]
    pub search_timeout_ms: u64,
    #[serde(default = "default_focus_settle")]
    pub focus_settle_ms: u64,
}

/// Playlist navigation timing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NavigationConfig {
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            prev_signature: None,
            next_signature: None,
            notifier_signature: default_notifier_signature(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            playlist: default_playlist_file(),
            automations: default_automations_file(),
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval(),
            search_timeout_ms: default_search_timeout(),
            focus_settle_ms: default_focus_settle(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        let signatures = [
            ("prev_signature", &self.switch.prev_signature),
            ("next_signature", &self.switch.next_signature),
            ("notifier_signature", &self.switch.notifier_signature),
        ];
        for (field, value) in signatures {
            if let Some(sig) = value {
                signature::decode(sig)
                    .with_context(|| format!("Invalid switch {}", field))?;
            }
        }

        if let (Some(prev), Some(next)) = (&self.switch.prev_signature, &self.switch.next_signature) {
            if signature::canonicalize(prev)? == signature::canonicalize(next)? {
                anyhow::bail!("Switch prev_signature and next_signature must differ");
            }
        }

        if self.automation.scan_interval_ms == 0 {
            anyhow::bail!("automation.scan_interval_ms must be greater than 0");
        }

        if self.files.playlist.as_os_str().is_empty() || self.files.automations.as_os_str().is_empty() {
            anyhow::bail!("files.playlist and files.automations cannot be empty");
        }

        Ok(())
    }

    /// Data file paths resolved against `base_dir`
    pub fn resolve_files(&self, base_dir: &Path) -> (PathBuf, PathBuf) {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base_dir.join(p)
            }
        };
        (resolve(&self.files.playlist), resolve(&self.files.automations))
    }

    pub fn worker_timing(&self) -> WorkerTiming {
        WorkerTiming {
            scan_interval: Duration::from_millis(self.automation.scan_interval_ms),
            search_timeout: Duration::from_millis(self.automation.search_timeout_ms),
            focus_settle: Duration::from_millis(self.automation.focus_settle_ms),
        }
    }

    pub fn navigation_settings(&self) -> NavigationSettings {
        NavigationSettings {
            settle_delay: Duration::from_millis(self.navigation.settle_delay_ms),
            notifier_signature: self
                .switch
                .notifier_signature
                .as_deref()
                .and_then(|sig| signature::canonicalize(sig).ok()),
        }
    }
}

// Default value functions
fn default_notifier_signature() -> Option<String> {
    Some(signature::reserved_signature(0))
}
fn default_playlist_file() -> PathBuf { PathBuf::from("playlist.json") }
fn default_automations_file() -> PathBuf { PathBuf::from("automations.yaml") }
fn default_scan_interval() -> u64 { 100 }
fn default_search_timeout() -> u64 { 10_000 }
fn default_focus_settle() -> u64 { 500 }
fn default_settle_delay() -> u64 { 100 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        config.validate().unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(
            config.switch.notifier_signature.as_deref(),
            Some("channel 16: CONTROL CHANGE 0 value: 127")
        );
        assert_eq!(config.worker_timing(), WorkerTiming::default());
        assert_eq!(config.navigation_settings().settle_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
midi:
  switch_command_in: "loopMIDI Port"
  remote_out: "Network Session"
switch:
  prev_signature: "channel 1: NOTE ON 46 value: 127"
  next_signature: "channel 1: NOTE ON 47 value: 127"
  notifier_signature: null
files:
  playlist: "/shows/tour.json"
automation:
  scan_interval_ms: 50
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.midi.switch_command_in.as_deref(), Some("loopMIDI Port"));
        assert_eq!(config.midi.remote_in, None);
        assert_eq!(config.switch.notifier_signature, None);
        assert_eq!(config.automation.scan_interval_ms, 50);
        assert_eq!(config.automation.search_timeout_ms, 10_000);

        let (playlist, automations) = config.resolve_files(Path::new("/cfg"));
        assert_eq!(playlist, PathBuf::from("/shows/tour.json"));
        assert_eq!(automations, PathBuf::from("/cfg/automations.yaml"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.switch.next_signature = Some("channel 99: NOTE ON 1 value: 1".into());
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.automation.scan_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.switch.prev_signature = Some("channel 1: NOTE ON 46 value: 127".into());
        config.switch.next_signature = Some("channel 1:  NOTE ON 46  value: 127".into());
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = AppConfig::default();
        config.midi.switch_item_out = Some("IAC".into());
        config.save(&path).await.unwrap();
        assert_eq!(AppConfig::load(&path).await.unwrap(), config);
    }
}
