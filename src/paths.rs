//! Application path management for portable and installed modes.
//!
//! - **Portable mode**: a `.portable` marker file next to the executable
//!   keeps the config, playlist, automations and logs in that directory.
//! - **Installed mode** (default): data lives in the platform data dir,
//!   e.g. `%APPDATA%\Midi Automator` or `~/.local/share/Midi Automator`.
//!
//! The playlist and automations files sit next to `config.yaml` unless the
//! config names absolute paths for them.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::AppConfig;

/// Application name used for directories in installed mode
const APP_NAME: &str = "Midi Automator";

/// Application paths for config and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    /// Whether running in portable mode (config next to exe)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// In debug builds a `config.yaml` in the current directory wins, which
    /// is what `cargo run` from the project root picks up.
    ///
    /// Note: This is called before logging is initialized, so we use eprintln
    /// for early diagnostic output.
    pub fn detect() -> Self {
        let exe_dir = exe_dir();

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            let cwd_config = cwd.join("config.yaml");
            if cwd_config.exists() {
                eprintln!(
                    "[paths] Running in DEV mode (config.yaml found in cwd: {})",
                    cwd.display()
                );
                return Self::portable_in(&cwd);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self::portable_in(&exe_dir);
        }

        let app_data = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!(
                    "[paths] WARNING: dirs::data_dir() returned None, falling back to exe dir"
                );
                exe_dir.clone()
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!(
            "[paths] Running in INSTALLED mode (data dir: {})",
            app_data.display()
        );

        Self {
            config: app_data.join("config.yaml"),
            logs_dir: app_data.join("logs"),
            is_portable: false,
        }
    }

    /// Paths for an explicitly given config file
    pub fn with_config(config: PathBuf) -> Self {
        let base = config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            logs_dir: base.join("logs"),
            config,
            is_portable: true,
        }
    }

    fn portable_in(dir: &Path) -> Self {
        Self {
            config: dir.join("config.yaml"),
            logs_dir: dir.join("logs"),
            is_portable: true,
        }
    }

    /// Directory holding the config file, data paths resolve against it
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure the directories exist and write a default config if there is none
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        if !self.logs_dir.exists() {
            debug!("Creating logs directory: {}", self.logs_dir.display());
            std::fs::create_dir_all(&self.logs_dir)?;
        }

        let base = self.base_dir();
        if !base.exists() {
            debug!("Creating config directory: {}", base.display());
            std::fs::create_dir_all(&base)?;
        }

        if !self.config.exists() {
            self.write_default_config()?;
        }

        Ok(())
    }

    /// Copy `config.example.yaml` from next to the executable, else write defaults
    fn write_default_config(&self) -> anyhow::Result<()> {
        let example = exe_dir().join("config.example.yaml");
        if example.exists() {
            info!("Copying example config to {}", self.config.display());
            std::fs::copy(&example, &self.config).with_context(|| {
                format!(
                    "Failed to copy example config from {} to {}",
                    example.display(),
                    self.config.display()
                )
            })?;
            return Ok(());
        }

        info!("Writing default config to {}", self.config.display());
        let yaml = serde_yaml::to_string(&AppConfig::default())
            .context("Failed to serialize default config")?;
        std::fs::write(&self.config, yaml)
            .with_context(|| format!("Failed to write {}", self.config.display()))?;
        Ok(())
    }
}

fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_with_config_uses_its_directory() {
        let paths = AppPaths::with_config(PathBuf::from("show/config.yaml"));
        assert_eq!(paths.base_dir(), PathBuf::from("show"));
        assert_eq!(paths.logs_dir, PathBuf::from("show/logs"));

        let bare = AppPaths::with_config(PathBuf::from("config.yaml"));
        assert_eq!(bare.base_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_ensure_directories_writes_loadable_default() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::with_config(dir.path().join("nested").join("config.yaml"));
        paths.ensure_directories().unwrap();

        assert!(paths.logs_dir.is_dir());
        let text = std::fs::read_to_string(&paths.config).unwrap();
        let config: AppConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
