//! Opening playlist files
//!
//! Files open with their item's program when one is set, otherwise with the
//! desktop's default handler. The opener does not wait for the launched
//! program to exit.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{AutomatorError, Result};

/// File-open collaborator
#[async_trait]
pub trait FileOpener: Send + Sync {
    async fn open(&self, path: &str, program: Option<&str>) -> Result<()>;
}

/// Opener that launches OS processes
pub struct SystemFileOpener {
    /// Relative playlist paths are resolved against this directory
    base_dir: PathBuf,
}

impl SystemFileOpener {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn command(file: &Path, program: Option<&str>) -> Command {
        match program {
            #[cfg(target_os = "macos")]
            Some(program) => {
                let mut cmd = Command::new("open");
                cmd.arg("-a").arg(program).arg(file);
                cmd
            }
            #[cfg(not(target_os = "macos"))]
            Some(program) => {
                let mut cmd = Command::new(program);
                cmd.arg(file);
                cmd
            }
            None => Self::default_handler(file),
        }
    }

    fn default_handler(file: &Path) -> Command {
        #[cfg(target_os = "macos")]
        {
            let mut cmd = Command::new("open");
            cmd.arg(file);
            cmd
        }
        #[cfg(target_os = "windows")]
        {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg("start").arg("").arg(file);
            cmd
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(file);
            cmd
        }
    }
}

#[async_trait]
impl FileOpener for SystemFileOpener {
    async fn open(&self, path: &str, program: Option<&str>) -> Result<()> {
        let file = self.resolve(path);
        match tokio::fs::metadata(&file).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AutomatorError::FileOpenNotFound { path: file });
            }
            Err(e) => {
                return Err(AutomatorError::FileOpenIo {
                    path: file,
                    reason: e.to_string(),
                });
            }
        }

        let program = program.filter(|p| !p.trim().is_empty());
        let mut child = Self::command(&file, program)
            .spawn()
            .map_err(|e| AutomatorError::FileOpenIo {
                path: file.clone(),
                reason: e.to_string(),
            })?;

        info!(
            "📂 Opening {}{}",
            file.display(),
            program.map(|p| format!(" with {}", p)).unwrap_or_default()
        );

        // Reap the launcher so it does not linger as a zombie
        let shown = file.display().to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!("Launcher for {} exited", shown),
                Ok(status) => warn!("Launcher for {} exited with {}", shown, status),
                Err(e) => warn!("Launcher for {} failed: {}", shown, e),
            }
        });
        Ok(())
    }
}
