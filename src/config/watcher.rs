//! Hot reload of `config.yaml`
//!
//! The parent directory is watched rather than the file itself: editors that
//! save by writing a temp file and renaming it over the config would
//! otherwise detach a single-file watch after the first save.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Quiet period after the last file event before the config is re-read
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Delivers a freshly validated [`AppConfig`] after each change on disk
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load the config file and start watching it
    ///
    /// Fails when the initial config cannot be read or is invalid. Later
    /// invalid edits are logged and skipped, the previous config stays live.
    pub async fn new(config_path: PathBuf) -> Result<(Self, Arc<AppConfig>)> {
        let initial = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        let (tx, rx) = mpsc::channel(10);
        let reloader = Reloader {
            path: config_path.clone(),
            tx,
            generation: Arc::new(AtomicU64::new(0)),
            runtime: tokio::runtime::Handle::current(),
        };

        // notify calls back on its own thread, outside the runtime
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if reloader.concerns(&event) => reloader.schedule(),
            Ok(_) => {}
            Err(e) => error!("Config watch error: {}", e),
        })?;

        let dir = watch_dir(&config_path);
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", dir.display()))?;

        info!("Config file watcher started for: {}", config_path.display());
        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            Arc::new(initial),
        ))
    }

    /// Next successfully reloaded config, `None` once the watcher is gone
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

/// Debounced reload state shared with the notify callback
struct Reloader {
    path: PathBuf,
    tx: mpsc::Sender<AppConfig>,
    /// Bumped per event; only the latest scheduled reload runs
    generation: Arc<AtomicU64>,
    runtime: tokio::runtime::Handle,
}

impl Reloader {
    fn concerns(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == self.path.file_name())
    }

    fn schedule(&self) {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        let path = self.path.clone();
        let tx = self.tx.clone();

        self.runtime.spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            if generation.load(Ordering::SeqCst) != ticket {
                debug!("Config reload superseded by a newer change");
                return;
            }
            match AppConfig::load(&path).await {
                Ok(config) => {
                    info!("Configuration reloaded from {}", path.display());
                    if tx.send(config).await.is_err() {
                        debug!("Config receiver dropped");
                    }
                }
                Err(e) => warn!("Failed to reload config (keeping old config): {:#}", e),
            }
        });
    }
}

fn watch_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
