//! Playlist persistence to a JSON file

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::{Playlist, PlaylistItem, MAX_ITEMS};
use crate::error::{AutomatorError, Result};

/// Loads and saves the whole playlist at once
#[async_trait]
pub trait PlaylistStore: Send + Sync {
    async fn load(&self) -> Result<Playlist>;
    async fn save(&self, playlist: &Playlist) -> Result<()>;
}

/// On-disk playlist document
#[derive(Debug, Serialize, Deserialize)]
struct PlaylistDocument {
    version: String,
    items: Vec<PlaylistItem>,
}

impl PlaylistDocument {
    const VERSION: &'static str = "1.0.0";
}

/// Playlist stored as pretty-printed JSON
#[derive(Debug, Clone)]
pub struct JsonPlaylistStore {
    path: PathBuf,
}

impl JsonPlaylistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, reason: impl ToString) -> AutomatorError {
        AutomatorError::PersistenceIo {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl PlaylistStore for JsonPlaylistStore {
    async fn load(&self) -> Result<Playlist> {
        let json = fs::read_to_string(&self.path)
            .await
            .map_err(|e| AutomatorError::persistence(&self.path, e))?;

        let doc: PlaylistDocument =
            serde_json::from_str(&json).map_err(|e| self.io_error(e))?;

        let count = doc.items.len();
        let playlist = Playlist::from_items(doc.items).ok_or_else(|| {
            AutomatorError::TooManyEntries {
                path: self.path.clone(),
                count,
                max: MAX_ITEMS,
            }
        })?;

        debug!(
            "Playlist loaded from {} ({} entries, version {})",
            self.path.display(),
            playlist.len(),
            doc.version
        );
        Ok(playlist)
    }

    async fn save(&self, playlist: &Playlist) -> Result<()> {
        let doc = PlaylistDocument {
            version: PlaylistDocument::VERSION.to_string(),
            items: playlist.items().to_vec(),
        };
        let json = serde_json::to_string_pretty(&doc).map_err(|e| self.io_error(e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AutomatorError::persistence(parent, e))?;
        }
        fs::write(&self.path, json)
            .await
            .map_err(|e| AutomatorError::persistence(&self.path, e))?;

        debug!("Playlist saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::InsertPosition;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonPlaylistStore::new(dir.path().join("playlist.json"));

        let mut list = Playlist::new();
        list.insert(
            InsertPosition::Append,
            PlaylistItem::new("Intro", "songs/intro.pdf").with_program("evince"),
            false,
        )
        .unwrap();
        list.insert(
            InsertPosition::Append,
            PlaylistItem::new("Outro", "songs/outro.pdf")
                .with_send_signature("channel 16: CONTROL CHANGE 1 value: 127"),
            false,
        )
        .unwrap();

        store.save(&list).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, list);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonPlaylistStore::new(dir.path().join("nope.json"));
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, AutomatorError::PersistenceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_garbage_is_io_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("playlist.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonPlaylistStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, AutomatorError::PersistenceIo { .. }));
    }

    #[tokio::test]
    async fn test_too_many_entries_not_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("playlist.json");
        let doc = PlaylistDocument {
            version: PlaylistDocument::VERSION.to_string(),
            items: vec![PlaylistItem::new("x", "x.pdf"); MAX_ITEMS + 1],
        };
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let err = JsonPlaylistStore::new(path).load().await.unwrap_err();
        assert!(matches!(
            err,
            AutomatorError::TooManyEntries { count: 129, max: 128, .. }
        ));
    }
}
