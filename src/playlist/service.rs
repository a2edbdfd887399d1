//! Write-through playlist service
//!
//! All mutations are serialized behind one async lock. A mutation edits a
//! copy of the current playlist, saves it, then reloads it from the store;
//! readers only ever see published snapshots.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use super::{Direction, InsertPosition, Playlist, PlaylistItem, PlaylistStore};
use crate::error::{AutomatorError, Result};
use crate::status::{StatusBoard, StatusKind};

/// Kinds cleared after a mutation went through
const EDIT_KINDS: [StatusKind; 3] = [
    StatusKind::ListFull,
    StatusKind::IndexOutOfRange,
    StatusKind::DuplicateSignature,
];

pub struct PlaylistService {
    store: Arc<dyn PlaylistStore>,
    status: Arc<StatusBoard>,
    write_lock: Mutex<()>,
    snapshot: watch::Sender<Arc<Playlist>>,
}

impl PlaylistService {
    /// Create a service with an empty playlist, call [`reload`](Self::reload) to load
    pub fn new(store: Arc<dyn PlaylistStore>, status: Arc<StatusBoard>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Playlist::new()));
        Self {
            store,
            status,
            write_lock: Mutex::new(()),
            snapshot,
        }
    }

    /// Current playlist
    pub fn snapshot(&self) -> Arc<Playlist> {
        self.snapshot.borrow().clone()
    }

    /// Receive every published playlist
    pub fn subscribe(&self) -> watch::Receiver<Arc<Playlist>> {
        self.snapshot.subscribe()
    }

    /// Load the playlist from the store and publish it
    pub async fn reload(&self) -> Result<Arc<Playlist>> {
        let _guard = self.write_lock.lock().await;
        self.reload_locked().await
    }

    pub async fn insert(
        &self,
        position: InsertPosition,
        item: PlaylistItem,
        overwrite: bool,
    ) -> Result<bool> {
        let name = item.name.clone();
        let changed = self
            .mutate(|list| list.insert(position, item, overwrite), |changed| *changed)
            .await?;
        if changed {
            info!("Playlist entry \"{}\" stored", name);
        }
        Ok(changed)
    }

    pub async fn delete(&self, index: usize) -> Result<PlaylistItem> {
        let removed = self.mutate(|list| list.delete(index), |_| true).await?;
        info!("Playlist entry \"{}\" deleted", removed.name);
        Ok(removed)
    }

    /// Move an item, `Ok(false)` when the move was out of bounds
    pub async fn move_item(&self, index: usize, direction: Direction) -> Result<bool> {
        self.mutate(|list| Ok(list.move_item(index, direction)), |moved| *moved)
            .await
    }

    /// A reserved send signature no entry uses yet
    pub fn unique_send_signature(&self) -> Option<String> {
        self.snapshot().unique_send_signature()
    }

    /// Apply `edit` to a copy, then save and reload when `persist` says so
    async fn mutate<T>(
        &self,
        edit: impl FnOnce(&mut Playlist) -> Result<T>,
        persist: impl FnOnce(&T) -> bool,
    ) -> Result<T> {
        let _guard = self.write_lock.lock().await;

        let mut working = (*self.snapshot()).clone();
        let outcome = edit(&mut working).map_err(|e| self.reported(e))?;
        if !persist(&outcome) {
            return Ok(outcome);
        }

        self.store
            .save(&working)
            .await
            .map_err(|e| self.reported(e))?;

        // The file now holds the edit, publish it even if reading back fails
        if let Err(e) = self.reload_locked().await {
            self.snapshot.send_replace(Arc::new(working));
            return Err(e);
        }

        self.status.clear_all(&EDIT_KINDS);
        Ok(outcome)
    }

    async fn reload_locked(&self) -> Result<Arc<Playlist>> {
        let loaded = Arc::new(self.store.load().await.map_err(|e| self.reported(e))?);
        debug!("Playlist published ({} entries)", loaded.len());
        self.snapshot.send_replace(loaded.clone());
        self.status.clear_all(&StatusKind::PERSISTENCE);
        Ok(loaded)
    }

    fn reported(&self, err: AutomatorError) -> AutomatorError {
        self.status.report(&err);
        err
    }
}
