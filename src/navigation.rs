//! Navigation controller
//!
//! Owns the playlist cursor. Opening an entry sets the cursor, tells peers
//! and listeners about the change, waits the settle delay, sends the entry's
//! own signature and finally opens the file. The cursor lock is held for the
//! whole sequence so switch commands and remote opens never interleave.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AutomatorError, Result};
use crate::file_open::FileOpener;
use crate::playlist::PlaylistService;
use crate::signature;
use crate::status::{StatusBoard, StatusKind};
use crate::transport::{DeviceKey, MidiTransport};

/// Receives "current entry changed" events
pub trait ChangeListener: Send + Sync {
    fn playlist_changed(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationSettings {
    /// Wait between the change notifications and the item signature
    pub settle_delay: Duration,
    /// Sent on the notifier device before every open
    pub notifier_signature: Option<String>,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            notifier_signature: None,
        }
    }
}

pub struct NavigationController {
    playlist: Arc<PlaylistService>,
    listener: Arc<dyn ChangeListener>,
    transport: Arc<dyn MidiTransport>,
    opener: Arc<dyn FileOpener>,
    status: Arc<StatusBoard>,
    settings: RwLock<NavigationSettings>,
    /// `None` is the unset position
    cursor: Mutex<Option<usize>>,
}

impl NavigationController {
    pub fn new(
        playlist: Arc<PlaylistService>,
        listener: Arc<dyn ChangeListener>,
        transport: Arc<dyn MidiTransport>,
        opener: Arc<dyn FileOpener>,
        status: Arc<StatusBoard>,
        settings: NavigationSettings,
    ) -> Self {
        Self {
            playlist,
            listener,
            transport,
            opener,
            status,
            settings: RwLock::new(settings),
            cursor: Mutex::new(None),
        }
    }

    pub fn update_settings(&self, settings: NavigationSettings) {
        *self.settings.write() = settings;
    }

    /// Current position, `None` when unset
    pub async fn current(&self) -> Option<usize> {
        *self.cursor.lock().await
    }

    /// Forget the current position
    pub async fn reset(&self) {
        *self.cursor.lock().await = None;
        debug!("Playlist position reset");
    }

    /// Open the entry at `index`
    ///
    /// A no-op on an empty playlist. File-open failures are reported and
    /// returned, the cursor keeps the new position.
    pub async fn open_by_index(&self, index: usize, broadcast: bool) -> Result<()> {
        let mut cursor = self.cursor.lock().await;
        self.open_locked(&mut cursor, index, broadcast).await
    }

    /// Open the entry after the current one, wrapping around
    pub async fn next(&self) -> Result<()> {
        let mut cursor = self.cursor.lock().await;
        match self.playlist.snapshot().cycle_next(*cursor) {
            Some(index) => self.open_locked(&mut cursor, index, true).await,
            None => Ok(()),
        }
    }

    /// Open the entry before the current one, wrapping around
    pub async fn previous(&self) -> Result<()> {
        let mut cursor = self.cursor.lock().await;
        match self.playlist.snapshot().cycle_previous(*cursor) {
            Some(index) => self.open_locked(&mut cursor, index, true).await,
            None => Ok(()),
        }
    }

    async fn open_locked(
        &self,
        cursor: &mut Option<usize>,
        index: usize,
        broadcast: bool,
    ) -> Result<()> {
        let playlist = self.playlist.snapshot();
        if playlist.is_empty() {
            debug!("Playlist empty, open {} ignored", index);
            return Ok(());
        }
        let Some(item) = playlist.get(index).cloned() else {
            let err = AutomatorError::IndexOutOfRange {
                index,
                len: playlist.len(),
            };
            self.status.report(&err);
            return Err(err);
        };

        *cursor = Some(index);
        let settings = self.settings.read().clone();
        info!("▶️  [{}] {}", index, item.name);

        if let Some(notifier) = &settings.notifier_signature {
            self.send(&DeviceKey::SwitchNotifierOut, notifier);
        }
        self.listener.playlist_changed();

        if broadcast {
            match signature::remote_open_message(index) {
                Some(msg) => self.send(&DeviceKey::RemoteOut, &signature::encode(&msg)),
                None => debug!("Index {} cannot be sent as remote open", index),
            }
        }

        tokio::time::sleep(settings.settle_delay).await;

        if let Some(sig) = &item.send_signature {
            self.send(&DeviceKey::SwitchItemOut, sig);
        }

        match self
            .opener
            .open(&item.file_path, item.program_path.as_deref())
            .await
        {
            Ok(()) => {
                self.status.clear_all(&StatusKind::FILE_OPEN);
                self.status
                    .set(StatusKind::EntryOpened, format!("[{}] {}", index, item.name));
                Ok(())
            }
            Err(e) => {
                self.status.report(&e);
                Err(e)
            }
        }
    }

    /// Send and report failures, MIDI errors never abort navigation
    fn send(&self, device: &DeviceKey, signature: &str) {
        if let Err(e) = self.transport.send(device, signature) {
            self.status.report(&e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::{InsertPosition, PlaylistItem};
    use crate::testing::{CountingListener, MemoryPlaylistStore, RecordingOpener, RecordingTransport};

    struct Fixture {
        nav: NavigationController,
        playlist: Arc<PlaylistService>,
        listener: Arc<CountingListener>,
        transport: Arc<RecordingTransport>,
        opener: Arc<RecordingOpener>,
        status: Arc<StatusBoard>,
    }

    async fn fixture(items: &[(&str, &str)]) -> Fixture {
        let status = Arc::new(StatusBoard::new());
        let playlist = Arc::new(PlaylistService::new(
            Arc::new(MemoryPlaylistStore::default()),
            status.clone(),
        ));
        for (name, sig) in items {
            playlist
                .insert(
                    InsertPosition::Append,
                    PlaylistItem::new(*name, format!("{}.pdf", name)).with_send_signature(*sig),
                    false,
                )
                .await
                .unwrap();
        }
        let listener = Arc::new(CountingListener::default());
        let transport = Arc::new(RecordingTransport::default());
        let opener = Arc::new(RecordingOpener::default());
        let nav = NavigationController::new(
            playlist.clone(),
            listener.clone(),
            transport.clone(),
            opener.clone(),
            status.clone(),
            NavigationSettings {
                settle_delay: Duration::from_millis(1),
                notifier_signature: Some("channel 16: CONTROL CHANGE 0 value: 127".into()),
            },
        );
        Fixture {
            nav,
            playlist,
            listener,
            transport,
            opener,
            status,
        }
    }

    #[tokio::test]
    async fn test_next_wraps_around() {
        let f = fixture(&[("A", "s1"), ("B", "s2")]).await;

        f.nav.open_by_index(0, true).await.unwrap();
        f.nav.next().await.unwrap();
        assert_eq!(f.nav.current().await, Some(1));
        assert_eq!(f.opener.opened().last().unwrap().0, "B.pdf");

        f.nav.next().await.unwrap();
        assert_eq!(f.nav.current().await, Some(0));
        assert_eq!(f.opener.opened().last().unwrap().0, "A.pdf");
        assert_eq!(f.listener.count(), 3);
    }

    #[tokio::test]
    async fn test_previous_from_unset_opens_last() {
        let f = fixture(&[("A", "s1"), ("B", "s2"), ("C", "s3")]).await;
        f.nav.previous().await.unwrap();
        assert_eq!(f.nav.current().await, Some(2));
        f.nav.previous().await.unwrap();
        assert_eq!(f.nav.current().await, Some(1));
    }

    #[tokio::test]
    async fn test_send_order() {
        let f = fixture(&[("A", "channel 16: CONTROL CHANGE 1 value: 127")]).await;
        f.nav.open_by_index(0, true).await.unwrap();

        assert_eq!(
            f.transport.sent(),
            vec![
                (
                    DeviceKey::SwitchNotifierOut,
                    "channel 16: CONTROL CHANGE 0 value: 127".to_string()
                ),
                (
                    DeviceKey::RemoteOut,
                    "channel 1: CONTROL CHANGE 102 value: 0".to_string()
                ),
                (
                    DeviceKey::SwitchItemOut,
                    "channel 16: CONTROL CHANGE 1 value: 127".to_string()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_remote_open_does_not_rebroadcast() {
        let f = fixture(&[("A", "s1"), ("B", "s2")]).await;
        f.nav.open_by_index(1, false).await.unwrap();
        assert!(f
            .transport
            .sent()
            .iter()
            .all(|(device, _)| *device != DeviceKey::RemoteOut));
    }

    #[tokio::test]
    async fn test_empty_playlist_is_noop() {
        let f = fixture(&[]).await;
        f.nav.next().await.unwrap();
        f.nav.previous().await.unwrap();
        f.nav.open_by_index(3, true).await.unwrap();
        assert_eq!(f.nav.current().await, None);
        assert!(f.transport.sent().is_empty());
        assert_eq!(f.listener.count(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_keeps_position() {
        let f = fixture(&[("A", "s1"), ("B", "s2")]).await;
        f.opener.fail_with_not_found(true);

        let err = f.nav.open_by_index(1, true).await.unwrap_err();
        assert!(matches!(err, AutomatorError::FileOpenNotFound { .. }));
        assert_eq!(f.nav.current().await, Some(1));
        assert!(f.status.get(StatusKind::FileOpenNotFound).is_some());

        f.opener.fail_with_not_found(false);
        f.nav.next().await.unwrap();
        assert!(f.status.get(StatusKind::FileOpenNotFound).is_none());
        assert!(f.status.get(StatusKind::EntryOpened).is_some());
    }

    #[tokio::test]
    async fn test_out_of_range_keeps_cursor() {
        let f = fixture(&[("A", "s1")]).await;
        f.nav.open_by_index(0, false).await.unwrap();
        let err = f.nav.open_by_index(4, false).await.unwrap_err();
        assert!(matches!(err, AutomatorError::IndexOutOfRange { index: 4, len: 1 }));
        assert_eq!(f.nav.current().await, Some(0));
    }

    #[tokio::test]
    async fn test_reset_and_concurrent_next() {
        let f = fixture(&[("A", "s1"), ("B", "s2"), ("C", "s3")]).await;
        let nav = Arc::new(f.nav);
        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let nav = nav.clone();
                tokio::spawn(async move { nav.next().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        // Six serialized steps from unset land back on the last entry
        assert_eq!(nav.current().await, Some(2));
        assert_eq!(f.opener.opened().len(), 6);

        nav.reset().await;
        assert_eq!(nav.current().await, None);
        assert_eq!(f.playlist.snapshot().len(), 3);
    }
}
