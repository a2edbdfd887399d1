//! In-memory collaborators for tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::automation::definition::{Match, Region};
use crate::desktop::{ClickKind, Desktop, Keyboard, ScreenMatcher, SearchRequest};
use crate::error::{AutomatorError, Result};
use crate::file_open::FileOpener;
use crate::navigation::ChangeListener;
use crate::playlist::{Playlist, PlaylistStore};
use crate::transport::{DeviceKey, MidiTransport};

pub fn found_at(x: i32, y: i32) -> Match {
    Match {
        region: Region::new(x, y, 20, 10),
        score: 0.95,
    }
}

/// Matcher answering from a script, then with a fixed fallback
#[derive(Default)]
pub struct ScriptedMatcher {
    script: Mutex<VecDeque<Option<Match>>>,
    fallback: Mutex<Option<Match>>,
    requests: Mutex<Vec<SearchRequest>>,
    delay: Mutex<Duration>,
}

impl ScriptedMatcher {
    /// Always finds `found`
    pub fn always(found: Option<Match>) -> Self {
        let matcher = Self::default();
        *matcher.fallback.lock() = found;
        matcher
    }

    pub fn scripted(results: Vec<Option<Match>>, fallback: Option<Match>) -> Self {
        let matcher = Self::always(fallback);
        *matcher.script.lock() = results.into();
        matcher
    }

    /// Each search takes `delay` before answering
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ScreenMatcher for ScriptedMatcher {
    async fn search(&self, request: &SearchRequest) -> Result<Option<Match>> {
        self.requests.lock().push(request.clone());
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().pop_front();
        Ok(scripted.unwrap_or_else(|| *self.fallback.lock()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesktopEvent {
    Focus(String),
    Click(ClickKind, (i32, i32)),
    Press(u32),
    Release(u32),
}

/// Desktop recording every injected event in order
#[derive(Default)]
pub struct RecordingDesktop {
    events: Arc<Mutex<Vec<DesktopEvent>>>,
    keyboard_unavailable: AtomicBool,
}

impl RecordingDesktop {
    pub fn events(&self) -> Vec<DesktopEvent> {
        self.events.lock().clone()
    }

    pub fn clicks(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, DesktopEvent::Click(..)))
            .count()
    }

    pub fn set_keyboard_unavailable(&self, unavailable: bool) {
        self.keyboard_unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl Desktop for RecordingDesktop {
    async fn focus_program(&self, program: &str) -> Result<()> {
        self.events
            .lock()
            .push(DesktopEvent::Focus(program.to_string()));
        Ok(())
    }

    fn click(&self, kind: ClickKind, at: (i32, i32)) -> Result<()> {
        self.events.lock().push(DesktopEvent::Click(kind, at));
        Ok(())
    }

    fn keyboard(&self) -> Result<Arc<dyn Keyboard>> {
        if self.keyboard_unavailable.load(Ordering::SeqCst) {
            return Err(AutomatorError::InjectionUnavailable("no robot".into()));
        }
        Ok(Arc::new(RecordingKeyboard {
            events: self.events.clone(),
        }))
    }
}

struct RecordingKeyboard {
    events: Arc<Mutex<Vec<DesktopEvent>>>,
}

impl Keyboard for RecordingKeyboard {
    fn press(&self, key_code: u32) -> Result<()> {
        self.events.lock().push(DesktopEvent::Press(key_code));
        Ok(())
    }

    fn release(&self, key_code: u32) -> Result<()> {
        self.events.lock().push(DesktopEvent::Release(key_code));
        Ok(())
    }
}

/// Transport recording every send
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(DeviceKey, String)>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<(DeviceKey, String)> {
        self.sent.lock().clone()
    }
}

impl MidiTransport for RecordingTransport {
    fn send(&self, device: &DeviceKey, signature: &str) -> Result<()> {
        self.sent
            .lock()
            .push((device.clone(), signature.to_string()));
        Ok(())
    }
}

/// Playlist store kept in memory
#[derive(Default)]
pub struct MemoryPlaylistStore {
    contents: Mutex<Option<Playlist>>,
    saves: AtomicUsize,
    loads: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryPlaylistStore {
    pub fn with_playlist(playlist: Playlist) -> Self {
        let store = Self::default();
        *store.contents.lock() = Some(playlist);
        store
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn contents(&self) -> Playlist {
        self.contents.lock().clone().unwrap_or_default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlaylistStore for MemoryPlaylistStore {
    async fn load(&self) -> Result<Playlist> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.contents
            .lock()
            .clone()
            .ok_or_else(|| AutomatorError::PersistenceNotFound {
                path: PathBuf::from("memory"),
            })
    }

    async fn save(&self, playlist: &Playlist) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AutomatorError::PersistenceIo {
                path: PathBuf::from("memory"),
                reason: "disk full".into(),
            });
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.contents.lock() = Some(playlist.clone());
        Ok(())
    }
}

/// Opener recording (path, program) pairs
#[derive(Default)]
pub struct RecordingOpener {
    opened: Mutex<Vec<(String, Option<String>)>>,
    not_found: AtomicBool,
}

impl RecordingOpener {
    pub fn opened(&self) -> Vec<(String, Option<String>)> {
        self.opened.lock().clone()
    }

    pub fn fail_with_not_found(&self, fail: bool) {
        self.not_found.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileOpener for RecordingOpener {
    async fn open(&self, path: &str, program: Option<&str>) -> Result<()> {
        if self.not_found.load(Ordering::SeqCst) {
            return Err(AutomatorError::FileOpenNotFound {
                path: PathBuf::from(path),
            });
        }
        self.opened
            .lock()
            .push((path.to_string(), program.map(str::to_string)));
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingListener {
    count: AtomicUsize,
}

impl CountingListener {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl ChangeListener for CountingListener {
    fn playlist_changed(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
