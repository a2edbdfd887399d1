//! Inbound MIDI routing
//!
//! Raw messages are turned into signatures once, then routed by the device
//! they arrived on: trigger inputs arm automations, the switch input drives
//! prev/next and item listen signatures, the remote input follows a master.
//!
//! [`DispatchQueue`] feeds the dispatcher from the inbound channel. Messages
//! that navigate are handled one at a time in arrival order.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::automation::AutomationRegistry;
use crate::midi::{format_hex, MidiMessage};
use crate::navigation::NavigationController;
use crate::playlist::PlaylistService;
use crate::signature;
use crate::transport::{DeviceKey, InboundMidi};

/// Canonical prev/next switch signatures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchSignatures {
    pub prev: Option<String>,
    pub next: Option<String>,
}

impl SwitchSignatures {
    /// Canonicalize configured signatures, unparsable ones are dropped
    pub fn new(prev: Option<&str>, next: Option<&str>) -> Self {
        let canonical = |sig: Option<&str>| sig.and_then(|s| signature::canonicalize(s).ok());
        Self {
            prev: canonical(prev),
            next: canonical(next),
        }
    }
}

/// What an inbound message led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Number of automations armed
    Armed(usize),
    Previous,
    Next,
    /// Entry opened through a listen signature or a remote open
    Opened(usize),
    Ignored,
}

pub struct MidiDispatcher {
    registry: Arc<AutomationRegistry>,
    navigation: Arc<NavigationController>,
    playlist: Arc<PlaylistService>,
    switch: RwLock<SwitchSignatures>,
}

impl MidiDispatcher {
    pub fn new(
        registry: Arc<AutomationRegistry>,
        navigation: Arc<NavigationController>,
        playlist: Arc<PlaylistService>,
        switch: SwitchSignatures,
    ) -> Self {
        Self {
            registry,
            navigation,
            playlist,
            switch: RwLock::new(switch),
        }
    }

    pub fn update_switch(&self, switch: SwitchSignatures) {
        *self.switch.write() = switch;
    }

    /// Route one inbound message
    ///
    /// Navigation failures are already on the status board, so they only
    /// show up here as a debug line.
    pub async fn dispatch(&self, inbound: InboundMidi) -> Routed {
        let Some(message) = MidiMessage::parse(&inbound.raw) else {
            debug!("{}: ignoring {}", inbound.device, format_hex(&inbound.raw));
            return Routed::Ignored;
        };
        let sig = signature::encode(&message);
        debug!("{}: {}", inbound.device, sig);

        match &inbound.device {
            DeviceKey::AutomationTriggerIn(_) => {
                Routed::Armed(self.registry.broadcast_midi_signature(&sig))
            }
            DeviceKey::SwitchCommandIn => self.switch_command(&sig).await,
            DeviceKey::RemoteIn => match signature::remote_open_index(&message) {
                Some(index) => {
                    self.log_failure(self.navigation.open_by_index(index, false).await);
                    Routed::Opened(index)
                }
                None => Routed::Ignored,
            },
            DeviceKey::RemoteOut | DeviceKey::SwitchNotifierOut | DeviceKey::SwitchItemOut => {
                Routed::Ignored
            }
        }
    }

    async fn switch_command(&self, sig: &str) -> Routed {
        let switch = self.switch.read().clone();
        if switch.prev.as_deref() == Some(sig) {
            self.log_failure(self.navigation.previous().await);
            return Routed::Previous;
        }
        if switch.next.as_deref() == Some(sig) {
            self.log_failure(self.navigation.next().await);
            return Routed::Next;
        }
        match self.playlist.snapshot().find_by_listen_signature(sig) {
            Some(index) => {
                self.log_failure(self.navigation.open_by_index(index, true).await);
                Routed::Opened(index)
            }
            None => Routed::Ignored,
        }
    }

    fn log_failure(&self, result: crate::error::Result<()>) {
        if let Err(e) = result {
            debug!("Navigation from MIDI failed: {}", e);
        }
    }
}

/// Pending navigation messages before new ones are dropped
const NAVIGATION_QUEUE: usize = 256;

/// Ordered front of a [`MidiDispatcher`]
///
/// Navigation-bound messages go through one task, so a settle delay delays
/// the messages behind it instead of letting them overtake. Trigger inputs
/// only arm workers and are routed inline.
pub struct DispatchQueue {
    dispatcher: Arc<MidiDispatcher>,
    navigation_tx: mpsc::Sender<InboundMidi>,
}

impl DispatchQueue {
    /// Start the navigation task, it ends once the queue is dropped
    pub fn start(dispatcher: Arc<MidiDispatcher>) -> (Self, JoinHandle<()>) {
        let (navigation_tx, mut navigation_rx) = mpsc::channel::<InboundMidi>(NAVIGATION_QUEUE);
        let sequential = dispatcher.clone();
        let handle = tokio::spawn(async move {
            while let Some(inbound) = navigation_rx.recv().await {
                let routed = sequential.dispatch(inbound).await;
                debug!("Routed: {:?}", routed);
            }
            debug!("Navigation queue closed");
        });
        (
            Self {
                dispatcher,
                navigation_tx,
            },
            handle,
        )
    }

    /// Route a trigger message now or queue a navigation message
    pub async fn submit(&self, inbound: InboundMidi) {
        if matches!(inbound.device, DeviceKey::AutomationTriggerIn(_)) {
            let routed = self.dispatcher.dispatch(inbound).await;
            debug!("Routed: {:?}", routed);
            return;
        }
        match self.navigation_tx.try_send(inbound) {
            Ok(()) => {}
            Err(TrySendError::Full(inbound)) => {
                warn!("Navigation queue full, dropping message from {}", inbound.device)
            }
            Err(TrySendError::Closed(_)) => warn!("Navigation queue closed, message dropped"),
        }
    }
}
