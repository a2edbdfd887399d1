//! Status board: one current user-visible message per kind
//!
//! Errors recovered at the playlist, navigation and automation boundaries
//! are reported here instead of bubbling up. Reporting a new message of a
//! kind replaces the previous one of that kind; messages never stack.

use chrono::{DateTime, Local};
use dashmap::DashMap;
use std::fmt;
use tracing::{info, warn};

use crate::error::AutomatorError;

/// Slot a status message is shown in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusKind {
    ListFull,
    IndexOutOfRange,
    DuplicateSignature,
    PersistenceNotFound,
    PersistenceIo,
    TooManyEntries,
    FileOpenNotFound,
    FileOpenIo,
    InvalidSignature,
    Midi,
    Injection,
    /// Informational, last opened entry
    EntryOpened,
}

impl StatusKind {
    /// Kinds that describe a persistence file
    pub const PERSISTENCE: [StatusKind; 3] = [
        StatusKind::PersistenceNotFound,
        StatusKind::PersistenceIo,
        StatusKind::TooManyEntries,
    ];

    /// Kinds that describe opening an entry
    pub const FILE_OPEN: [StatusKind; 2] = [StatusKind::FileOpenNotFound, StatusKind::FileOpenIo];

    pub fn is_error(&self) -> bool {
        !matches!(self, StatusKind::EntryOpened)
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatusKind::ListFull => "list full",
            StatusKind::IndexOutOfRange => "index",
            StatusKind::DuplicateSignature => "signature",
            StatusKind::PersistenceNotFound => "file missing",
            StatusKind::PersistenceIo => "file error",
            StatusKind::TooManyEntries => "too many entries",
            StatusKind::FileOpenNotFound => "open missing",
            StatusKind::FileOpenIo => "open error",
            StatusKind::InvalidSignature => "bad signature",
            StatusKind::Midi => "midi",
            StatusKind::Injection => "injection",
            StatusKind::EntryOpened => "opened",
        };
        f.write_str(label)
    }
}

/// A message currently on the board
#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub at: DateTime<Local>,
}

/// Concurrent status board
#[derive(Debug, Default)]
pub struct StatusBoard {
    messages: DashMap<StatusKind, StatusMessage>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the message of a kind, replacing any previous one
    pub fn set(&self, kind: StatusKind, text: impl Into<String>) {
        let text = text.into();
        if kind.is_error() {
            warn!("[{}] {}", kind, text);
        } else {
            info!("[{}] {}", kind, text);
        }
        self.messages.insert(
            kind,
            StatusMessage {
                text,
                at: Local::now(),
            },
        );
    }

    /// Report a recovered error under its kind
    pub fn report(&self, err: &AutomatorError) {
        self.set(err.status_kind(), err.to_string());
    }

    pub fn clear(&self, kind: StatusKind) {
        self.messages.remove(&kind);
    }

    /// Clear every kind in `kinds`, used after a successful retry
    pub fn clear_all(&self, kinds: &[StatusKind]) {
        for kind in kinds {
            self.clear(*kind);
        }
    }

    pub fn get(&self, kind: StatusKind) -> Option<StatusMessage> {
        self.messages.get(&kind).map(|entry| entry.value().clone())
    }

    /// Snapshot of every current message, ordered by kind
    pub fn current(&self) -> Vec<(StatusKind, StatusMessage)> {
        let mut all: Vec<_> = self
            .messages
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        all.sort_by_key(|(kind, _)| *kind);
        all
    }
}
