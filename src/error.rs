//! Error taxonomy for playlist, persistence, navigation and automation
//!
//! Every error is recovered at the service boundary and surfaced on the
//! [`StatusBoard`](crate::status::StatusBoard) under its [`StatusKind`].
//! None of them terminate the process.

use std::path::PathBuf;
use thiserror::Error;

use crate::status::StatusKind;

/// Domain errors raised by the automator core
#[derive(Debug, Error)]
pub enum AutomatorError {
    /// The playlist already holds the maximum number of items
    #[error("The list is full, \"{name}\" could not be added (max {max} entries)")]
    CapacityExceeded { name: String, max: usize },

    /// An index does not address an existing item
    #[error("Index {index} is out of range (list has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Another item already sends this signature
    #[error("Send signature \"{signature}\" is already used by entry {index}")]
    DuplicateSendSignature { signature: String, index: usize },

    /// A persisted file (playlist or properties) does not exist
    #[error("The file \"{}\" could not be found", path.display())]
    PersistenceNotFound { path: PathBuf },

    /// A persisted file could not be read, parsed or written
    #[error("The file \"{}\" could not be read or written: {reason}", path.display())]
    PersistenceIo { path: PathBuf, reason: String },

    /// A persisted playlist holds more entries than allowed
    #[error("The file \"{}\" has {count} entries, only {max} are allowed", path.display())]
    TooManyEntries {
        path: PathBuf,
        count: usize,
        max: usize,
    },

    /// The file of a playlist item does not exist
    #[error("The file \"{}\" could not be found", path.display())]
    FileOpenNotFound { path: PathBuf },

    /// The file of a playlist item could not be opened
    #[error("The file \"{}\" could not be opened: {reason}", path.display())]
    FileOpenIo { path: PathBuf, reason: String },

    /// A signature string does not describe a channel message
    #[error("Invalid MIDI signature \"{0}\"")]
    InvalidSignature(String),

    /// The MIDI transport failed to deliver a message
    #[error("MIDI transport error: {0}")]
    Midi(String),

    /// Keystroke or focus injection is not available on this system
    #[error("Input injection unavailable: {0}")]
    InjectionUnavailable(String),
}

impl AutomatorError {
    /// Status board slot this error is reported under
    pub fn status_kind(&self) -> StatusKind {
        match self {
            AutomatorError::CapacityExceeded { .. } => StatusKind::ListFull,
            AutomatorError::IndexOutOfRange { .. } => StatusKind::IndexOutOfRange,
            AutomatorError::DuplicateSendSignature { .. } => StatusKind::DuplicateSignature,
            AutomatorError::PersistenceNotFound { .. } => StatusKind::PersistenceNotFound,
            AutomatorError::PersistenceIo { .. } => StatusKind::PersistenceIo,
            AutomatorError::TooManyEntries { .. } => StatusKind::TooManyEntries,
            AutomatorError::FileOpenNotFound { .. } => StatusKind::FileOpenNotFound,
            AutomatorError::FileOpenIo { .. } => StatusKind::FileOpenIo,
            AutomatorError::InvalidSignature(_) => StatusKind::InvalidSignature,
            AutomatorError::Midi(_) => StatusKind::Midi,
            AutomatorError::InjectionUnavailable(_) => StatusKind::Injection,
        }
    }

    /// Map an I/O error on a persisted file to the persistence taxonomy
    pub fn persistence(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            AutomatorError::PersistenceNotFound { path }
        } else {
            AutomatorError::PersistenceIo {
                path,
                reason: err.to_string(),
            }
        }
    }
}

/// Result alias for automator operations
pub type Result<T, E = AutomatorError> = std::result::Result<T, E>;
