//! Playlist (set list) of files to open
//!
//! Items are identified by position. A playlist holds at most
//! [`MAX_ITEMS`] entries and every send signature in it is unique.

pub mod service;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::error::{AutomatorError, Result};
use crate::signature;

pub use service::PlaylistService;
pub use store::{JsonPlaylistStore, PlaylistStore};

/// Maximum number of playlist items
pub const MAX_ITEMS: usize = 128;

/// One entry of the playlist
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct PlaylistItem {
    pub name: String,
    pub file_path: String,
    /// Program used to open the file, the OS default handler if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_path: Option<String>,
    /// Incoming signature that opens this item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_signature: Option<String>,
    /// Outgoing signature sent when this item is opened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_signature: Option<String>,
}

impl PlaylistItem {
    pub fn new(name: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program_path = Some(program.into());
        self
    }

    pub fn with_listen_signature(mut self, signature: impl Into<String>) -> Self {
        self.listen_signature = Some(signature.into());
        self
    }

    pub fn with_send_signature(mut self, signature: impl Into<String>) -> Self {
        self.send_signature = Some(signature.into());
        self
    }
}

/// Where [`Playlist::insert`] puts an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Append,
    At(usize),
}

/// Direction for [`Playlist::move_item`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Ordered list of items
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    items: Vec<PlaylistItem>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a playlist from loaded items, `None` if there are too many
    pub fn from_items(items: Vec<PlaylistItem>) -> Option<Self> {
        (items.len() <= MAX_ITEMS).then_some(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= MAX_ITEMS
    }

    pub fn get(&self, index: usize) -> Option<&PlaylistItem> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    /// Insert, append or overwrite an item
    ///
    /// Returns `Ok(false)` without touching the list when the name is empty.
    /// With `overwrite` and a position the item at that index is replaced,
    /// otherwise the item is inserted before the index (or appended).
    pub fn insert(
        &mut self,
        position: InsertPosition,
        item: PlaylistItem,
        overwrite: bool,
    ) -> Result<bool> {
        if item.name.is_empty() {
            return Ok(false);
        }

        let replaced = match position {
            InsertPosition::At(index) if overwrite => {
                if index >= self.items.len() {
                    return Err(AutomatorError::IndexOutOfRange {
                        index,
                        len: self.items.len(),
                    });
                }
                Some(index)
            }
            InsertPosition::At(index) => {
                if index > self.items.len() {
                    return Err(AutomatorError::IndexOutOfRange {
                        index,
                        len: self.items.len(),
                    });
                }
                None
            }
            InsertPosition::Append => None,
        };

        if replaced.is_none() && self.is_full() {
            return Err(AutomatorError::CapacityExceeded {
                name: item.name,
                max: MAX_ITEMS,
            });
        }

        if let Some(sig) = &item.send_signature {
            if let Some(index) = self.send_signature_owner(sig, replaced) {
                return Err(AutomatorError::DuplicateSendSignature {
                    signature: sig.clone(),
                    index,
                });
            }
        }

        match (position, replaced) {
            (_, Some(index)) => self.items[index] = item,
            (InsertPosition::At(index), None) => self.items.insert(index, item),
            (InsertPosition::Append, None) => self.items.push(item),
        }
        Ok(true)
    }

    /// Remove the item at `index`
    pub fn delete(&mut self, index: usize) -> Result<PlaylistItem> {
        if index >= self.items.len() {
            return Err(AutomatorError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        Ok(self.items.remove(index))
    }

    /// Swap the item at `index` with its neighbour
    ///
    /// Returns `false` (no-op) when the neighbour does not exist.
    pub fn move_item(&mut self, index: usize, direction: Direction) -> bool {
        let neighbour = match direction {
            Direction::Up => index.checked_sub(1),
            Direction::Down => index.checked_add(1),
        };
        match neighbour {
            Some(other) if index < self.items.len() && other < self.items.len() => {
                self.items.swap(index, other);
                true
            }
            _ => false,
        }
    }

    /// Index after `current`, wrapping to the first item
    ///
    /// An unset cursor moves to the first item. `None` on an empty list.
    pub fn cycle_next(&self, current: Option<usize>) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }
        match current {
            Some(i) if i + 1 < self.items.len() => Some(i + 1),
            _ => Some(0),
        }
    }

    /// Index before `current`, wrapping to the last item
    ///
    /// An unset cursor moves to the last item. `None` on an empty list.
    pub fn cycle_previous(&self, current: Option<usize>) -> Option<usize> {
        let last = self.items.len().checked_sub(1)?;
        match current {
            Some(i) if i > 0 => Some((i - 1).min(last)),
            _ => Some(last),
        }
    }

    /// All configured send signatures
    pub fn send_signatures(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter_map(|item| item.send_signature.as_deref())
    }

    /// A reserved signature no item sends yet
    pub fn unique_send_signature(&self) -> Option<String> {
        signature::find_unused_signature(self.send_signatures())
    }

    /// Index of the first item listening for `signature`
    pub fn find_by_listen_signature(&self, signature: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.listen_signature.as_deref() == Some(signature))
    }

    fn send_signature_owner(&self, signature: &str, except: Option<usize>) -> Option<usize> {
        self.items.iter().enumerate().find_map(|(i, item)| {
            (Some(i) != except && item.send_signature.as_deref() == Some(signature)).then_some(i)
        })
    }
}
