//! MIDI Automator
//!
//! Binds MIDI messages and on-screen images to GUI automations, and drives a
//! set list of documents from MIDI switch commands.

pub mod automation;
pub mod cli;
pub mod config;
pub mod desktop;
pub mod dispatch;
pub mod error;
pub mod file_open;
pub mod midi;
pub mod navigation;
pub mod paths;
pub mod playlist;
pub mod properties;
pub mod signature;
pub mod sniffer;
pub mod status;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
