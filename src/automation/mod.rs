//! Automation trigger engine
//!
//! Definitions are loaded from the automations file into a
//! [`AutomationRegistry`], which runs one [`AutomationWorker`] per definition
//! and forwards MIDI and playlist-change arm events to them.

pub mod definition;
pub mod policy;
pub mod properties;
pub mod registry;
pub mod worker;

#[cfg(test)]
mod tests;

pub use definition::{
    ActionKind, AutomationDefinition, Match, Region, SearchArea, Trigger, TriggerKind,
};
pub use registry::{AutomationRegistry, WorkerSummary};
pub use worker::{AutomationContext, AutomationWorker, WorkerHandle, WorkerPhase, WorkerTiming};
