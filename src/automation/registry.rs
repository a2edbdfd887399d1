//! Automation registry
//!
//! Owns the running worker generation. Loading a new set of definitions
//! stops the previous generation and waits for every task to exit before the
//! next one starts, so two generations never overlap.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::definition::AutomationDefinition;
use super::properties::{read_definitions, write_definitions};
use super::worker::{AutomationContext, AutomationWorker, WorkerHandle, WorkerPhase, WorkerTiming};
use crate::error::Result;
use crate::navigation::ChangeListener;
use crate::properties::PropertiesFile;
use crate::status::{StatusBoard, StatusKind};

/// Point-in-time view of one worker
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSummary {
    pub name: String,
    pub definition: String,
    pub phase: WorkerPhase,
    pub active: bool,
    pub paused: bool,
    pub fired: u64,
}

pub struct AutomationRegistry {
    ctx: RwLock<AutomationContext>,
    properties: Arc<PropertiesFile>,
    status: Arc<StatusBoard>,
    definitions: RwLock<Arc<Vec<AutomationDefinition>>>,
    workers: Mutex<Vec<WorkerHandle>>,
    /// Serializes load/stop so generations are swapped one at a time
    generation: tokio::sync::Mutex<u64>,
    paused: AtomicBool,
}

impl AutomationRegistry {
    pub fn new(
        ctx: AutomationContext,
        properties: Arc<PropertiesFile>,
        status: Arc<StatusBoard>,
    ) -> Self {
        Self {
            ctx: RwLock::new(ctx),
            properties,
            status,
            definitions: RwLock::new(Arc::new(Vec::new())),
            workers: Mutex::new(Vec::new()),
            generation: tokio::sync::Mutex::new(0),
            paused: AtomicBool::new(false),
        }
    }

    /// Timing for workers started by the next load
    pub fn set_timing(&self, timing: WorkerTiming) {
        self.ctx.write().timing = timing;
    }

    /// Current definitions
    pub fn definitions(&self) -> Arc<Vec<AutomationDefinition>> {
        self.definitions.read().clone()
    }

    /// Workers of the running generation
    pub fn workers(&self) -> Vec<Arc<AutomationWorker>> {
        self.workers
            .lock()
            .iter()
            .map(|handle| handle.worker().clone())
            .collect()
    }

    pub fn summaries(&self) -> Vec<WorkerSummary> {
        self.workers
            .lock()
            .iter()
            .map(|handle| {
                let worker = handle.worker();
                WorkerSummary {
                    name: worker.name().to_string(),
                    definition: worker.definition().to_string(),
                    phase: worker.phase(),
                    active: worker.is_active(),
                    paused: worker.is_paused(),
                    fired: worker.fired_count(),
                }
            })
            .collect()
    }

    /// Input devices named by MIDI triggers
    pub fn trigger_devices(&self) -> BTreeSet<String> {
        self.definitions
            .read()
            .iter()
            .filter(|def| def.trigger.midi)
            .filter_map(|def| def.trigger.midi_device.clone())
            .collect()
    }

    /// Replace the running generation with one worker per definition
    pub async fn load(&self, definitions: Vec<AutomationDefinition>) {
        let mut generation = self.generation.lock().await;
        self.shutdown_workers().await;

        *generation += 1;
        let definitions = Arc::new(definitions);
        *self.definitions.write() = definitions.clone();

        let ctx = self.ctx.read().clone();
        let paused = self.paused.load(Ordering::SeqCst);
        let handles: Vec<WorkerHandle> = definitions
            .iter()
            .enumerate()
            .map(|(index, def)| {
                let worker = Arc::new(AutomationWorker::new(
                    format!("automation {}", index),
                    def.clone(),
                    ctx.clone(),
                ));
                worker.set_paused(paused);
                worker.spawn()
            })
            .collect();

        info!(
            "🤖 Automation generation {} started with {} worker(s)",
            *generation,
            handles.len()
        );
        *self.workers.lock() = handles;
    }

    /// Read the automations file and load its definitions
    ///
    /// When the file is missing, unreadable or corrupt the running generation
    /// is stopped and no workers run, so a failed reload never leaves stale
    /// automations behind.
    pub async fn load_from_properties(&self) -> Result<usize> {
        let map = match self.properties.load().await {
            Ok(map) => map,
            Err(e) => {
                self.status.report(&e);
                self.load(Vec::new()).await;
                return Err(e);
            }
        };
        self.status.clear_all(&StatusKind::PERSISTENCE);
        let definitions = read_definitions(&map);
        let count = definitions.len();
        self.load(definitions).await;
        Ok(count)
    }

    /// Replace and persist the definitions, running workers are left alone
    pub async fn save(&self, definitions: Vec<AutomationDefinition>) -> Result<()> {
        let definitions = Arc::new(definitions);
        *self.definitions.write() = definitions.clone();

        self.properties
            .update(|map| write_definitions(map, &definitions))
            .await
            .map_err(|e| {
                self.status.report(&e);
                e
            })?;
        self.status.clear_all(&StatusKind::PERSISTENCE);
        info!(
            "Saved {} automation(s) to {}",
            definitions.len(),
            self.properties.path().display()
        );
        Ok(())
    }

    /// Arm every MIDI-triggered worker whose signature matches
    pub fn broadcast_midi_signature(&self, signature: &str) -> usize {
        let armed = self
            .workers
            .lock()
            .iter()
            .filter(|handle| handle.worker().arm_midi(signature))
            .count();
        debug!("MIDI \"{}\" armed {} worker(s)", signature, armed);
        armed
    }

    /// Arm every once-per-change worker
    pub fn broadcast_playlist_changed(&self) -> usize {
        let armed = self
            .workers
            .lock()
            .iter()
            .filter(|handle| handle.worker().arm_change())
            .count();
        debug!("Playlist change armed {} worker(s)", armed);
        armed
    }

    /// Pause or resume every worker, later generations start in the same state
    ///
    /// Arming is left alone: resuming never arms a worker that was not armed.
    pub fn set_all_active(&self, active: bool) {
        self.paused.store(!active, Ordering::SeqCst);
        for handle in self.workers.lock().iter() {
            handle.worker().set_paused(!active);
        }
        info!(
            "Automations {}",
            if active { "resumed" } else { "paused" }
        );
    }

    /// Stop and discard every worker, a no-op when none run
    pub async fn stop_all(&self) {
        let _generation = self.generation.lock().await;
        self.shutdown_workers().await;
    }

    async fn shutdown_workers(&self) {
        let previous = std::mem::take(&mut *self.workers.lock());
        if previous.is_empty() {
            return;
        }
        // Signal all first so they wind down together
        for handle in &previous {
            handle.worker().stop();
        }
        let count = previous.len();
        for handle in previous {
            handle.shutdown().await;
        }
        debug!("Stopped {} worker(s)", count);
    }
}

impl ChangeListener for AutomationRegistry {
    fn playlist_changed(&self) {
        self.broadcast_playlist_changed();
    }
}
