//! Automation worker
//!
//! One worker drives one definition: a scan task that searches the screen
//! every scan interval and acts on matches, plus a timeout task when the
//! definition has a timeout. The `active` (armed) flag, the `paused` flag,
//! search region and terminal phase are only changed under the worker's
//! state lock, so a stop or an arm event can never slip between the fire
//! decision and the action.
//!
//! Pausing is independent of arming: a paused worker keeps its armed state
//! and still accepts arm events, it just never scans or fires until resumed.
//!
//! ```text
//! Idle -> Scanning -> Acting -> Scanning
//!             |          |
//!             +----------+--> TimedOut | Stopped
//! ```

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::definition::{ActionKind, AutomationDefinition, Match, Region, SearchArea};
use super::policy;
use crate::desktop::{ClickKind, Desktop, ScreenMatcher, SearchRequest};

/// Lifecycle phase of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Scanning,
    Acting,
    TimedOut,
    Stopped,
}

impl WorkerPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerPhase::TimedOut | WorkerPhase::Stopped)
    }
}

/// Timing shared by all workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTiming {
    /// Pause between two scans
    pub scan_interval: Duration,
    /// Upper bound of one image search
    pub search_timeout: Duration,
    /// Wait after raising the focused program
    pub focus_settle: Duration,
}

impl Default for WorkerTiming {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(100),
            search_timeout: Duration::from_secs(10),
            focus_settle: Duration::from_millis(500),
        }
    }
}

/// Collaborators handed to every worker
#[derive(Clone)]
pub struct AutomationContext {
    pub matcher: Arc<dyn ScreenMatcher>,
    pub desktop: Arc<dyn Desktop>,
    pub timing: WorkerTiming,
}

/// Mutable state of one worker
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRuntimeState {
    /// Armed by the trigger policy and arm events
    pub active: bool,
    /// Set by a global pause, never touched by the policy
    pub paused: bool,
    pub last_found_region: Option<Region>,
    /// Search area was narrowed to `last_found_region`, never widened again
    pub fixed_search_region: bool,
    pub search_area: SearchArea,
}

pub struct AutomationWorker {
    name: String,
    definition: AutomationDefinition,
    ctx: AutomationContext,
    state: Mutex<WorkerRuntimeState>,
    /// Last observed match, taken by the acting step
    last_match: Mutex<Option<Match>>,
    phase: watch::Sender<WorkerPhase>,
    fired: AtomicU64,
}

impl AutomationWorker {
    pub fn new(
        name: impl Into<String>,
        definition: AutomationDefinition,
        ctx: AutomationContext,
    ) -> Self {
        let state = WorkerRuntimeState {
            active: policy::initially_active(&definition.trigger),
            paused: false,
            last_found_region: None,
            fixed_search_region: false,
            search_area: SearchArea::Screen,
        };
        let (phase, _) = watch::channel(WorkerPhase::Idle);
        Self {
            name: name.into(),
            definition,
            ctx,
            state: Mutex::new(state),
            last_match: Mutex::new(None),
            phase,
            fired: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &AutomationDefinition {
        &self.definition
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.borrow()
    }

    /// Watch phase changes
    pub fn subscribe(&self) -> watch::Receiver<WorkerPhase> {
        self.phase.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn runtime_state(&self) -> WorkerRuntimeState {
        self.state.lock().clone()
    }

    /// How many times the automation fired
    pub fn fired_count(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Pause or resume without stopping the scan loop, the armed state is kept
    pub fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock();
        if !self.phase().is_terminal() {
            state.paused = paused;
        }
    }

    /// Armed and not paused
    fn ready(&self) -> bool {
        let state = self.state.lock();
        state.active && !state.paused
    }

    /// Arm on an observed MIDI signature, returns whether it armed
    pub fn arm_midi(&self, observed: &str) -> bool {
        let armed = policy::arms_on_midi(
            &self.definition.trigger,
            self.definition.midi_signature.as_deref(),
            observed,
        );
        if armed {
            self.arm("midi");
        }
        armed
    }

    /// Arm after a playlist change, returns whether it armed
    pub fn arm_change(&self) -> bool {
        let armed = policy::arms_on_change(&self.definition.trigger);
        if armed {
            self.arm("change");
        }
        armed
    }

    fn arm(&self, cause: &str) {
        let mut state = self.state.lock();
        if !self.phase().is_terminal() {
            state.active = true;
            debug!("({}) armed by {}", self.name, cause);
        }
    }

    /// Stop scanning, safe to call any number of times from anywhere
    pub fn stop(&self) {
        if self.terminate(WorkerPhase::Stopped) {
            debug!("({}) stopped", self.name);
        }
    }

    /// Enter a terminal phase and deactivate, `false` if already terminal
    fn terminate(&self, phase: WorkerPhase) -> bool {
        let mut state = self.state.lock();
        state.active = false;
        self.phase.send_if_modified(|current| {
            if current.is_terminal() {
                false
            } else {
                *current = phase;
                true
            }
        })
    }

    /// Move to a non-terminal phase unless already terminal
    fn enter(&self, phase: WorkerPhase) {
        self.phase.send_if_modified(|current| {
            if current.is_terminal() || *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
    }

    /// Start the scan task and, with a timeout, the timeout task
    pub fn spawn(self: &Arc<Self>) -> WorkerHandle {
        info!("({}) started: {}", self.name, self.definition);
        let mut tasks = vec![tokio::spawn(self.clone().run())];
        if self.definition.timeout_ms > 0 {
            let timeout = Duration::from_millis(self.definition.timeout_ms);
            tasks.push(tokio::spawn(self.clone().watch_timeout(timeout)));
        }
        WorkerHandle {
            worker: self.clone(),
            tasks,
        }
    }

    async fn run(self: Arc<Self>) {
        let mut stop_rx = self.phase.subscribe();
        self.enter(WorkerPhase::Scanning);

        loop {
            if until_stopped(&mut stop_rx, tokio::time::sleep(self.ctx.timing.scan_interval))
                .await
                .is_none()
            {
                break;
            }
            if !self.ready() {
                continue;
            }
            if !self.scan_once(&mut stop_rx).await {
                break;
            }
        }

        debug!("({}) scan loop exited in {:?}", self.name, self.phase());
    }

    async fn watch_timeout(self: Arc<Self>, timeout: Duration) {
        let mut stop_rx = self.phase.subscribe();
        if until_stopped(&mut stop_rx, tokio::time::sleep(timeout))
            .await
            .is_some()
            && self.terminate(WorkerPhase::TimedOut)
        {
            info!("({}) timed out after {:?}", self.name, timeout);
        }
    }

    /// One scan pass, `false` once the worker is terminal
    async fn scan_once(&self, stop_rx: &mut watch::Receiver<WorkerPhase>) -> bool {
        let matched = match &self.definition.image {
            // No reference image: always a match, without a location
            None => true,
            Some(image) => {
                let request = SearchRequest {
                    image: image.clone(),
                    area: self.search_area(),
                    min_similarity: self.definition.min_similarity,
                    scan_rate: self.definition.scan_rate,
                    timeout: self.ctx.timing.search_timeout,
                };
                let search = tokio::time::timeout(request.timeout, self.ctx.matcher.search(&request));
                match until_stopped(stop_rx, search).await {
                    None => return false,
                    Some(Ok(Ok(Some(found)))) => {
                        *self.last_match.lock() = Some(found);
                        true
                    }
                    Some(Ok(Ok(None))) | Some(Err(_)) => {
                        debug!("({}) {} not found", self.name, image.display());
                        false
                    }
                    Some(Ok(Err(e))) => {
                        warn!("({}) search failed: {}", self.name, e);
                        false
                    }
                }
            }
        };

        let decision = {
            let mut state = self.state.lock();
            if self.phase().is_terminal() {
                return false;
            }
            // Paused while searching: keep the armed state for after resume
            if state.paused {
                return true;
            }
            let decision = policy::evaluate(&self.definition.trigger, state.active, matched);
            state.active = decision.next_active;
            decision
        };

        if !decision.fire {
            return true;
        }
        self.act(stop_rx).await
    }

    /// Narrow the search area to the last match once, for static targets
    fn search_area(&self) -> SearchArea {
        let mut state = self.state.lock();
        if !self.definition.movable && !state.fixed_search_region {
            if let Some(region) = state.last_found_region {
                state.search_area = SearchArea::Area(region);
                state.fixed_search_region = true;
                debug!("({}) search narrowed to {:?}", self.name, region);
            }
        }
        state.search_area
    }

    async fn act(&self, stop_rx: &mut watch::Receiver<WorkerPhase>) -> bool {
        self.enter(WorkerPhase::Acting);

        let min_delay = Duration::from_millis(self.definition.min_delay_ms);
        if until_stopped(stop_rx, tokio::time::sleep(min_delay))
            .await
            .is_none()
        {
            info!("({}) stopped before acting, action aborted", self.name);
            return false;
        }

        let found = self.last_match.lock().take();
        if let Some(found) = &found {
            self.state.lock().last_found_region = Some(found.region);
        }

        if let Some(program) = &self.definition.focused_program {
            if let Err(e) = self.ctx.desktop.focus_program(program).await {
                warn!("({}) could not focus {}: {}", self.name, program, e);
            }
            if until_stopped(stop_rx, tokio::time::sleep(self.ctx.timing.focus_settle))
                .await
                .is_none()
            {
                info!("({}) stopped while focusing, action aborted", self.name);
                return false;
            }
        }

        if self.phase().is_terminal() {
            return false;
        }

        self.perform(found.as_ref());
        let fired = self.fired.fetch_add(1, Ordering::Relaxed) + 1;
        info!("({}) fired #{}: {}", self.name, fired, self.definition.action);

        self.enter(WorkerPhase::Scanning);
        true
    }

    fn perform(&self, found: Option<&Match>) {
        let click = match self.definition.action {
            ActionKind::LeftClick => ClickKind::Left,
            ActionKind::RightClick => ClickKind::Right,
            ActionKind::DoubleClick => ClickKind::Double,
            ActionKind::SendKeys => {
                self.send_keys();
                return;
            }
        };

        match found {
            Some(found) => {
                if let Err(e) = self.ctx.desktop.click(click, found.location()) {
                    warn!("({}) click failed: {}", self.name, e);
                }
            }
            None => debug!("({}) no match location, click skipped", self.name),
        }
    }

    /// Press every key, then release every key
    fn send_keys(&self) {
        let keyboard = match self.ctx.desktop.keyboard() {
            Ok(keyboard) => keyboard,
            Err(e) => {
                error!("({}) key injection unavailable, action skipped: {}", self.name, e);
                return;
            }
        };
        for key in &self.definition.key_codes {
            if let Err(e) = keyboard.press(*key) {
                warn!("({}) key press {} failed: {}", self.name, key, e);
            }
        }
        for key in &self.definition.key_codes {
            if let Err(e) = keyboard.release(*key) {
                warn!("({}) key release {} failed: {}", self.name, key, e);
            }
        }
    }
}

/// Running worker plus its tasks
pub struct WorkerHandle {
    worker: Arc<AutomationWorker>,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn worker(&self) -> &Arc<AutomationWorker> {
        &self.worker
    }

    /// Stop the worker and wait until its tasks are gone
    pub async fn shutdown(self) {
        self.worker.stop();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("({}) task ended abnormally: {}", self.worker.name, e);
            }
        }
    }
}

/// Run `fut` unless the worker reaches a terminal phase first
async fn until_stopped<F: Future>(
    stop_rx: &mut watch::Receiver<WorkerPhase>,
    fut: F,
) -> Option<F::Output> {
    if stop_rx.borrow().is_terminal() {
        return None;
    }
    tokio::select! {
        biased;
        _ = stopped(stop_rx) => None,
        out = fut => Some(out),
    }
}

/// Resolves once the phase is terminal or the worker is gone
async fn stopped(stop_rx: &mut watch::Receiver<WorkerPhase>) {
    while !stop_rx.borrow_and_update().is_terminal() {
        if stop_rx.changed().await.is_err() {
            return;
        }
    }
}
