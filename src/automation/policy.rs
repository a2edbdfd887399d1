//! Trigger policy
//!
//! Pure decisions over a trigger and the worker's `active` flag. The MIDI
//! modifier only arms a worker; the base kind alone decides whether a match
//! fires and whether the worker stays armed afterwards.

use super::definition::{Trigger, TriggerKind};

/// Outcome of evaluating one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub fire: bool,
    pub next_active: bool,
}

/// Whether a worker with this trigger starts armed
pub fn initially_active(trigger: &Trigger) -> bool {
    trigger.kind != TriggerKind::OnMidi
}

/// Decide whether a scan result fires the automation
pub fn evaluate(trigger: &Trigger, active: bool, matched: bool) -> Decision {
    if !active || !matched {
        return Decision {
            fire: false,
            next_active: active,
        };
    }
    let next_active = match trigger.kind {
        TriggerKind::Always => true,
        TriggerKind::Once | TriggerKind::OncePerChange | TriggerKind::OnMidi => false,
    };
    Decision {
        fire: true,
        next_active,
    }
}

/// Whether an observed MIDI signature arms this trigger
pub fn arms_on_midi(trigger: &Trigger, configured: Option<&str>, observed: &str) -> bool {
    trigger.midi && configured.is_some_and(|sig| sig == observed)
}

/// Whether a playlist change arms this trigger
pub fn arms_on_change(trigger: &Trigger) -> bool {
    trigger.kind == TriggerKind::OncePerChange
}
