//! Automation definitions
//!
//! An automation binds a reference image (or none) to a click or key chord,
//! gated by a trigger. Definitions are immutable once loaded; runtime state
//! lives in the worker.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default minimum similarity handed to the matcher
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.7;

/// Default matcher scan rate in Hz
pub const DEFAULT_SCAN_RATE: f32 = 3.0;

/// What an automation does once it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    LeftClick,
    RightClick,
    DoubleClick,
    SendKeys,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::LeftClick => "left click",
            ActionKind::RightClick => "right click",
            ActionKind::DoubleClick => "double click",
            ActionKind::SendKeys => "send keys",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left click" => Ok(ActionKind::LeftClick),
            "right click" => Ok(ActionKind::RightClick),
            "double click" => Ok(ActionKind::DoubleClick),
            "send keys" => Ok(ActionKind::SendKeys),
            other => Err(format!("unknown action type '{}'", other)),
        }
    }
}

/// Base trigger kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Always,
    Once,
    OncePerChange,
    /// Armed only by a matching MIDI message, then fires once
    OnMidi,
}

/// Trigger of an automation
///
/// Text form is the base kind, optionally followed by `midi<device>`:
/// `once`, `once per change`, `midiBus 1`, `always midiBus 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub kind: TriggerKind,
    /// Matching MIDI messages arm the worker
    pub midi: bool,
    /// Input device the MIDI trigger listens on
    pub midi_device: Option<String>,
}

impl Trigger {
    const MIDI: &'static str = "midi";

    pub fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            midi: kind == TriggerKind::OnMidi,
            midi_device: None,
        }
    }

    pub fn on_midi(device: impl Into<String>) -> Self {
        Self {
            kind: TriggerKind::OnMidi,
            midi: true,
            midi_device: Some(device.into()).filter(|d: &String| !d.is_empty()),
        }
    }

    /// Add the MIDI modifier to a base kind
    pub fn with_midi(mut self, device: Option<String>) -> Self {
        self.midi = true;
        self.midi_device = device.filter(|d| !d.is_empty());
        self
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Trigger::new(TriggerKind::Always)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.kind {
            TriggerKind::Always => Some("always"),
            TriggerKind::Once => Some("once"),
            TriggerKind::OncePerChange => Some("once per change"),
            TriggerKind::OnMidi => None,
        };
        let midi = self.midi.then(|| {
            format!(
                "{}{}",
                Trigger::MIDI,
                self.midi_device.as_deref().unwrap_or_default()
            )
        });
        match (base, midi) {
            (Some(base), Some(midi)) => write!(f, "{} {}", base, midi),
            (Some(base), None) => f.write_str(base),
            (None, Some(midi)) => f.write_str(&midi),
            (None, None) => f.write_str(Trigger::MIDI),
        }
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (base, device) = match s.find(Trigger::MIDI) {
            Some(at) => (s[..at].trim(), Some(s[at + Trigger::MIDI.len()..].trim())),
            None => (s, None),
        };

        let kind = match base.to_ascii_lowercase().as_str() {
            "" if device.is_some() => TriggerKind::OnMidi,
            "always" => TriggerKind::Always,
            "once" => TriggerKind::Once,
            "once per change" => TriggerKind::OncePerChange,
            other => return Err(format!("unknown trigger '{}'", other)),
        };

        let trigger = Trigger::new(kind);
        Ok(match device {
            Some(device) => trigger.with_midi(Some(device.to_string())),
            None => trigger,
        })
    }
}

/// Screen rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + (self.w / 2) as i32, self.y + (self.h / 2) as i32)
    }
}

/// Where the matcher looks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchArea {
    Screen,
    Area(Region),
}

/// A successful match
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub region: Region,
    pub score: f32,
}

impl Match {
    pub fn location(&self) -> (i32, i32) {
        self.region.center()
    }
}

/// One configured automation
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationDefinition {
    /// Reference image, `None` fires without searching
    pub image: Option<PathBuf>,
    pub action: ActionKind,
    /// Key codes pressed together for [`ActionKind::SendKeys`]
    pub key_codes: Vec<u32>,
    pub trigger: Trigger,
    /// Signature that arms a MIDI triggered automation
    pub midi_signature: Option<String>,
    pub min_delay_ms: u64,
    /// 0 runs forever
    pub timeout_ms: u64,
    pub min_similarity: f32,
    pub scan_rate: f32,
    pub movable: bool,
    /// Program brought to the front before acting
    pub focused_program: Option<String>,
}

impl Default for AutomationDefinition {
    fn default() -> Self {
        Self {
            image: None,
            action: ActionKind::LeftClick,
            key_codes: Vec::new(),
            trigger: Trigger::default(),
            midi_signature: None,
            min_delay_ms: 0,
            timeout_ms: 0,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            scan_rate: DEFAULT_SCAN_RATE,
            movable: false,
            focused_program: None,
        }
    }
}

impl fmt::Display for AutomationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let image = self
            .image
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<no image>".to_string());
        write!(f, "{} on {} [{}]", self.action, image, self.trigger)?;
        if let Some(sig) = &self.midi_signature {
            write!(f, " midi=\"{}\"", sig)?;
        }
        Ok(())
    }
}
