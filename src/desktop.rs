//! Desktop collaborators: screen matching, focus and input injection
//!
//! The automation engine only talks to these traits. [`XdotoolDesktop`]
//! injects through the `xdotool` command line tool.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, trace, warn};

use crate::automation::definition::{Match, SearchArea};
use crate::error::{AutomatorError, Result};

/// One search for a reference image
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub image: PathBuf,
    pub area: SearchArea,
    pub min_similarity: f32,
    pub scan_rate: f32,
    /// Upper bound for this attempt
    pub timeout: Duration,
}

/// Screen-image matching primitive
#[async_trait]
pub trait ScreenMatcher: Send + Sync {
    /// Search once, `Ok(None)` when the image did not appear in time
    async fn search(&self, request: &SearchRequest) -> Result<Option<Match>>;
}

/// Matcher that never finds anything
pub struct NullScreenMatcher;

#[async_trait]
impl ScreenMatcher for NullScreenMatcher {
    async fn search(&self, request: &SearchRequest) -> Result<Option<Match>> {
        trace!("No matcher backend, {} not searched", request.image.display());
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    Left,
    Right,
    Double,
}

/// Key injection handle
pub trait Keyboard: Send + Sync {
    fn press(&self, key_code: u32) -> Result<()>;
    fn release(&self, key_code: u32) -> Result<()>;
}

/// Window focus and pointer/keyboard injection
#[async_trait]
pub trait Desktop: Send + Sync {
    /// Bring a program to the front
    async fn focus_program(&self, program: &str) -> Result<()>;

    fn click(&self, kind: ClickKind, at: (i32, i32)) -> Result<()>;

    /// Acquire the keyboard, fails when injection is unavailable
    fn keyboard(&self) -> Result<Arc<dyn Keyboard>>;
}

/// Default input injection tool
const XDOTOOL: &str = "xdotool";

/// Desktop backed by `xdotool` for input and OS tools for window focus
///
/// The tool is checked once at construction. When it is missing, or there is
/// no X display, clicks and keyboard acquisition fail with
/// `InjectionUnavailable` while focus still works.
pub struct XdotoolDesktop {
    injector: std::result::Result<Arc<Xdotool>, String>,
}

impl XdotoolDesktop {
    /// Detect `xdotool` on an X11 session
    pub fn new() -> Self {
        if !cfg!(target_os = "linux") {
            return Self::unavailable("xdotool injection needs Linux with X11");
        }
        if std::env::var_os("DISPLAY").is_none() {
            return Self::unavailable("no X display (DISPLAY is unset)");
        }
        Self::with_program(XDOTOOL)
    }

    /// Use `program` as the injection tool if `<program> version` runs
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let probe = std::process::Command::new(&program)
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        let injector = match probe {
            Ok(status) if status.success() => {
                info!("Input injection through {}", program.display());
                Ok(Arc::new(Xdotool { program }))
            }
            Ok(status) => Err(format!("{} version exited with {}", program.display(), status)),
            Err(e) => Err(format!("{} not runnable: {}", program.display(), e)),
        };
        if let Err(reason) = &injector {
            warn!("Input injection disabled: {}", reason);
        }
        Self { injector }
    }

    fn unavailable(reason: &str) -> Self {
        warn!("Input injection disabled: {}", reason);
        Self {
            injector: Err(reason.to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.injector.is_ok()
    }

    fn injector(&self) -> Result<&Arc<Xdotool>> {
        self.injector
            .as_ref()
            .map_err(|reason| AutomatorError::InjectionUnavailable(reason.clone()))
    }

    fn focus_command(program: &str) -> Command {
        #[cfg(target_os = "macos")]
        {
            let mut cmd = Command::new("open");
            cmd.arg(program);
            cmd
        }
        #[cfg(target_os = "windows")]
        {
            let mut cmd = Command::new("powershell");
            cmd.arg("-NoProfile").arg("-Command").arg(format!(
                "(New-Object -ComObject WScript.Shell).AppActivate('{}')",
                program.replace('\'', "''")
            ));
            cmd
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            let mut cmd = Command::new("wmctrl");
            cmd.arg("-a").arg(program);
            cmd
        }
    }
}

impl Default for XdotoolDesktop {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Desktop for XdotoolDesktop {
    async fn focus_program(&self, program: &str) -> Result<()> {
        debug!("Focusing program: {}", program);
        let status = Self::focus_command(program)
            .status()
            .await
            .map_err(|e| AutomatorError::InjectionUnavailable(format!("focus {}: {}", program, e)))?;
        if !status.success() {
            return Err(AutomatorError::InjectionUnavailable(format!(
                "focus {} exited with {}",
                program, status
            )));
        }
        Ok(())
    }

    fn click(&self, kind: ClickKind, at: (i32, i32)) -> Result<()> {
        let injector = self.injector()?;
        info!("🖱️  {:?} click at ({}, {})", kind, at.0, at.1);
        let mut args = vec![
            "mousemove".to_string(),
            at.0.to_string(),
            at.1.to_string(),
            "click".to_string(),
        ];
        args.extend(
            match kind {
                ClickKind::Left => &["1"][..],
                ClickKind::Right => &["3"][..],
                ClickKind::Double => &["--repeat", "2", "1"][..],
            }
            .iter()
            .map(|a| a.to_string()),
        );
        injector.run(&args)
    }

    fn keyboard(&self) -> Result<Arc<dyn Keyboard>> {
        let injector = self.injector()?.clone();
        Ok(injector as Arc<dyn Keyboard>)
    }
}

/// Runs one `xdotool` command per injected event
struct Xdotool {
    program: PathBuf,
}

impl Xdotool {
    fn run(&self, args: &[String]) -> Result<()> {
        trace!("{} {}", self.program.display(), args.join(" "));
        let status = std::process::Command::new(&self.program)
            .args(args)
            .stdout(Stdio::null())
            .status()
            .map_err(|e| {
                AutomatorError::InjectionUnavailable(format!("{}: {}", self.program.display(), e))
            })?;
        if !status.success() {
            return Err(AutomatorError::InjectionUnavailable(format!(
                "{} {} exited with {}",
                self.program.display(),
                args.first().map(String::as_str).unwrap_or_default(),
                status
            )));
        }
        Ok(())
    }

    fn key(&self, action: &str, key_code: u32) -> Result<()> {
        let name = key_name(key_code).ok_or_else(|| {
            AutomatorError::InjectionUnavailable(format!("no key name for key code {}", key_code))
        })?;
        self.run(&[action.to_string(), name])
    }
}

impl Keyboard for Xdotool {
    fn press(&self, key_code: u32) -> Result<()> {
        debug!("⌨️  key press {}", key_code);
        self.key("keydown", key_code)
    }

    fn release(&self, key_code: u32) -> Result<()> {
        debug!("⌨️  key release {}", key_code);
        self.key("keyup", key_code)
    }
}

/// X keysym name for a virtual key code
///
/// Key codes follow the classic virtual key table: letters and digits are
/// their ASCII upper-case codes, 112..=123 are F1 to F12.
pub fn key_name(key_code: u32) -> Option<String> {
    let named = match key_code {
        8 => "BackSpace",
        9 => "Tab",
        10 => "Return",
        16 => "shift",
        17 => "ctrl",
        18 => "alt",
        19 => "Pause",
        20 => "Caps_Lock",
        27 => "Escape",
        32 => "space",
        33 => "Prior",
        34 => "Next",
        35 => "End",
        36 => "Home",
        37 => "Left",
        38 => "Up",
        39 => "Right",
        40 => "Down",
        44 => "comma",
        45 => "minus",
        46 => "period",
        47 => "slash",
        59 => "semicolon",
        61 => "equal",
        91 => "bracketleft",
        92 => "backslash",
        93 => "bracketright",
        127 => "Delete",
        155 => "Insert",
        157 | 524 => "super",
        48..=57 | 65..=90 => {
            return char::from_u32(key_code).map(|c| c.to_ascii_lowercase().to_string())
        }
        112..=123 => return Some(format!("F{}", key_code - 111)),
        _ => return None,
    };
    Some(named.to_string())
}
