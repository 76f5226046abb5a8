use rdev::{Event, EventType, Key};
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use super::hotkey::{ChordEvent, ChordTracker, Mode};
use crate::keybinds::Keybinds;

/// How long `start` waits for the OS hook to report an install failure
const INSTALL_GRACE: Duration = Duration::from_millis(300);

/// Errors starting the global key listener
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Platform permission missing (macOS Input Monitoring)
    #[error("input monitoring unavailable: {0}")]
    Permission(String),

    /// Listener thread could not be spawned
    #[error("failed to spawn listener thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// OS keyboard hook could not be installed
    #[error("failed to install keyboard hook: {0}")]
    Install(String),
}

/// Normalize a raw key event to the name used in combinations
///
/// A printable character wins (lowercased); otherwise the symbolic key
/// name in `snake_case`. Keys with neither are dropped.
#[must_use]
pub fn normalize_key(key: Key, text: Option<&str>) -> Option<String> {
    if let Some(text) = text {
        if !text.is_empty() && text.chars().all(|c| !c.is_control() && !c.is_whitespace()) {
            return Some(text.to_lowercase());
        }
    }
    symbolic_name(key)
}

fn symbolic_name(key: Key) -> Option<String> {
    let debug = format!("{key:?}");
    if !debug.chars().all(char::is_alphanumeric) {
        // Unknown(code) and friends
        return None;
    }
    let mut name = String::with_capacity(debug.len() + 4);
    let mut prev_lower = false;
    for c in debug.chars() {
        if c.is_uppercase() && prev_lower {
            name.push('_');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        name.extend(c.to_lowercase());
    }
    Some(name)
}

/// State owned by the hook callback
struct ListenerContext {
    tracker: ChordTracker,
    keybinds: Arc<RwLock<Keybinds>>,
    events: UnboundedSender<ChordEvent>,
    control: std_mpsc::Receiver<Mode>,
    /// Name each physical key had when pressed, so releases match
    pressed: Vec<(Key, String)>,
}

impl ListenerContext {
    fn handle(&mut self, event: &Event) {
        while let Ok(mode) = self.control.try_recv() {
            self.tracker.set_mode(mode);
        }

        match event.event_type {
            EventType::KeyPress(key) => {
                let Some(name) = normalize_key(key, event.name.as_deref()) else {
                    debug!(key = ?key, "dropping key without a name");
                    return;
                };
                self.pressed.retain(|(k, _)| *k != key);
                self.pressed.push((key, name.clone()));

                let outcome = match self.keybinds.read() {
                    Ok(keybinds) => self.tracker.on_press(&name, &keybinds),
                    Err(e) => {
                        warn!("keybind lock poisoned: {}", e);
                        return;
                    }
                };
                if let Some(chord_event) = outcome {
                    if self.events.send(chord_event).is_err() {
                        debug!("event receiver dropped");
                    }
                }
            }
            EventType::KeyRelease(key) => {
                let name = self
                    .pressed
                    .iter()
                    .position(|(k, _)| *k == key)
                    .map(|i| self.pressed.swap_remove(i).1)
                    .or_else(|| normalize_key(key, None));
                if let Some(name) = name {
                    self.tracker.on_release(&name);
                }
            }
            _ => {}
        }
    }
}

/// Handle to the background keyboard hook
///
/// The hook thread lives for the rest of the process; the OS hook has no
/// portable uninstall.
pub struct HotkeyListener {
    control: std_mpsc::Sender<Mode>,
}

impl HotkeyListener {
    /// Install the system-wide hook on a dedicated thread
    ///
    /// # Errors
    /// Returns error if permissions are missing, the thread cannot be
    /// spawned, or the hook reports an install failure
    pub fn start(
        keybinds: Arc<RwLock<Keybinds>>,
        events: UnboundedSender<ChordEvent>,
    ) -> Result<Self, ListenerError> {
        crate::permissions::check_input_monitoring_permission()
            .map_err(|e| ListenerError::Permission(e.to_string()))?;

        let (control_tx, control_rx) = std_mpsc::channel();
        let (failure_tx, failure_rx) = std_mpsc::channel::<String>();

        std::thread::Builder::new()
            .name("hotkey-listener".to_owned())
            .spawn(move || {
                let mut ctx = ListenerContext {
                    tracker: ChordTracker::new(),
                    keybinds,
                    events,
                    control: control_rx,
                    pressed: Vec::with_capacity(4),
                };
                if let Err(e) = rdev::listen(move |event| ctx.handle(&event)) {
                    error!("keyboard hook failed: {:?}", e);
                    let _ = failure_tx.send(format!("{e:?}"));
                }
            })?;

        match failure_rx.recv_timeout(INSTALL_GRACE) {
            Ok(reason) => Err(ListenerError::Install(reason)),
            Err(RecvTimeoutError::Disconnected) => Err(ListenerError::Install(
                "listener thread exited".to_owned(),
            )),
            Err(RecvTimeoutError::Timeout) => {
                info!("global keyboard hook installed");
                Ok(Self {
                    control: control_tx,
                })
            }
        }
    }

    /// Switch between armed and capture mode
    ///
    /// Takes effect before the next key event is processed.
    pub fn set_mode(&self, mode: Mode) {
        if self.control.send(mode).is_err() {
            warn!("listener thread gone, mode switch dropped");
        }
    }
}
