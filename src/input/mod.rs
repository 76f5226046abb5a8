/// Held-key chord state machine
pub mod hotkey;
/// System-wide keyboard hook thread
pub mod listener;

pub use hotkey::{ChordEvent, ChordTracker, Mode};
pub use listener::{HotkeyListener, ListenerError};
