use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::keybinds::Keybinds;

/// Most keys tracked in one combination
pub const MAX_HELD_KEYS: usize = 2;

/// Fixed global stop key; takes precedence over any binding
pub const STOP_KEY: &str = "backspace";

/// Keys that end a capture, committing the combination held before them
pub const COMMIT_KEYS: [&str; 2] = ["return", "kp_return"];

/// Key that ends a capture without changes
pub const CANCEL_KEY: &str = "escape";

/// Listener mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Held combinations trigger bound clips
    #[default]
    Armed,
    /// Held combinations are reported for a keybind capture
    Capture,
}

/// Output of the chord tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChordEvent {
    /// A bound combination was newly completed; carries the clip name
    Triggered(String),
    /// The stop key was pressed
    Stop,
    /// Current combination while capturing
    Captured(String),
    /// Capture ended by a commit key; carries the combination held before it
    /// (empty if nothing was pressed)
    CaptureCommitted(String),
    /// Capture ended by the cancel key
    CaptureCancelled,
}

/// Held-key state machine
///
/// Owned by the listener callback. Fires edge-triggered: a combination
/// fires once per continuous hold and re-arms only after every key is up.
///
/// Capture ends from the keyboard itself, so nothing typed to finish it
/// leaks into the combination. A commit or cancel key switches the tracker
/// back to [`Mode::Armed`].
#[derive(Debug, Default)]
pub struct ChordTracker {
    mode: Mode,
    held: BTreeSet<String>,
    last_fired: Option<String>,
}

impl ChordTracker {
    /// New tracker in armed mode
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mode
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch mode; held keys and the last-fired combination are reset
    pub fn set_mode(&mut self, mode: Mode) {
        debug!(from = ?self.mode, to = ?mode, "chord tracker mode switch");
        self.mode = mode;
        self.held.clear();
        self.last_fired = None;
    }

    /// Currently held keys joined by `+`
    #[must_use]
    pub fn combination(&self) -> String {
        self.held.iter().map(String::as_str).collect::<Vec<_>>().join("+")
    }

    /// Handle a normalized key-down
    pub fn on_press(&mut self, key: &str, keybinds: &Keybinds) -> Option<ChordEvent> {
        if key.is_empty() {
            return None;
        }
        match self.mode {
            Mode::Capture => self.capture_press(key),
            Mode::Armed => self.armed_press(key, keybinds),
        }
    }

    fn hold(&mut self, key: &str) {
        if self.held.len() < MAX_HELD_KEYS {
            self.held.insert(key.to_owned());
        }
    }

    fn capture_press(&mut self, key: &str) -> Option<ChordEvent> {
        if COMMIT_KEYS.contains(&key) {
            let combo = self.combination();
            debug!(combo = %combo, "capture committed");
            self.set_mode(Mode::Armed);
            return Some(ChordEvent::CaptureCommitted(combo));
        }
        if key == CANCEL_KEY {
            self.set_mode(Mode::Armed);
            return Some(ChordEvent::CaptureCancelled);
        }
        // reserved for stop
        if key == STOP_KEY {
            return None;
        }

        self.hold(key);
        let combo = self.combination();
        debug!(combo = %combo, "captured combination");
        Some(ChordEvent::Captured(combo))
    }

    fn armed_press(&mut self, key: &str, keybinds: &Keybinds) -> Option<ChordEvent> {
        self.hold(key);
        let combo = self.combination();
        if self.last_fired.as_deref() == Some(combo.as_str()) {
            return None;
        }

        if combo == STOP_KEY {
            info!("stop key pressed");
            self.last_fired = Some(combo);
            return Some(ChordEvent::Stop);
        }

        let clip = keybinds.action_for(&combo)?.to_owned();
        info!(combo = %combo, clip = %clip, "hotkey triggered");
        self.last_fired = Some(combo);
        Some(ChordEvent::Triggered(clip))
    }

    /// Handle a normalized key-up
    pub fn on_release(&mut self, key: &str) {
        if self.mode == Mode::Capture {
            return;
        }
        self.held.remove(key);
        if self.held.is_empty() {
            self.last_fired = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keybinds(pairs: &[(&str, &str)]) -> Keybinds {
        let mut keybinds = Keybinds::default();
        for (clip, combo) in pairs {
            keybinds.bind(clip, combo);
        }
        keybinds
    }

    fn triggered(clip: &str) -> Option<ChordEvent> {
        Some(ChordEvent::Triggered(clip.to_owned()))
    }

    #[test]
    fn test_two_key_chord_fires_once() {
        let binds = keybinds(&[("clap", "a+s")]);
        let mut tracker = ChordTracker::new();

        assert_eq!(tracker.on_press("a", &binds), None);
        assert_eq!(tracker.on_press("s", &binds), triggered("clap"));
    }

    #[test]
    fn test_held_chord_does_not_refire() {
        let binds = keybinds(&[("clap", "a+s")]);
        let mut tracker = ChordTracker::new();

        tracker.on_press("a", &binds);
        assert_eq!(tracker.on_press("s", &binds), triggered("clap"));
        // key repeat while held
        assert_eq!(tracker.on_press("s", &binds), None);
        assert_eq!(tracker.on_press("a", &binds), None);
    }

    #[test]
    fn test_rearms_after_full_release() {
        let binds = keybinds(&[("clap", "a+s")]);
        let mut tracker = ChordTracker::new();

        tracker.on_press("a", &binds);
        assert_eq!(tracker.on_press("s", &binds), triggered("clap"));
        tracker.on_release("s");
        tracker.on_release("a");

        tracker.on_press("s", &binds);
        assert_eq!(tracker.on_press("a", &binds), triggered("clap"));
    }

    #[test]
    fn test_partial_release_does_not_rearm() {
        let binds = keybinds(&[("clap", "a+s")]);
        let mut tracker = ChordTracker::new();

        tracker.on_press("a", &binds);
        tracker.on_press("s", &binds);
        tracker.on_release("s");
        assert_eq!(tracker.on_press("s", &binds), None);
    }

    #[test]
    fn test_third_key_ignored() {
        let binds = keybinds(&[("clap", "a+s"), ("boo", "a+d")]);
        let mut tracker = ChordTracker::new();

        tracker.on_press("a", &binds);
        tracker.on_press("s", &binds);
        assert_eq!(tracker.on_press("d", &binds), None);
        assert_eq!(tracker.combination(), "a+s");
    }

    #[test]
    fn test_single_then_chord_fire_separately() {
        let binds = keybinds(&[("boo", "a"), ("clap", "a+s")]);
        let mut tracker = ChordTracker::new();

        assert_eq!(tracker.on_press("a", &binds), triggered("boo"));
        assert_eq!(tracker.on_press("s", &binds), triggered("clap"));
    }

    #[test]
    fn test_combination_is_sorted() {
        let binds = Keybinds::default();
        let mut tracker = ChordTracker::new();

        tracker.on_press("z", &binds);
        tracker.on_press("f1", &binds);
        assert_eq!(tracker.combination(), "f1+z");
    }

    #[test]
    fn test_release_of_unheld_key_is_harmless() {
        let binds = keybinds(&[("clap", "a")]);
        let mut tracker = ChordTracker::new();

        tracker.on_release("q");
        assert_eq!(tracker.on_press("a", &binds), triggered("clap"));
    }

    #[test]
    fn test_empty_key_dropped() {
        let binds = keybinds(&[("clap", "a")]);
        let mut tracker = ChordTracker::new();

        assert_eq!(tracker.on_press("", &binds), None);
        assert_eq!(tracker.combination(), "");
    }

    #[test]
    fn test_capture_mode_reports_without_triggering() {
        let binds = keybinds(&[("clap", "a+s")]);
        let mut tracker = ChordTracker::new();
        tracker.set_mode(Mode::Capture);

        assert_eq!(
            tracker.on_press("s", &binds),
            Some(ChordEvent::Captured("s".to_owned()))
        );
        assert_eq!(
            tracker.on_press("a", &binds),
            Some(ChordEvent::Captured("a+s".to_owned()))
        );
        // releases are ignored while capturing
        tracker.on_release("a");
        assert_eq!(tracker.combination(), "a+s");
    }

    fn capture(tracker: &mut ChordTracker, binds: &Keybinds, keys: &[&str]) -> Vec<ChordEvent> {
        keys.iter()
            .filter_map(|key| {
                let event = tracker.on_press(key, binds);
                tracker.on_release(key);
                event
            })
            .collect()
    }

    #[test]
    fn test_capture_single_key_then_return() {
        let binds = Keybinds::default();
        let mut tracker = ChordTracker::new();
        tracker.set_mode(Mode::Capture);

        let events = capture(&mut tracker, &binds, &["f9", "return"]);

        assert_eq!(
            events,
            vec![
                ChordEvent::Captured("f9".to_owned()),
                ChordEvent::CaptureCommitted("f9".to_owned()),
            ]
        );
        assert_eq!(tracker.mode(), Mode::Armed);
    }

    #[test]
    fn test_keys_after_commit_do_not_join_capture() {
        let binds = Keybinds::default();
        let mut tracker = ChordTracker::new();
        tracker.set_mode(Mode::Capture);

        let events = capture(&mut tracker, &binds, &["f9", "return", "a", "c", "c", "e"]);

        assert_eq!(
            events.last(),
            Some(&ChordEvent::CaptureCommitted("f9".to_owned()))
        );
        assert_eq!(tracker.combination(), "");
    }

    #[test]
    fn test_commit_with_nothing_held_is_empty() {
        let binds = Keybinds::default();
        let mut tracker = ChordTracker::new();
        tracker.set_mode(Mode::Capture);

        assert_eq!(
            tracker.on_press("kp_return", &binds),
            Some(ChordEvent::CaptureCommitted(String::new()))
        );
    }

    #[test]
    fn test_escape_cancels_capture() {
        let binds = Keybinds::default();
        let mut tracker = ChordTracker::new();
        tracker.set_mode(Mode::Capture);
        tracker.on_press("a", &binds);

        assert_eq!(
            tracker.on_press("escape", &binds),
            Some(ChordEvent::CaptureCancelled)
        );
        assert_eq!(tracker.mode(), Mode::Armed);
        assert_eq!(tracker.combination(), "");
    }

    #[test]
    fn test_stop_key_not_capturable() {
        let binds = Keybinds::default();
        let mut tracker = ChordTracker::new();
        tracker.set_mode(Mode::Capture);

        assert_eq!(tracker.on_press("backspace", &binds), None);
        assert_eq!(tracker.combination(), "");
    }

    #[test]
    fn test_stop_key_fires_stop_once_per_press() {
        let binds = keybinds(&[("clap", "backspace")]);
        let mut tracker = ChordTracker::new();

        assert_eq!(tracker.on_press("backspace", &binds), Some(ChordEvent::Stop));
        // key repeat
        assert_eq!(tracker.on_press("backspace", &binds), None);
        tracker.on_release("backspace");
        assert_eq!(tracker.on_press("backspace", &binds), Some(ChordEvent::Stop));
    }

    #[test]
    fn test_stop_key_inside_chord_is_plain_key() {
        let binds = keybinds(&[("clap", "a+backspace")]);
        let mut tracker = ChordTracker::new();

        tracker.on_press("a", &binds);
        assert_eq!(tracker.on_press("backspace", &binds), triggered("clap"));
    }

    #[test]
    fn test_mode_switch_clears_held_keys() {
        let binds = keybinds(&[("clap", "a+s")]);
        let mut tracker = ChordTracker::new();
        tracker.set_mode(Mode::Capture);
        tracker.on_press("a", &binds);
        tracker.on_press("s", &binds);

        tracker.set_mode(Mode::Armed);

        assert_eq!(tracker.mode(), Mode::Armed);
        assert_eq!(tracker.combination(), "");
        tracker.on_press("a", &binds);
        assert_eq!(tracker.on_press("s", &binds), triggered("clap"));
    }
}
