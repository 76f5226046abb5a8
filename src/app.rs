use anyhow::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::audio::{DualPlayer, PlaybackState, Route, SessionFactory};
use crate::catalog;
use crate::config::SettingsStore;
use crate::input::{ChordEvent, HotkeyListener, Mode};
use crate::keybinds::{KeybindError, Keybinds};
use crate::shell::{self, Command, ParseError};

/// Whether the event loop keeps running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep going
    Continue,
    /// Exit the loop
    Quit,
}

/// The soundboard: stores, catalog view and player, driven from one thread
///
/// Every mutation happens on the caller's thread; the hotkey listener only
/// posts [`ChordEvent`]s that are fed back through
/// [`App::handle_chord_event`].
///
/// While a keybind capture runs the keyboard belongs to the listener: shell
/// lines are swallowed, including the one submitted by the Enter that
/// commits the capture, whichever of the two arrives first.
pub struct App<W: Write> {
    settings: SettingsStore,
    keybinds: Arc<RwLock<Keybinds>>,
    keybinds_path: PathBuf,
    player: DualPlayer,
    clips: Vec<String>,
    view: Vec<String>,
    query: String,
    selected: Option<usize>,
    /// Clip whose keybind is being captured
    capture: Option<String>,
    /// Lines owed by capture commits; negative when a line arrived first
    stray_lines: isize,
    listener: Option<HotkeyListener>,
    out: W,
}

impl<W: Write> App<W> {
    /// Load the catalog and keybinds, and open the saved devices
    ///
    /// Devices that cannot be opened are reported and left unconfigured.
    ///
    /// # Errors
    /// Returns error if the keybind file cannot be read or created
    pub fn new(
        settings: SettingsStore,
        keybinds_path: PathBuf,
        factory: Box<dyn SessionFactory>,
        out: W,
    ) -> Result<Self> {
        let current = settings.get().clone();
        let clips = catalog::scan(current.directory());
        let keybinds = Keybinds::load_or_create(&keybinds_path, real_clips(&clips))?;
        info!(clips = clips.len(), keybinds = keybinds.len(), "catalog loaded");

        let player = DualPlayer::new(factory, current.output_volume, current.input_volume);

        let mut app = Self {
            settings,
            keybinds: Arc::new(RwLock::new(keybinds)),
            keybinds_path,
            player,
            view: clips.clone(),
            clips,
            query: String::new(),
            selected: None,
            capture: None,
            stray_lines: 0,
            listener: None,
            out,
        };

        for (route, name) in [
            (Route::Monitor, current.default_output),
            (Route::Mic, current.default_input),
        ] {
            if !name.is_empty() {
                app.open_device(route, &name)?;
            }
        }
        Ok(app)
    }

    /// Shared keybind map, for the listener
    #[must_use]
    pub fn keybinds(&self) -> Arc<RwLock<Keybinds>> {
        Arc::clone(&self.keybinds)
    }

    /// Route mode switches to the running listener
    pub fn attach_listener(&mut self, listener: HotkeyListener) {
        self.listener = Some(listener);
    }

    /// Clips currently listed (after search filtering)
    #[must_use]
    pub fn view(&self) -> &[String] {
        &self.view
    }

    /// Player, for inspection
    #[must_use]
    pub const fn player(&self) -> &DualPlayer {
        &self.player
    }

    /// Output sink
    #[must_use]
    pub const fn output(&self) -> &W {
        &self.out
    }

    /// Whether a keybind capture is in progress
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Handle one line read from the shell
    ///
    /// # Errors
    /// Returns error if writing to the output fails
    pub fn handle_line(&mut self, line: &str) -> Result<Flow> {
        if self.capture.is_some() {
            debug!("line swallowed during keybind capture");
            self.stray_lines -= 1;
            return Ok(Flow::Continue);
        }
        if self.stray_lines > 0 {
            debug!("line from capture commit swallowed");
            self.stray_lines -= 1;
            return Ok(Flow::Continue);
        }

        match shell::parse(line) {
            Ok(command) => self.handle_command(command),
            Err(ParseError::Empty) => Ok(Flow::Continue),
            Err(e) => {
                self.warn(&e.to_string())?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Execute one shell command
    ///
    /// # Errors
    /// Returns error if writing to the output fails
    pub fn handle_command(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::List => self.show_list()?,
            Command::Search(query) => {
                self.query = query;
                self.refresh_view();
                self.show_list()?;
            }
            Command::Select(index) => self.select(index)?,
            Command::Play(Some(name)) => self.play_clip(&name)?,
            Command::Play(None) => self.toggle()?,
            Command::Pause => self.player.pause(),
            Command::Stop => self.stop()?,
            Command::Seek(position) => {
                self.player.begin_seek();
                if let Err(e) = self.player.end_seek(position) {
                    self.warn(&e.to_string())?;
                }
            }
            Command::Status => self.show_status()?,
            Command::Volume(route, percent) => self.set_volume(route, percent)?,
            Command::Devices => self.show_devices()?,
            Command::Device(route, name) => {
                self.persist(|s| match route {
                    Route::Monitor => s.default_output.clone_from(&name),
                    Route::Mic => s.default_input.clone_from(&name),
                })?;
                self.open_device(route, &name)?;
            }
            Command::Dir(dir) => self.change_directory(&dir)?,
            Command::Reload => {
                self.rescan();
                self.show_list()?;
            }
            Command::Bind(clip) => self.begin_capture(clip)?,
            Command::Unbind(clip) => self.unbind(&clip)?,
            Command::Help => writeln!(self.out, "{}", shell::HELP)?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// React to a listener event
    ///
    /// # Errors
    /// Returns error if writing to the output fails
    pub fn handle_chord_event(&mut self, event: ChordEvent) -> Result<()> {
        match event {
            ChordEvent::Captured(combo) => {
                if self.capture.is_some() {
                    writeln!(self.out, "Captured: {combo}")?;
                }
            }
            ChordEvent::CaptureCommitted(combo) => {
                if self.capture.is_some() {
                    self.stray_lines += 1;
                    self.finish_capture(Some(combo))?;
                }
            }
            ChordEvent::CaptureCancelled => self.finish_capture(None)?,
            ChordEvent::Triggered(clip) => {
                if self.capture.is_none() {
                    self.play_clip(&clip)?;
                }
            }
            ChordEvent::Stop => {
                if self.capture.is_none() {
                    self.stop()?;
                }
            }
        }
        Ok(())
    }

    /// Periodic housekeeping: notice when a clip ran out
    ///
    /// # Errors
    /// Returns error if writing to the output fails
    pub fn on_tick(&mut self) -> Result<()> {
        if self.player.poll_finished() {
            writeln!(self.out, "Now Playing: None")?;
        }
        Ok(())
    }

    fn warn(&mut self, message: &str) -> Result<()> {
        writeln!(self.out, "Warning: {message}")?;
        Ok(())
    }

    /// Print the clip list
    ///
    /// # Errors
    /// Returns error if writing to the output fails
    pub fn show_list(&mut self) -> Result<()> {
        if self.view.is_empty() {
            writeln!(self.out, "(no clips; use 'dir <path>' to choose a folder)")?;
            return Ok(());
        }
        if catalog::is_sentinel(&self.view) {
            writeln!(self.out, "{}", catalog::NO_FILES_SENTINEL)?;
            return Ok(());
        }

        let keybinds = self.read_keybinds();
        let playing = self.player.now_playing();
        for (i, clip) in self.view.iter().enumerate() {
            let marker = if Some(i) == self.selected { '>' } else { ' ' };
            let playing = if playing == Some(clip.as_str()) { " ♪" } else { "" };
            let binding = keybinds
                .binding_for(clip)
                .map(|c| format!(" [{c}]"))
                .unwrap_or_default();
            writeln!(self.out, "{marker}{i:>3}  {clip}{binding}{playing}")?;
        }
        Ok(())
    }

    fn read_keybinds(&self) -> Keybinds {
        self.keybinds
            .read()
            .map(|k| k.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn write_keybinds<F>(&self, f: F) -> Result<(), KeybindError>
    where
        F: FnOnce(&mut Keybinds) -> Result<(), KeybindError>,
    {
        let mut keybinds = self
            .keybinds
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut *keybinds)?;
        keybinds.save(&self.keybinds_path)
    }

    fn select(&mut self, index: usize) -> Result<()> {
        if index < self.view.len() && !catalog::is_sentinel(&self.view) {
            self.selected = Some(index);
            writeln!(self.out, "Selected: {}", self.view[index])?;
        } else {
            self.warn("No sound selected.")?;
        }
        Ok(())
    }

    fn toggle(&mut self) -> Result<()> {
        let was_stopped = self.player.state() == PlaybackState::Stopped;
        let selected = self.selected.and_then(|i| self.view.get(i)).cloned();
        let dir = self.settings.get().directory().map(Path::to_path_buf);

        match self.player.toggle(dir.as_deref(), selected.as_deref()) {
            Ok(()) if was_stopped => {
                if let Some(clip) = self.player.now_playing().map(str::to_owned) {
                    writeln!(self.out, "Now Playing: {clip}")?;
                }
            }
            Ok(()) => {}
            Err(e) => self.warn(&e.to_string())?,
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.player.stop();
        writeln!(self.out, "Now Playing: None")?;
        Ok(())
    }

    fn play_clip(&mut self, name: &str) -> Result<()> {
        let dir = self.settings.get().directory().map(Path::to_path_buf);
        match self.player.play(dir.as_deref(), name) {
            Ok(_) => writeln!(self.out, "Now Playing: {name}")?,
            Err(e) => {
                warn!(clip = name, error = %e, "play failed");
                self.warn(&e.to_string())?;
            }
        }
        Ok(())
    }

    fn show_status(&mut self) -> Result<()> {
        let state = self.player.state();
        let clip = self.player.now_playing().unwrap_or("None").to_owned();
        let position = self
            .player
            .position()
            .map_or_else(|| "--:--".to_owned(), shell::format_time);
        let duration = self
            .player
            .duration()
            .map_or_else(|| "--:--".to_owned(), shell::format_time);
        let monitor = self.player.device(Route::Monitor).unwrap_or_default();
        let mic = self.player.device(Route::Mic).unwrap_or_default();

        writeln!(self.out, "Now Playing: {clip} ({state:?}) {position} / {duration}")?;
        writeln!(
            self.out,
            "monitor: {monitor} @ {}%   mic: {mic} @ {}%",
            self.player.volume(Route::Monitor),
            self.player.volume(Route::Mic)
        )?;
        Ok(())
    }

    fn set_volume(&mut self, route: Route, percent: u8) -> Result<()> {
        let applied = self.player.set_volume(route, percent);
        self.persist(|s| match route {
            Route::Monitor => s.output_volume = applied,
            Route::Mic => s.input_volume = applied,
        })?;
        writeln!(self.out, "{route:?} volume: {applied}")?;
        Ok(())
    }

    fn show_devices(&mut self) -> Result<()> {
        match self.player.output_devices() {
            Ok(devices) => {
                let monitor = self.player.device(Route::Monitor);
                let mic = self.player.device(Route::Mic);
                for name in devices {
                    let mut tags = Vec::new();
                    if monitor.as_deref() == Some(name.as_str()) {
                        tags.push("monitor");
                    }
                    if mic.as_deref() == Some(name.as_str()) {
                        tags.push("mic");
                    }
                    if tags.is_empty() {
                        writeln!(self.out, "  {name}")?;
                    } else {
                        writeln!(self.out, "  {name} ({})", tags.join(", "))?;
                    }
                }
            }
            Err(e) => self.warn(&e.to_string())?,
        }
        Ok(())
    }

    fn open_device(&mut self, route: Route, name: &str) -> Result<()> {
        if let Err(e) = self.player.set_device(route, name) {
            warn!(route = ?route, device = name, error = %e, "device unavailable");
            self.warn(&e.to_string())?;
        }
        Ok(())
    }

    fn change_directory(&mut self, dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            return self.warn(&format!("not a directory: {}", dir.display()));
        }
        let directory = dir.to_string_lossy().into_owned();
        self.persist(|s| s.directory = directory)?;
        self.player.stop();
        self.query.clear();
        self.rescan();

        let clips = real_clips(&self.clips).to_vec();
        let rebuilt = self.write_keybinds(|k| {
            k.rebuild(&clips);
            Ok(())
        });
        if let Err(e) = rebuilt {
            warn!(error = %e, "failed to rebuild keybinds");
            self.warn(&e.to_string())?;
        }
        info!(dir = %dir.display(), clips = self.clips.len(), "clip directory changed");
        self.show_list()
    }

    fn rescan(&mut self) {
        self.clips = catalog::scan(self.settings.get().directory());
        self.refresh_view();
    }

    fn refresh_view(&mut self) {
        self.view = if catalog::is_sentinel(&self.clips) {
            self.clips.clone()
        } else {
            catalog::filter(&self.clips, &self.query)
        };
        self.selected = None;
    }

    fn begin_capture(&mut self, clip: String) -> Result<()> {
        if !self.clips.contains(&clip) || catalog::is_sentinel(&self.clips) {
            return self.warn(&format!("unknown clip: {clip}"));
        }

        writeln!(self.out, "Set keybind for: {clip}")?;
        writeln!(
            self.out,
            "Hold your key combination (max 2 keys) and press Enter; Esc cancels"
        )?;
        if let Some(existing) = self.read_keybinds().binding_for(&clip) {
            writeln!(self.out, "Current: {existing}")?;
        }
        self.capture = Some(clip);
        self.stray_lines = self.stray_lines.max(0);
        self.set_listener_mode(Mode::Capture);
        Ok(())
    }

    /// End the capture; `None` cancels
    fn finish_capture(&mut self, combo: Option<String>) -> Result<()> {
        let Some(clip) = self.capture.take() else {
            return Ok(());
        };
        self.set_listener_mode(Mode::Armed);

        let combo = match combo {
            None => {
                writeln!(self.out, "Keybind capture cancelled")?;
                return Ok(());
            }
            Some(combo) if combo.is_empty() => {
                writeln!(self.out, "No keys captured; binding unchanged")?;
                return Ok(());
            }
            Some(combo) => combo,
        };

        match self.write_keybinds(|k| {
            k.bind(&clip, &combo);
            Ok(())
        }) {
            Ok(()) => {
                info!(clip = %clip, combo = %combo, "keybind set");
                writeln!(self.out, "{clip} bound to {combo}")?;
            }
            Err(e) => self.warn(&e.to_string())?,
        }
        Ok(())
    }

    fn unbind(&mut self, clip: &str) -> Result<()> {
        match self.write_keybinds(|k| k.clear(clip)) {
            Ok(()) => {
                info!(clip = clip, "keybind cleared");
                writeln!(self.out, "{clip} unbound")?;
            }
            Err(e) => self.warn(&e.to_string())?,
        }
        Ok(())
    }

    fn set_listener_mode(&self, mode: Mode) {
        if let Some(listener) = &self.listener {
            listener.set_mode(mode);
        }
    }

    fn persist<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut crate::config::Settings),
    {
        if let Err(e) = self.settings.update(f) {
            warn!(error = %e, "failed to save settings");
            self.warn(&e.to_string())?;
        }
        Ok(())
    }
}

/// Clips minus the scan-failure sentinel
fn real_clips(clips: &[String]) -> &[String] {
    if catalog::is_sentinel(clips) {
        &[]
    } else {
        clips
    }
}
