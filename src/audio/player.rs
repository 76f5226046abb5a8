use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::session::{AudioError, PlaybackSession, PlaybackState, SessionFactory};
use crate::catalog;

/// Why a clip could not be played
#[derive(Debug, Error)]
pub enum PlayError {
    /// Monitor or mic device not configured
    #[error("No output device configured.")]
    NoDevice,

    /// No supported file backs the clip
    #[error("Sound file not found.")]
    NotFound(String),

    /// Toggle requested with nothing selected
    #[error("No sound selected.")]
    NothingSelected,

    /// Backend failed while starting a session
    #[error("playback failed: {0}")]
    Session(#[from] AudioError),
}

/// Which of the two outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// What the user hears
    Monitor,
    /// What voice chat hears
    Mic,
}

/// Percent (0-100) to linear gain
#[must_use]
pub fn volume_gain(percent: u8) -> f32 {
    f32::from(percent.min(100)) / 100.0
}

/// Plays one clip on the monitor and mic devices at once
///
/// State, position and duration follow the monitor session. While the
/// user drags the seek control, position reporting is suspended so that
/// programmatic seeks and position updates do not feed back into each
/// other.
pub struct DualPlayer {
    factory: Box<dyn SessionFactory>,
    monitor: Option<Box<dyn PlaybackSession>>,
    mic: Option<Box<dyn PlaybackSession>>,
    monitor_volume: u8,
    mic_volume: u8,
    now_playing: Option<String>,
    seeking: bool,
}

impl DualPlayer {
    /// Player with no devices configured
    #[must_use]
    pub fn new(factory: Box<dyn SessionFactory>, monitor_volume: u8, mic_volume: u8) -> Self {
        Self {
            factory,
            monitor: None,
            mic: None,
            monitor_volume: monitor_volume.min(100),
            mic_volume: mic_volume.min(100),
            now_playing: None,
            seeking: false,
        }
    }

    /// Output devices the factory can open
    ///
    /// # Errors
    /// Returns error if the host cannot enumerate devices
    pub fn output_devices(&self) -> Result<Vec<String>, AudioError> {
        self.factory.output_devices()
    }

    /// Bind `route` to the device called `name`
    ///
    /// Whatever the route was playing stops. On failure the route is left
    /// unconfigured.
    ///
    /// # Errors
    /// Returns error if the device cannot be opened
    pub fn set_device(&mut self, route: Route, name: &str) -> Result<(), AudioError> {
        let slot = match route {
            Route::Monitor => &mut self.monitor,
            Route::Mic => &mut self.mic,
        };
        if let Some(mut old) = slot.take() {
            old.stop();
        }
        if route == Route::Monitor {
            self.now_playing = None;
        }

        let session = self.factory.open(name)?;
        info!(route = ?route, device = name, "output device configured");
        *slot = Some(session);
        Ok(())
    }

    /// Device name bound to `route`
    #[must_use]
    pub fn device(&self, route: Route) -> Option<String> {
        self.session(route).map(|s| s.device_name())
    }

    fn session(&self, route: Route) -> Option<&dyn PlaybackSession> {
        match route {
            Route::Monitor => self.monitor.as_deref(),
            Route::Mic => self.mic.as_deref(),
        }
    }

    /// Play clip `name` from `dir` on both devices
    ///
    /// Returns the resolved file. Fails without touching either session
    /// when a device is missing or no file matches. If the mic session
    /// fails after the monitor started, the monitor keeps playing.
    ///
    /// # Errors
    /// See [`PlayError`]
    pub fn play(&mut self, dir: Option<&Path>, name: &str) -> Result<PathBuf, PlayError> {
        let (Some(monitor), Some(mic)) = (self.monitor.as_mut(), self.mic.as_mut()) else {
            return Err(PlayError::NoDevice);
        };
        let path = dir
            .and_then(|d| catalog::resolve(d, name))
            .ok_or_else(|| PlayError::NotFound(name.to_owned()))?;

        monitor.start(&path, volume_gain(self.monitor_volume))?;
        self.now_playing = Some(name.to_owned());
        self.seeking = false;

        if let Err(e) = mic.start(&path, volume_gain(self.mic_volume)) {
            warn!(clip = name, error = %e, "mic session failed; monitor still playing");
            return Err(e.into());
        }

        info!(clip = name, path = %path.display(), "playing");
        Ok(path)
    }

    /// Play/pause button: start `selected` when stopped, otherwise toggle pause
    ///
    /// # Errors
    /// See [`PlayError`]
    pub fn toggle(&mut self, dir: Option<&Path>, selected: Option<&str>) -> Result<(), PlayError> {
        match self.state() {
            PlaybackState::Stopped => {
                let name = selected.ok_or(PlayError::NothingSelected)?;
                self.play(dir, name).map(|_| ())
            }
            PlaybackState::Paused => {
                self.resume();
                Ok(())
            }
            PlaybackState::Playing => {
                self.pause();
                Ok(())
            }
        }
    }

    /// Pause both sessions
    pub fn pause(&self) {
        if self.state() == PlaybackState::Playing {
            self.for_each(|s| s.pause());
            debug!("paused");
        }
    }

    /// Resume both sessions
    pub fn resume(&self) {
        if self.state() == PlaybackState::Paused {
            self.for_each(|s| s.resume());
            debug!("resumed");
        }
    }

    /// Stop both sessions
    pub fn stop(&mut self) {
        if self.state() == PlaybackState::Stopped && self.now_playing.is_none() {
            return;
        }
        for session in [self.monitor.as_mut(), self.mic.as_mut()].into_iter().flatten() {
            session.stop();
        }
        self.now_playing = None;
        self.seeking = false;
        debug!("stopped");
    }

    fn for_each(&self, f: impl Fn(&dyn PlaybackSession)) {
        for session in [self.monitor.as_deref(), self.mic.as_deref()].into_iter().flatten() {
            f(session);
        }
    }

    /// Set the volume of `route` (percent, clamped to 100); returns the applied value
    pub fn set_volume(&mut self, route: Route, percent: u8) -> u8 {
        let percent = percent.min(100);
        match route {
            Route::Monitor => self.monitor_volume = percent,
            Route::Mic => self.mic_volume = percent,
        }
        if let Some(session) = self.session(route) {
            session.set_volume(volume_gain(percent));
        }
        percent
    }

    /// Current volume of `route` in percent
    #[must_use]
    pub const fn volume(&self, route: Route) -> u8 {
        match route {
            Route::Monitor => self.monitor_volume,
            Route::Mic => self.mic_volume,
        }
    }

    /// The user grabbed the seek control; stop reporting position
    pub fn begin_seek(&mut self) {
        self.seeking = true;
    }

    /// The user released the seek control at `position`; seek both sessions
    ///
    /// Position reporting resumes even if a seek fails.
    ///
    /// # Errors
    /// Returns the first seek failure
    pub fn end_seek(&mut self, position: Duration) -> Result<(), AudioError> {
        let mic = self.mic.as_deref().map_or(Ok(()), |s| s.seek(position));
        let monitor = self.monitor.as_deref().map_or(Ok(()), |s| s.seek(position));
        self.seeking = false;
        debug!(position = ?position, "seek applied");
        mic.and(monitor)
    }

    /// Whether a seek drag is in progress
    #[must_use]
    pub const fn is_seeking(&self) -> bool {
        self.seeking
    }

    /// Position for display; `None` while seeking or without a monitor
    #[must_use]
    pub fn position(&self) -> Option<Duration> {
        if self.seeking {
            return None;
        }
        self.monitor.as_deref().map(PlaybackSession::position)
    }

    /// Length of the current clip
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.monitor.as_deref().and_then(PlaybackSession::duration)
    }

    /// Monitor session state
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.monitor
            .as_deref()
            .map_or(PlaybackState::Stopped, PlaybackSession::state)
    }

    /// Clip started by the last successful `play`
    #[must_use]
    pub fn now_playing(&self) -> Option<&str> {
        self.now_playing.as_deref()
    }

    /// Clear `now_playing` once the monitor has run dry; true on that transition
    pub fn poll_finished(&mut self) -> bool {
        if self.now_playing.is_some() && self.state() == PlaybackState::Stopped {
            debug!(clip = ?self.now_playing, "clip finished");
            self.now_playing = None;
            return true;
        }
        false
    }
}
