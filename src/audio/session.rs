use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use super::device;

/// Audio backend errors
#[derive(Debug, Error)]
pub enum AudioError {
    /// No output device carries this name
    #[error("output device not found: {0}")]
    DeviceNotFound(String),

    /// Host refused to list devices
    #[error("failed to enumerate output devices: {0}")]
    Devices(String),

    /// Stream or sink could not be opened on the device
    #[error("failed to open output stream on {device}: {reason}")]
    Stream {
        /// Device name
        device: String,
        /// Backend message
        reason: String,
    },

    /// Clip file could not be opened
    #[error("failed to open {path}: {source}")]
    Open {
        /// Clip file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Clip file is not decodable
    #[error("failed to decode {path}: {reason}")]
    Decode {
        /// Clip file
        path: PathBuf,
        /// Decoder message
        reason: String,
    },

    /// Backend rejected the seek
    #[error("seek failed: {0}")]
    Seek(String),
}

/// Playback state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing queued or the clip finished
    Stopped,
    /// Audio is flowing
    Playing,
    /// Clip queued but paused
    Paused,
}

/// One clip playing on one output device
///
/// Volumes are linear gains (1.0 = unity).
#[cfg_attr(test, mockall::automock)]
pub trait PlaybackSession {
    /// Output device this session is bound to
    fn device_name(&self) -> String;
    /// Replace whatever is playing with `path`
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or decoded
    fn start(&mut self, path: &Path, volume: f32) -> Result<(), AudioError>;
    /// Pause output
    fn pause(&self);
    /// Resume output
    fn resume(&self);
    /// Stop and drop the queued clip
    fn stop(&mut self);
    /// Change gain live
    fn set_volume(&self, volume: f32);
    /// Jump to `position`
    ///
    /// # Errors
    /// Returns error if the decoder cannot seek
    fn seek(&self, position: Duration) -> Result<(), AudioError>;
    /// Current position in the clip
    fn position(&self) -> Duration;
    /// Clip length, when the decoder knows it
    fn duration(&self) -> Option<Duration>;
    /// Current state
    fn state(&self) -> PlaybackState;
}

/// Opens playback sessions on named output devices
#[cfg_attr(test, mockall::automock)]
pub trait SessionFactory {
    /// Names of all output devices
    ///
    /// # Errors
    /// Returns error if the host cannot enumerate devices
    fn output_devices(&self) -> Result<Vec<String>, AudioError>;
    /// Open a session on the device called `device_name`
    ///
    /// # Errors
    /// Returns error if the device is missing or its stream cannot be opened
    fn open(&self, device_name: &str) -> Result<Box<dyn PlaybackSession>, AudioError>;
}

/// `SessionFactory` backed by the default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioFactory;

impl SessionFactory for RodioFactory {
    fn output_devices(&self) -> Result<Vec<String>, AudioError> {
        device::output_device_names()
    }

    fn open(&self, device_name: &str) -> Result<Box<dyn PlaybackSession>, AudioError> {
        let device = device::find_output_device(device_name)?;
        Ok(Box::new(RodioSession::open(&device, device_name)?))
    }
}

/// Rodio sink on a dedicated output stream
pub struct RodioSession {
    device_name: String,
    /// Kept alive; dropping it silences the device
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    duration: Option<Duration>,
}

impl RodioSession {
    /// Open an output stream on `device`
    ///
    /// # Errors
    /// Returns error if the stream cannot be built
    pub fn open(device: &cpal::Device, device_name: &str) -> Result<Self, AudioError> {
        let (stream, handle) =
            OutputStream::try_from_device(device).map_err(|e| AudioError::Stream {
                device: device_name.to_owned(),
                reason: e.to_string(),
            })?;
        info!(device = device_name, "output stream opened");

        Ok(Self {
            device_name: device_name.to_owned(),
            _stream: stream,
            handle,
            sink: None,
            duration: None,
        })
    }
}

impl PlaybackSession for RodioSession {
    fn device_name(&self) -> String {
        self.device_name.clone()
    }

    fn start(&mut self, path: &Path, volume: f32) -> Result<(), AudioError> {
        let file = File::open(path).map_err(|source| AudioError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| AudioError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let duration = source.total_duration();

        // A stopped sink cannot be reused, so every clip gets a fresh one
        let sink = Sink::try_new(&self.handle).map_err(|e| AudioError::Stream {
            device: self.device_name.clone(),
            reason: e.to_string(),
        })?;
        sink.set_volume(volume);
        sink.append(source);

        if let Some(previous) = self.sink.replace(sink) {
            previous.stop();
        }
        self.duration = duration;

        debug!(
            device = %self.device_name,
            path = %path.display(),
            volume = volume,
            duration = ?duration,
            "session started"
        );
        Ok(())
    }

    fn pause(&self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn resume(&self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.duration = None;
    }

    fn set_volume(&self, volume: f32) {
        if let Some(sink) = &self.sink {
            sink.set_volume(volume);
        }
    }

    fn seek(&self, position: Duration) -> Result<(), AudioError> {
        match &self.sink {
            Some(sink) => sink
                .try_seek(position)
                .map_err(|e| AudioError::Seek(e.to_string())),
            None => Ok(()),
        }
    }

    fn position(&self) -> Duration {
        self.sink.as_ref().map_or(Duration::ZERO, Sink::get_pos)
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn state(&self) -> PlaybackState {
        match &self.sink {
            Some(sink) if sink.empty() => PlaybackState::Stopped,
            Some(sink) if sink.is_paused() => PlaybackState::Paused,
            Some(_) => PlaybackState::Playing,
            None => PlaybackState::Stopped,
        }
    }
}
