use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors persisting the keybind map
#[derive(Debug, Error)]
pub enum KeybindError {
    /// Filesystem failure
    #[error("keybind I/O failed for {path}: {source}")]
    Io {
        /// Keybind file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Serialization failure
    #[error("failed to encode keybinds: {0}")]
    Encode(#[from] serde_json::Error),

    /// Clip is not in the map
    #[error("unknown clip: {0}")]
    UnknownClip(String),
}

/// Clip name → key combination (`"a+s"`), empty string when unbound
///
/// Combinations are not required to be unique; [`Keybinds::action_for`]
/// returns the first clip in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keybinds {
    bindings: BTreeMap<String, String>,
}

impl Keybinds {
    /// Map with an empty binding for every clip
    #[must_use]
    pub fn for_clips(clips: &[String]) -> Self {
        Self {
            bindings: clips
                .iter()
                .map(|c| (c.clone(), String::new()))
                .collect(),
        }
    }

    /// Load from `path`
    ///
    /// A missing file is created from `clips` with empty bindings.
    /// A malformed file is treated as an empty map.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or the default cannot be written
    pub fn load_or_create(path: &Path, clips: &[String]) -> Result<Self, KeybindError> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Self::parse(&contents).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "malformed keybind file, starting empty");
                Self::default()
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    clips = clips.len(),
                    "keybind file missing, creating"
                );
                let keybinds = Self::for_clips(clips);
                keybinds.save(path)?;
                Ok(keybinds)
            }
            Err(source) => Err(KeybindError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        let bindings: BTreeMap<String, String> = serde_json::from_str(contents)?;
        Ok(Self { bindings })
    }

    /// Write the map as pretty JSON
    ///
    /// # Errors
    /// Returns error if encoding or writing fails
    pub fn save(&self, path: &Path) -> Result<(), KeybindError> {
        let json = serde_json::to_string_pretty(&self.bindings)?;
        fs::write(path, json).map_err(|source| KeybindError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), entries = self.bindings.len(), "keybinds saved");
        Ok(())
    }

    /// Replace every entry with an empty binding per clip (folder changed)
    pub fn rebuild(&mut self, clips: &[String]) {
        *self = Self::for_clips(clips);
    }

    /// Bind `combo` to `clip`; the clip entry is created if absent
    pub fn bind(&mut self, clip: &str, combo: &str) {
        self.bindings.insert(clip.to_owned(), combo.to_owned());
    }

    /// Clear the binding of `clip`
    ///
    /// # Errors
    /// Returns error if `clip` has no entry
    pub fn clear(&mut self, clip: &str) -> Result<(), KeybindError> {
        self.bindings
            .get_mut(clip)
            .map(String::clear)
            .ok_or_else(|| KeybindError::UnknownClip(clip.to_owned()))
    }

    /// Combination bound to `clip`, `None` if unbound or unknown
    #[must_use]
    pub fn binding_for(&self, clip: &str) -> Option<&str> {
        self.bindings
            .get(clip)
            .map(String::as_str)
            .filter(|c| !c.is_empty())
    }

    /// Clip armed on `combo`
    #[must_use]
    pub fn action_for(&self, combo: &str) -> Option<&str> {
        if combo.is_empty() {
            return None;
        }
        self.bindings
            .iter()
            .find(|(_, c)| c.as_str() == combo)
            .map(|(clip, _)| clip.as_str())
    }

    /// All entries in clip-name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether there are no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
