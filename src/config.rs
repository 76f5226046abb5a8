use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const APP_DIR_WINDOWS: &str = "Soundbox";
const APP_DIR_UNIX: &str = ".soundbox";

/// Default volume for both outputs (percent)
pub const DEFAULT_VOLUME: u8 = 50;

/// Errors reading or writing the settings document
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `APPDATA` nor `HOME` is set
    #[error("cannot locate app data directory: neither APPDATA nor HOME is set")]
    NoDataDir,

    /// Filesystem failure
    #[error("settings I/O failed for {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Settings file exists but is not valid JSON
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        /// Settings file
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },
}

/// Locations of every file the app owns
#[derive(Debug, Clone)]
pub struct Paths {
    /// App data directory
    pub data_dir: PathBuf,
}

impl Paths {
    /// Resolve `%APPDATA%\Soundbox` or `~/.soundbox`, creating it if needed
    ///
    /// # Errors
    /// Returns error if no base directory is known or it cannot be created
    pub fn resolve() -> Result<Self, ConfigError> {
        let data_dir = if let Some(appdata) = std::env::var_os("APPDATA") {
            PathBuf::from(appdata).join(APP_DIR_WINDOWS)
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(APP_DIR_UNIX)
        } else {
            return Err(ConfigError::NoDataDir);
        };
        Self::at(data_dir)
    }

    /// Use an explicit data directory, creating it if needed
    ///
    /// # Errors
    /// Returns error if the directory cannot be created
    pub fn at(data_dir: PathBuf) -> Result<Self, ConfigError> {
        fs::create_dir_all(&data_dir).map_err(|source| ConfigError::Io {
            path: data_dir.clone(),
            source,
        })?;
        Ok(Self { data_dir })
    }

    /// `settings.json`
    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    /// `keybinds.json`
    #[must_use]
    pub fn keybinds_file(&self) -> PathBuf {
        self.data_dir.join("keybinds.json")
    }

    /// Crash log, overwritten on fatal errors
    #[must_use]
    pub fn crash_log_file(&self) -> PathBuf {
        self.data_dir.join("log.txt")
    }

    /// Running tracing log
    #[must_use]
    pub fn trace_log_file(&self) -> PathBuf {
        self.data_dir.join("soundbox.log")
    }
}

/// User settings, persisted as a flat JSON object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Clip folder (empty = unset)
    #[serde(rename = "Directory")]
    pub directory: String,
    /// Monitor output device name
    #[serde(rename = "DefaultOutput")]
    pub default_output: String,
    /// Virtual-mic output device name
    #[serde(rename = "DefaultInput")]
    pub default_input: String,
    /// Monitor volume, 0-100
    #[serde(rename = "VolumeOutput")]
    pub output_volume: u8,
    /// Virtual-mic volume, 0-100
    #[serde(rename = "VolumeInput")]
    pub input_volume: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            directory: String::new(),
            default_output: String::new(),
            default_input: String::new(),
            output_volume: DEFAULT_VOLUME,
            input_volume: DEFAULT_VOLUME,
        }
    }
}

impl Settings {
    /// Configured clip folder, `None` when unset
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        if self.directory.is_empty() {
            None
        } else {
            Some(Path::new(&self.directory))
        }
    }
}

/// Settings document bound to its file; every mutation is written through
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Load settings from `path`, writing defaults if the file is missing
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or created
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = match fs::read_to_string(path) {
            Ok(contents) => {
                let mut settings: Settings =
                    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    })?;
                settings.output_volume = settings.output_volume.min(100);
                settings.input_volume = settings.input_volume.min(100);
                debug!(path = %path.display(), "settings loaded");
                settings
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "settings file missing, writing defaults");
                let settings = Settings::default();
                write_settings(path, &settings)?;
                settings
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            settings,
        })
    }

    /// Current settings
    #[must_use]
    pub const fn get(&self) -> &Settings {
        &self.settings
    }

    /// Apply `f` and persist the result immediately
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub fn update<F>(&mut self, f: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        f(&mut self.settings);
        self.settings.output_volume = self.settings.output_volume.min(100);
        self.settings.input_volume = self.settings.input_volume.min(100);
        write_settings(&self.path, &self.settings)
    }
}

fn write_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn create_test_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "soundbox_config_{tag}_{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = create_test_dir("missing");
        let path = dir.join("settings.json");

        let store = SettingsStore::load(&path).unwrap();

        assert_eq!(store.get(), &Settings::default());
        assert!(path.exists());
        let on_disk: Settings = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, Settings::default());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_json_uses_pascal_case_key_names() {
        let json = serde_json::to_string_pretty(&Settings::default()).unwrap();
        for key in [
            "\"Directory\"",
            "\"DefaultOutput\"",
            "\"DefaultInput\"",
            "\"VolumeOutput\"",
            "\"VolumeInput\"",
        ] {
            assert!(json.contains(key), "missing {key} in {json}");
        }
        // pretty-printed
        assert!(json.contains('\n'));
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let dir = create_test_dir("partial");
        let path = dir.join("settings.json");
        fs::write(&path, r#"{"Directory": "/music", "VolumeInput": 80}"#).unwrap();

        let store = SettingsStore::load(&path).unwrap();

        assert_eq!(store.get().directory, "/music");
        assert_eq!(store.get().input_volume, 80);
        assert_eq!(store.get().output_volume, DEFAULT_VOLUME);
        assert_eq!(store.get().default_output, "");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = create_test_dir("malformed");
        let path = dir.join("settings.json");
        fs::write(&path, "{not json").unwrap();

        let result = SettingsStore::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_update_persists_immediately() {
        let dir = create_test_dir("update");
        let path = dir.join("settings.json");
        let mut store = SettingsStore::load(&path).unwrap();

        store
            .update(|s| {
                s.default_output = "Speakers".to_owned();
                s.output_volume = 73;
            })
            .unwrap();

        let reloaded = SettingsStore::load(&path).unwrap();
        assert_eq!(reloaded.get().default_output, "Speakers");
        assert_eq!(reloaded.get().output_volume, 73);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_update_clamps_volume() {
        let dir = create_test_dir("clamp");
        let path = dir.join("settings.json");
        let mut store = SettingsStore::load(&path).unwrap();

        store.update(|s| s.input_volume = 250).unwrap();
        assert_eq!(store.get().input_volume, 100);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_directory_empty_is_none() {
        let settings = Settings::default();
        assert!(settings.directory().is_none());

        let settings = Settings {
            directory: "/tmp/clips".to_owned(),
            ..Settings::default()
        };
        assert_eq!(settings.directory(), Some(Path::new("/tmp/clips")));
    }

    #[test]
    fn test_paths_layout() {
        let dir = create_test_dir("paths");
        let paths = Paths::at(dir.join("data")).unwrap();

        assert!(paths.data_dir.is_dir());
        assert_eq!(paths.settings_file(), dir.join("data/settings.json"));
        assert_eq!(paths.keybinds_file(), dir.join("data/keybinds.json"));
        assert_eq!(paths.crash_log_file(), dir.join("data/log.txt"));

        let _ = fs::remove_dir_all(&dir);
    }
}
