use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Playable extensions, in lookup priority order
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["mp3", "wav", "ogg", "flac"];

/// Single entry returned when the folder could not be scanned
pub const NO_FILES_SENTINEL: &str = "NO MUSIC WAS LOADED";

/// Whether a scan result is the "scan failed" sentinel rather than real clips
#[must_use]
pub fn is_sentinel(clips: &[String]) -> bool {
    clips.len() == 1 && clips[0] == NO_FILES_SENTINEL
}

/// List clips in `dir`, newest first
///
/// An unset or missing directory yields an empty list. Any I/O failure
/// while scanning yields [`NO_FILES_SENTINEL`] instead of an error.
#[must_use]
pub fn scan(dir: Option<&Path>) -> Vec<String> {
    let Some(dir) = dir.filter(|d| !d.as_os_str().is_empty() && d.exists()) else {
        debug!("clip directory unset or missing");
        return Vec::new();
    };

    match try_scan(dir) {
        Ok(clips) => {
            debug!(dir = %dir.display(), count = clips.len(), "clip directory scanned");
            clips
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "clip directory scan failed");
            vec![NO_FILES_SENTINEL.to_owned()]
        }
    }
}

/// Scan `dir` non-recursively for supported files
///
/// Base names are de-duplicated across extensions. Each clip is keyed by
/// the newest modification time among its files; ties sort by name.
///
/// # Errors
/// Returns error if the directory or any entry's metadata cannot be read
pub fn try_scan(dir: &Path) -> io::Result<Vec<String>> {
    let mut newest: HashMap<String, SystemTime> = HashMap::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(stem) = clip_name(&path) else {
            continue;
        };
        // follows symlinks, unlike DirEntry::metadata
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "dangling link skipped");
                continue;
            }
            Err(e) => return Err(e),
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified()?;

        newest
            .entry(stem.to_owned())
            .and_modify(|t| *t = (*t).max(modified))
            .or_insert(modified);
    }

    let mut clips: Vec<(String, SystemTime)> = newest.into_iter().collect();
    clips.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(clips.into_iter().map(|(name, _)| name).collect())
}

/// Base name of `path` if it carries a supported extension
fn clip_name(path: &Path) -> Option<&str> {
    let ext = path.extension()?.to_str()?;
    if !SUPPORTED_EXTENSIONS.contains(&ext) {
        return None;
    }
    path.file_stem()?.to_str().filter(|s| !s.is_empty())
}

/// Find the file backing clip `name`, probing extensions in priority order
#[must_use]
pub fn resolve(dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    SUPPORTED_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{name}.{ext}")))
        .find(|p| p.is_file())
}

/// Case-insensitive substring filter used by the search box
#[must_use]
pub fn filter(clips: &[String], query: &str) -> Vec<String> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return clips.to_vec();
    }
    clips
        .iter()
        .filter(|c| c.to_lowercase().contains(&query))
        .cloned()
        .collect()
}
