use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing, appending to `log_path`
///
/// Filtering follows `RUST_LOG`, defaulting to `info`.
///
/// # Errors
/// Returns error if the log file cannot be opened or a subscriber is already set
pub fn init(log_path: &Path) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("failed to create log directory")?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .context("failed to open log file")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file)
        .with_target(false)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    tracing::info!("telemetry initialized: {}", log_path.display());

    Ok(())
}

/// Overwrite `log_path` with a single line describing a fatal error
///
/// # Errors
/// Returns error if the file cannot be written
pub fn write_crash_log(log_path: &Path, error: &anyhow::Error) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("failed to create log directory")?;
    }
    fs::write(log_path, crash_line(error)).context("failed to write crash log")
}

fn crash_line(error: &anyhow::Error) -> String {
    // `{:#}` folds the context chain onto one line; messages may still embed newlines
    let message = format!("{error:#}");
    let message = message.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("Application error: {message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "soundbox_telemetry_{tag}_{}/log.txt",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[test]
    fn test_crash_line_is_single_line_with_context() {
        let err = anyhow::anyhow!("hook denied").context("failed to start hotkey listener");
        let line = crash_line(&err);
        assert_eq!(
            line,
            "Application error: failed to start hotkey listener: hook denied"
        );
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_crash_line_collapses_embedded_newlines() {
        let err = anyhow::anyhow!("permission denied\n\nEnable in: Settings\n")
            .context("failed to start hotkey listener");

        let line = crash_line(&err);

        assert_eq!(
            line,
            "Application error: failed to start hotkey listener: permission denied Enable in: Settings"
        );
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_crash_log_overwrites() {
        let path = temp_path("overwrite");

        write_crash_log(&path, &anyhow::anyhow!("first")).unwrap();
        write_crash_log(&path, &anyhow::anyhow!("second")).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Application error: second"
        );
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    #[ignore] // Requires global tracing subscriber initialization
    fn test_init_creates_log_file() {
        let path = temp_path("init");
        init(&path).unwrap();
        assert!(path.exists());
    }
}
