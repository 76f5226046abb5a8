use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

const RELEASES_URL: &str = "https://api.github.com/repos/BanditRN/Soundbox/releases";

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Latest published release tag if it differs from `current_version`
///
/// Network or parse failures are swallowed: the check is advisory.
#[must_use]
pub fn check_for_update(current_version: &str) -> Option<String> {
    match fetch_releases() {
        Ok(body) => newer_release(&body, current_version),
        Err(e) => {
            tracing::debug!(error = %e, "update check failed");
            None
        }
    }
}

fn fetch_releases() -> Result<String> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("soundbox/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(5))
        .build()
        .context("failed to build HTTP client")?;

    let response = client
        .get(RELEASES_URL)
        .send()
        .with_context(|| format!("failed to fetch {RELEASES_URL}"))?;

    if !response.status().is_success() {
        anyhow::bail!("release check failed with status {}", response.status());
    }

    response.text().context("failed to read release list")
}

/// Compare the first release in a GitHub releases body against `current_version`
fn newer_release(body: &str, current_version: &str) -> Option<String> {
    let releases: Vec<Release> = serde_json::from_str(body)
        .map_err(|e| tracing::debug!(error = %e, "unexpected release list format"))
        .ok()?;
    let latest = releases.into_iter().next()?.tag_name;

    if latest == current_version {
        tracing::debug!(version = current_version, "up to date");
        None
    } else {
        tracing::info!(latest = %latest, current = current_version, "update available");
        Some(latest)
    }
}
