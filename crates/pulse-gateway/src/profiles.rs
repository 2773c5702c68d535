//! Profile backend selection.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use pulse_settings::{ProfileSettings, ProfileSource};
use pulse_signaling::{HttpProfileLookup, ProfileLookup, StaticProfileDirectory};
use reqwest::Url;
use tracing::info;

/// Build the lookup configured by `settings`.
///
/// The static backend without a directory file shows each caller by their
/// identity.
pub fn build_profile_lookup(settings: &ProfileSettings, timeout: Duration) -> Result<Arc<dyn ProfileLookup>> {
    match settings.source {
        ProfileSource::Static => {
            let directory = match settings.directory_path.as_deref() {
                Some(path) => {
                    let directory = StaticProfileDirectory::load(Path::new(path))
                        .with_context(|| format!("Failed to load profile directory: {path}"))?;
                    info!(path, profiles = directory.len(), "static profile directory loaded");
                    directory
                }
                None => {
                    info!("no profile directory configured, callers shown by identity");
                    StaticProfileDirectory::new().with_identity_fallback()
                }
            };
            Ok(Arc::new(directory))
        }
        ProfileSource::Http => {
            let Some(base) = settings.base_url.as_deref() else {
                bail!("profiles.baseUrl is required for the http profile source");
            };
            let url = Url::parse(base).with_context(|| format!("Invalid profile base URL: {base}"))?;
            let lookup = HttpProfileLookup::new(url, timeout).context("Failed to build profile HTTP client")?;
            info!(base, "http profile lookup enabled");
            Ok(Arc::new(lookup))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::ids::Identity;

    #[tokio::test]
    async fn static_without_file_falls_back_to_identity() {
        let lookup = build_profile_lookup(&ProfileSettings::default(), Duration::from_secs(1)).unwrap();
        let profile = lookup.lookup(&Identity::from("u42")).await.unwrap();
        assert_eq!(profile.display_name, "u42");
    }

    #[tokio::test]
    async fn static_loads_directory_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, r#"[{"id": "u1", "displayName": "Ada"}]"#).unwrap();
        let settings = ProfileSettings {
            directory_path: Some(path.to_string_lossy().into_owned()),
            ..ProfileSettings::default()
        };
        let lookup = build_profile_lookup(&settings, Duration::from_secs(1)).unwrap();
        assert_eq!(lookup.lookup(&Identity::from("u1")).await.unwrap().display_name, "Ada");
    }

    #[test]
    fn missing_directory_file_is_an_error() {
        let settings = ProfileSettings {
            directory_path: Some("/nonexistent/pulse/profiles.json".into()),
            ..ProfileSettings::default()
        };
        assert!(build_profile_lookup(&settings, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn http_requires_valid_base_url() {
        let mut settings = ProfileSettings {
            source: ProfileSource::Http,
            ..ProfileSettings::default()
        };
        assert!(build_profile_lookup(&settings, Duration::from_secs(1)).is_err());

        settings.base_url = Some("not a url".into());
        assert!(build_profile_lookup(&settings, Duration::from_secs(1)).is_err());

        settings.base_url = Some("http://127.0.0.1:9/api".into());
        assert!(build_profile_lookup(&settings, Duration::from_secs(1)).is_ok());
    }
}
