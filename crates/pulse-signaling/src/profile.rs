//! Caller profile lookup.
//!
//! A `call-request` forwarded to the callee carries the caller's display
//! name and avatar. Profiles live in an external user store; this module
//! defines the seam ([`ProfileLookup`]) and two backends:
//!
//! - [`StaticProfileDirectory`]: in-memory map, optionally loaded from a JSON file
//! - [`HttpProfileLookup`]: `GET {base}/users/{id}` against the chat backend

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use pulse_core::ids::Identity;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Display identity of a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Human-readable name.
    pub display_name: String,
    /// Avatar URL or storage key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

impl Profile {
    /// Profile with a name and no avatar.
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            avatar_ref: None,
        }
    }
}

/// Profile lookup failure.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The user store has no such identity.
    #[error("no profile for {0}")]
    NotFound(Identity),
    /// The user store could not be reached or answered unexpectedly.
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

/// Resolves an identity to its display profile.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    /// Look up `identity`.
    async fn lookup(&self, identity: &Identity) -> Result<Profile, ProfileError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Static directory
// ─────────────────────────────────────────────────────────────────────────────

/// Failure loading a profile directory file.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// File could not be read.
    #[error("failed to read profile directory: {0}")]
    Io(#[from] std::io::Error),
    /// File is not a JSON array of profile entries.
    #[error("failed to parse profile directory: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryEntry {
    id: Identity,
    display_name: String,
    #[serde(default)]
    avatar_ref: Option<String>,
}

/// In-memory profile store.
///
/// With identity fallback enabled, unknown identities resolve to a profile
/// named after the identity itself instead of [`ProfileError::NotFound`].
#[derive(Debug, Default)]
pub struct StaticProfileDirectory {
    profiles: RwLock<HashMap<Identity, Profile>>,
    identity_fallback: bool,
}

impl StaticProfileDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve unknown identities to a name-only profile.
    #[must_use]
    pub fn with_identity_fallback(mut self) -> Self {
        self.identity_fallback = true;
        self
    }

    /// Parse `[{"id", "displayName", "avatarRef"}]`.
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        let entries: Vec<DirectoryEntry> = serde_json::from_str(json)?;
        let profiles = entries
            .into_iter()
            .map(|e| {
                (
                    e.id,
                    Profile {
                        display_name: e.display_name,
                        avatar_ref: e.avatar_ref,
                    },
                )
            })
            .collect();
        Ok(Self {
            profiles: RwLock::new(profiles),
            identity_fallback: false,
        })
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let content = std::fs::read_to_string(path)?;
        let directory = Self::from_json(&content)?;
        debug!(?path, profiles = directory.len(), "loaded profile directory");
        Ok(directory)
    }

    /// Add or replace a profile.
    pub fn insert(&self, identity: Identity, profile: Profile) {
        let _ = self.profiles.write().insert(identity, profile);
    }

    /// Number of stored profiles.
    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    /// Whether the directory holds no profiles.
    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

#[async_trait]
impl ProfileLookup for StaticProfileDirectory {
    async fn lookup(&self, identity: &Identity) -> Result<Profile, ProfileError> {
        if let Some(profile) = self.profiles.read().get(identity) {
            return Ok(profile.clone());
        }
        if self.identity_fallback {
            return Ok(Profile::named(identity.as_str()));
        }
        Err(ProfileError::NotFound(identity.clone()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP backend
// ─────────────────────────────────────────────────────────────────────────────

/// User record as served by the chat backend.
///
/// Accepts both `displayName`/`avatarRef` and the backend's native
/// `fullName`/`profilePic` field names.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    #[serde(alias = "fullName")]
    display_name: String,
    #[serde(default, alias = "profilePic")]
    avatar_ref: Option<String>,
}

/// Fetches profiles from `GET {base}/users/{id}`.
pub struct HttpProfileLookup {
    client: reqwest::Client,
    base: Url,
}

impl HttpProfileLookup {
    /// Client with a per-request timeout.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, ProfileError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProfileError::Unavailable(e.to_string()))?;
        Ok(Self { client, base })
    }

    /// Use an existing client.
    pub fn with_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    fn user_url(&self, identity: &Identity) -> Result<Url, ProfileError> {
        let mut url = self.base.clone();
        let _ = url
            .path_segments_mut()
            .map_err(|()| ProfileError::Unavailable(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(["users", identity.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl ProfileLookup for HttpProfileLookup {
    async fn lookup(&self, identity: &Identity) -> Result<Profile, ProfileError> {
        let url = self.user_url(identity)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProfileError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(ProfileError::NotFound(identity.clone())),
            status if !status.is_success() => {
                return Err(ProfileError::Unavailable(format!("user store returned {status}")));
            }
            _ => {}
        }

        let record: UserRecord = response
            .json()
            .await
            .map_err(|e| ProfileError::Unavailable(e.to_string()))?;
        Ok(Profile {
            display_name: record.display_name,
            avatar_ref: record.avatar_ref.filter(|a| !a.is_empty()),
        })
    }
}
