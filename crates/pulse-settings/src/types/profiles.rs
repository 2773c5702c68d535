//! Caller profile lookup backend selection.

use serde::{Deserialize, Serialize};

/// Where caller display profiles come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileSource {
    /// In-memory directory, optionally loaded from a JSON file.
    #[default]
    Static,
    /// The chat backend's user API.
    Http,
}

/// Profile lookup settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileSettings {
    /// Backend to use.
    pub source: ProfileSource,
    /// JSON file of `[{"id", "displayName", "avatarRef"}]` for the static backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory_path: Option<String>,
    /// Base URL of the user API for the HTTP backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}
