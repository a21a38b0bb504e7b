//! JSON shapes exchanged with the file server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use filedeck_common::EntryId;

/// Response envelope used by every JSON endpoint.
///
/// Error responses carry only `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
}

/// Server capability flags returned by `GET /api/config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server has credentials configured and requires login for writes.
    #[serde(rename = "login")]
    pub login_required: bool,
    /// Guests may browse read-only without a token.
    #[serde(rename = "anonymous")]
    pub anonymous_allowed: bool,
}

/// A file or directory as listed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: EntryId,
    pub name: String,
    #[serde(default)]
    pub dir: bool,
    #[serde(default)]
    pub size: u64,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub parent: Option<EntryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
}

/// A directory together with its children, as returned by
/// `GET /api/directories[/:id]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDirectory {
    #[serde(flatten)]
    pub entry: RemoteEntry,
    /// Missing or `null` when the directory is empty.
    #[serde(default)]
    pub files: Option<Vec<RemoteEntry>>,
}

/// Body of `POST /api/user/login`.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Body of `POST /api/directories/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDirectory {
    pub parent: EntryId,
    pub name: String,
}

/// Body of the rename endpoints for files and directories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub parent: Option<EntryId>,
}

/// The server encodes "no parent" as an omitted field or an empty string.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<EntryId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(s) if !s.is_empty() => Some(EntryId::new(s).map_err(serde::de::Error::custom)?),
        _ => None,
    })
}
