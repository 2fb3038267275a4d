use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::RepositoryId;

/// Persisted SHA value for a file that has never been pushed.
pub const LOCAL_SHA: &str = "local";

/// The remote content SHA a snapshot was last synchronized against.
///
/// Persisted as a plain string; [`LOCAL_SHA`] encodes [`RemoteSha::Unsynced`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RemoteSha {
    /// Never pushed and never fetched from the remote.
    Unsynced,
    /// Matches a blob the remote has seen.
    Synced(String),
}

impl RemoteSha {
    pub fn synced(sha: impl Into<String>) -> Self {
        RemoteSha::Synced(sha.into())
    }

    /// Returns the string stored for this value.
    pub fn as_str(&self) -> &str {
        match self {
            RemoteSha::Unsynced => LOCAL_SHA,
            RemoteSha::Synced(sha) => sha,
        }
    }

    /// Returns the remote SHA, if one is known.
    pub fn known(&self) -> Option<&str> {
        match self {
            RemoteSha::Unsynced => None,
            RemoteSha::Synced(sha) => Some(sha),
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, RemoteSha::Synced(_))
    }
}

impl From<String> for RemoteSha {
    fn from(value: String) -> Self {
        if value == LOCAL_SHA || value.is_empty() {
            RemoteSha::Unsynced
        } else {
            RemoteSha::Synced(value)
        }
    }
}

impl From<&str> for RemoteSha {
    fn from(value: &str) -> Self {
        RemoteSha::from(value.to_string())
    }
}

impl From<RemoteSha> for String {
    fn from(value: RemoteSha) -> Self {
        match value {
            RemoteSha::Unsynced => LOCAL_SHA.to_string(),
            RemoteSha::Synced(sha) => sha,
        }
    }
}

impl fmt::Display for RemoteSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a file snapshot: one per (repository, path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileKey {
    pub repository_id: RepositoryId,
    pub path: String,
}

impl FileKey {
    pub fn new(repository_id: RepositoryId, path: impl Into<String>) -> Self {
        Self {
            repository_id,
            path: path.into(),
        }
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository_id, self.path)
    }
}

/// Locally persisted content of one Markdown file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSnapshot {
    pub repository_id: RepositoryId,
    pub path: String,
    pub content: String,
    pub sha: RemoteSha,
    pub last_modified: DateTime<Utc>,
}

impl FileSnapshot {
    pub fn new(
        repository_id: RepositoryId,
        path: impl Into<String>,
        content: impl Into<String>,
        sha: RemoteSha,
    ) -> Self {
        Self {
            repository_id,
            path: path.into(),
            content: content.into(),
            sha,
            last_modified: Utc::now(),
        }
    }

    pub fn key(&self) -> FileKey {
        FileKey::new(self.repository_id, self.path.clone())
    }
}
