//! Remote repository contract.
//!
//! A [`RemoteGateway`] treats the remote as a content store keyed by
//! repository full name and path, with SHA-checked writes. Every call takes the
//! caller's credential; a missing credential fails before any I/O.

mod memory;

pub use memory::{blob_sha, MemoryRemote};

use async_trait::async_trait;

use crate::models::{AccessToken, RemoteRepository, RemoteUser};

/// Errors reported by a remote gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The remote has no such repository or path.
    #[error("not found on remote: {0}")]
    NotFound(String),
    /// No credential was supplied, or the remote refused it.
    #[error("missing or invalid credential")]
    Unauthenticated,
    /// Optimistic-concurrency write conflict.
    #[error("remote rejected write to {path}: {reason}")]
    Rejected { path: String, reason: String },
    /// Transport or remote-side failure.
    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// File content as stored on the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: String,
    pub sha: String,
}

#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// The account the credential belongs to.
    async fn fetch_viewer(&self, token: Option<&AccessToken>) -> GatewayResult<RemoteUser>;

    /// Repositories visible to the credential, in remote listing order.
    async fn list_repositories(
        &self,
        token: Option<&AccessToken>,
    ) -> GatewayResult<Vec<RemoteRepository>>;

    async fn fetch_file(
        &self,
        token: Option<&AccessToken>,
        repo_full_name: &str,
        path: &str,
    ) -> GatewayResult<RemoteFile>;

    /// `None` when the path does not exist remotely yet.
    async fn fetch_current_sha(
        &self,
        token: Option<&AccessToken>,
        repo_full_name: &str,
        path: &str,
    ) -> GatewayResult<Option<String>>;

    /// Writes `content`, returning the new SHA. With `base_sha` the write only
    /// succeeds if it still names the remote's current blob; without it the
    /// write is a creation.
    async fn write_file(
        &self,
        token: Option<&AccessToken>,
        repo_full_name: &str,
        path: &str,
        content: &str,
        base_sha: Option<&str>,
    ) -> GatewayResult<String>;

    /// Markdown paths in the default branch tree.
    async fn list_markdown_paths(
        &self,
        token: Option<&AccessToken>,
        repo_full_name: &str,
    ) -> GatewayResult<Vec<String>>;
}

/// Fails with [`GatewayError::Unauthenticated`] when no credential is present.
pub fn require_token(token: Option<&AccessToken>) -> GatewayResult<&AccessToken> {
    match token {
        Some(t) if !t.as_str().is_empty() => Ok(t),
        _ => Err(GatewayError::Unauthenticated),
    }
}

pub fn is_markdown_path(path: &str) -> bool {
    path.ends_with(".md")
}
