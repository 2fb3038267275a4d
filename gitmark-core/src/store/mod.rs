//! Local persistence contract for users, repositories and file snapshots.
//!
//! The reconciliation engine only talks to a [`ContentStore`]; the backing
//! medium is chosen by whoever constructs the engine. [`MemoryStore`] keeps
//! everything in process memory; the application ships a SQLite-backed store.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::models::{
    FileSnapshot, NewRepository, NewUser, RemoteSha, RepositoryId, RepositoryRecord, User, UserId,
};

/// Errors that can occur in a content store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record the operation depends on does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The backing medium failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value persistence for users, repository records and file snapshots.
///
/// Implementations must keep at most one snapshot per (repository, path) and
/// serialize writes to the same key.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn get_user_by_github_id(&self, github_id: &str) -> StoreResult<Option<User>>;

    async fn get_user_by_token(&self, access_token: &str) -> StoreResult<Option<User>>;

    /// Creates the user, or refreshes username, token and avatar of the
    /// existing user with the same GitHub id.
    async fn upsert_user(&self, user: NewUser) -> StoreResult<User>;

    async fn list_repositories(&self, user_id: UserId) -> StoreResult<Vec<RepositoryRecord>>;

    async fn get_repository(&self, id: RepositoryId) -> StoreResult<Option<RepositoryRecord>>;

    async fn get_repository_by_github_id(
        &self,
        github_id: &str,
        user_id: UserId,
    ) -> StoreResult<Option<RepositoryRecord>>;

    /// Creates a repository record. Returns the existing record when the
    /// (github id, user) pair is already stored.
    async fn create_repository(&self, repository: NewRepository) -> StoreResult<RepositoryRecord>;

    /// Removes the repository and every snapshot keyed to it. Readers never
    /// observe a partially deleted repository. No-op for unknown ids.
    async fn delete_repository_cascade(&self, id: RepositoryId) -> StoreResult<()>;

    async fn get(&self, repository_id: RepositoryId, path: &str)
        -> StoreResult<Option<FileSnapshot>>;

    /// Creates or overwrites the snapshot for (repository, path), refreshing
    /// `last_modified`.
    async fn put(
        &self,
        repository_id: RepositoryId,
        path: &str,
        content: &str,
        sha: &RemoteSha,
    ) -> StoreResult<FileSnapshot>;

    /// Idempotent on absent keys.
    async fn delete(&self, repository_id: RepositoryId, path: &str) -> StoreResult<()>;

    async fn list_by_repository(&self, repository_id: RepositoryId)
        -> StoreResult<Vec<FileSnapshot>>;
}
