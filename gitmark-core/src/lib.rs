//! gitmark core library
//!
//! Local drafts of Markdown files from GitHub repositories, and the rules for
//! reconciling them with the remote: read-through on open, debounced local
//! saves, SHA-checked pushes and repository listing reconciliation.

pub mod engine;
pub mod gateway;
pub mod models;
pub mod store;

pub use engine::{
    EngineConfig, FileStatus, OpenFile, PushOutcome, SaveEvent, SyncEngine, SyncError, SyncResult,
};
pub use gateway::{GatewayError, GatewayResult, MemoryRemote, RemoteFile, RemoteGateway};
pub use models::{
    AccessToken, FileKey, FileSnapshot, NewRepository, NewUser, RemoteRepository, RemoteSha,
    RemoteUser, RepositoryId, RepositoryRecord, User, UserId, LOCAL_SHA,
};
pub use store::{ContentStore, MemoryStore, StoreError, StoreResult};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
