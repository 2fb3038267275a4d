//! Engine error types.

use crate::gateway::GatewayError;
use crate::models::FileKey;
use crate::store::StoreError;

/// Errors surfaced by the reconciliation engine.
///
/// None of these discard local content: a failed save leaves the file dirty
/// and a failed push leaves the stored snapshot untouched.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The file or repository does not exist remotely or locally.
    #[error("not found: {0}")]
    NotFound(String),
    /// The credential is missing or was refused; re-authenticate and retry.
    #[error("authentication required")]
    Unauthenticated,
    /// The remote changed underneath a push.
    #[error("push rejected for {path}: {reason}")]
    Rejected { path: String, reason: String },
    /// The remote could not be reached.
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    /// Local persistence failed; the edit is kept in memory.
    #[error("local save failed: {0}")]
    StoreFailure(#[from] StoreError),
    /// A push was requested for content identical to what was opened.
    #[error("nothing to push: {0} has not changed since it was opened")]
    Unmodified(String),
    /// The operation needs an open editing session for the file.
    #[error("file is not open: {0}")]
    NotOpen(FileKey),
}

impl From<GatewayError> for SyncError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::NotFound(what) => SyncError::NotFound(what),
            GatewayError::Unauthenticated => SyncError::Unauthenticated,
            GatewayError::Rejected { path, reason } => SyncError::Rejected { path, reason },
            GatewayError::Unavailable(reason) => SyncError::Unavailable(reason),
        }
    }
}

impl SyncError {
    /// Whether the operation failed in a way the caller should report as a
    /// warning and carry on (the local edit is safe).
    pub fn is_save_warning(&self) -> bool {
        matches!(self, SyncError::StoreFailure(_))
    }
}
