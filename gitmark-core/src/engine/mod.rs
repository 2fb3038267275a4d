//! Reconciliation engine.
//!
//! Tracks one editing session per open file and moves it through
//! `Clean -> Dirty -> Saving -> Clean` as edits are debounced into the content
//! store, and through `Pushing` when the user pushes to the remote.
//!
//! Edits are never blocked: saves and pushes capture the content they write
//! and any edit that lands meanwhile is picked up by the next debounce cycle.
//! Store writes and pushes for the same file are serialized through a per-file
//! I/O lock, so a slow save cannot overwrite the SHA recorded by a push.

mod debounce;
mod error;

pub use debounce::Debouncer;
pub use error::SyncError;

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::gateway::RemoteGateway;
use crate::models::{
    AccessToken, FileKey, FileSnapshot, RemoteSha, RepositoryId, RepositoryRecord, UserId,
};
use crate::store::ContentStore;

pub type SyncResult<T> = Result<T, SyncError>;

/// Debounce delay used when none is configured.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Quiet period after the last edit before it is saved locally.
    pub debounce: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Editing state of an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Content matches the last persisted snapshot.
    Clean,
    /// An edit is waiting for the debounce timer.
    Dirty,
    /// The debounced save is being written to the store.
    Saving,
    /// A push to the remote is in flight.
    Pushing,
}

/// View of an open file returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenFile {
    pub repository_id: RepositoryId,
    pub path: String,
    pub content: String,
    pub sha: RemoteSha,
    pub status: FileStatus,
}

/// Outcome of a successful push.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    pub snapshot: FileSnapshot,
    /// Whether the push created the file remotely.
    pub created: bool,
    pub status: FileStatus,
}

/// Result of a timer-driven save, published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveEvent {
    Saved { key: FileKey, sha: RemoteSha },
    SaveFailed { key: FileKey, error: String },
}

#[derive(Debug)]
struct SessionState {
    content: String,
    /// Content when the file was opened or last pushed.
    baseline: String,
    remote_sha: RemoteSha,
    /// Bumped on every edit.
    revision: u64,
    /// Latest revision known to be in the store.
    saved_revision: u64,
    /// Revision captured by the save currently in flight.
    saving: Option<u64>,
    pushing: bool,
    /// A pushed SHA the store has not recorded yet.
    sha_unsaved: bool,
}

impl SessionState {
    fn status(&self) -> FileStatus {
        if self.pushing {
            FileStatus::Pushing
        } else if self.saving == Some(self.revision) {
            FileStatus::Saving
        } else if self.revision != self.saved_revision || self.sha_unsaved {
            FileStatus::Dirty
        } else {
            FileStatus::Clean
        }
    }
}

#[derive(Debug)]
struct FileSession {
    state: Mutex<SessionState>,
    io: tokio::sync::Mutex<()>,
}

impl FileSession {
    fn from_snapshot(snapshot: &FileSnapshot) -> Self {
        Self {
            state: Mutex::new(SessionState {
                content: snapshot.content.clone(),
                baseline: snapshot.content.clone(),
                remote_sha: snapshot.sha.clone(),
                revision: 0,
                saved_revision: 0,
                saving: None,
                pushing: false,
                sha_unsaved: false,
            }),
            io: tokio::sync::Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn view(&self, key: &FileKey) -> OpenFile {
        let state = self.state();
        OpenFile {
            repository_id: key.repository_id,
            path: key.path.clone(),
            content: state.content.clone(),
            sha: state.remote_sha.clone(),
            status: state.status(),
        }
    }
}

struct Inner {
    store: Arc<dyn ContentStore>,
    gateway: Arc<dyn RemoteGateway>,
    sessions: Mutex<HashMap<FileKey, Arc<FileSession>>>,
    user_locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
    debouncer: Debouncer<FileKey>,
    events: broadcast::Sender<SaveEvent>,
}

/// The reconciliation engine. Cheap to clone; clones share sessions.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("debounce", &self.inner.debouncer.delay())
            .finish()
    }
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn ContentStore>,
        gateway: Arc<dyn RemoteGateway>,
        config: EngineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                gateway,
                sessions: Mutex::new(HashMap::new()),
                user_locks: Mutex::new(HashMap::new()),
                debouncer: Debouncer::new(config.debounce),
                events,
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.inner.store
    }

    pub fn gateway(&self) -> &Arc<dyn RemoteGateway> {
        &self.inner.gateway
    }

    /// Receives the outcome of every timer-driven save.
    pub fn subscribe(&self) -> broadcast::Receiver<SaveEvent> {
        self.inner.events.subscribe()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<FileKey, Arc<FileSession>>> {
        match self.inner.sessions.lock() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn session(&self, key: &FileKey) -> SyncResult<Arc<FileSession>> {
        self.sessions()
            .get(key)
            .cloned()
            .ok_or_else(|| SyncError::NotOpen(key.clone()))
    }

    /// Current state of an open file.
    pub fn status(&self, key: &FileKey) -> Option<FileStatus> {
        self.sessions().get(key).map(|s| s.state().status())
    }

    /// Current view of an open file.
    pub fn view(&self, key: &FileKey) -> Option<OpenFile> {
        self.sessions().get(key).map(|s| s.view(key))
    }

    /// Opens a file for editing.
    ///
    /// Serves the stored snapshot if there is one; otherwise reads the file
    /// through from the remote and seeds the store with it. Opening a file
    /// that already has a session returns that session's view.
    pub async fn open_file(
        &self,
        token: Option<&AccessToken>,
        repository: &RepositoryRecord,
        path: &str,
    ) -> SyncResult<OpenFile> {
        let key = FileKey::new(repository.id, path);
        if let Some(open) = self.view(&key) {
            return Ok(open);
        }

        let snapshot = match self.inner.store.get(repository.id, path).await? {
            Some(snapshot) => snapshot,
            None => {
                let remote = self
                    .inner
                    .gateway
                    .fetch_file(token, &repository.full_name, path)
                    .await?;
                tracing::debug!(
                    repository = %repository.full_name,
                    path,
                    sha = %remote.sha,
                    "read through from remote"
                );
                self.inner
                    .store
                    .put(
                        repository.id,
                        path,
                        &remote.content,
                        &RemoteSha::synced(remote.sha),
                    )
                    .await?
            }
        };

        let session = Arc::new(FileSession::from_snapshot(&snapshot));
        let view = {
            let mut sessions = self.sessions();
            sessions.entry(key.clone()).or_insert(session).view(&key)
        };
        Ok(view)
    }

    /// Records an edit and (re)arms the debounce timer for the file.
    pub fn edit(&self, key: &FileKey, content: impl Into<String>) -> SyncResult<FileStatus> {
        let session = self.session(key)?;
        let (revision, status) = {
            let mut state = session.state();
            state.content = content.into();
            state.revision += 1;
            (state.revision, state.status())
        };
        tracing::debug!(file = %key, revision, "edit");

        let weak = Arc::downgrade(&self.inner);
        let fire_key = key.clone();
        self.inner
            .debouncer
            .arm(key.clone(), move || Self::on_timer(weak, fire_key, revision));
        Ok(status)
    }

    async fn on_timer(inner: Weak<Inner>, key: FileKey, revision: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let engine = SyncEngine { inner };
        let Ok(session) = engine.session(&key) else {
            return;
        };
        // A later edit re-armed the timer; that timer saves instead.
        if session.state().revision != revision {
            return;
        }

        let event = match engine.save_session(&key, &session).await {
            Ok(Some(snapshot)) => SaveEvent::Saved {
                key,
                sha: snapshot.sha,
            },
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(file = %key, error = %e, "auto-save failed, edit kept in memory");
                SaveEvent::SaveFailed {
                    key,
                    error: e.to_string(),
                }
            }
        };
        let _ = engine.inner.events.send(event);
    }

    /// Writes the session's unsaved content to the store, keeping the known
    /// remote SHA. Returns `None` when there was nothing to save.
    async fn save_session(
        &self,
        key: &FileKey,
        session: &FileSession,
    ) -> SyncResult<Option<FileSnapshot>> {
        let _io = session.io.lock().await;

        let (content, sha, revision) = {
            let mut state = session.state();
            if state.revision == state.saved_revision && !state.sha_unsaved {
                return Ok(None);
            }
            state.saving = Some(state.revision);
            (
                state.content.clone(),
                state.remote_sha.clone(),
                state.revision,
            )
        };

        let result = self
            .inner
            .store
            .put(key.repository_id, &key.path, &content, &sha)
            .await;

        let mut state = session.state();
        state.saving = None;
        match result {
            Ok(snapshot) => {
                state.saved_revision = state.saved_revision.max(revision);
                state.sha_unsaved = false;
                tracing::debug!(file = %key, revision, status = ?state.status(), "saved locally");
                Ok(Some(snapshot))
            }
            Err(e) => Err(SyncError::StoreFailure(e)),
        }
    }

    /// Saves a pending edit immediately instead of waiting for the timer.
    pub async fn flush(&self, key: &FileKey) -> SyncResult<Option<FileSnapshot>> {
        let session = self.session(key)?;
        self.inner.debouncer.cancel(key);
        self.save_session(key, &session).await
    }

    /// Ends the editing session, saving any pending edit first. The session is
    /// kept if that save fails.
    pub async fn close_file(&self, key: &FileKey) -> SyncResult<()> {
        self.flush(key).await?;
        self.sessions().remove(key);
        Ok(())
    }

    /// Pushes the file's current content to the remote.
    ///
    /// The remote's current SHA is fetched right before the write and used as
    /// the base, so the write fails with [`SyncError::Rejected`] if the file
    /// moves between the two calls. Content identical to what was opened is
    /// refused with [`SyncError::Unmodified`] before any remote call.
    pub async fn push(
        &self,
        token: Option<&AccessToken>,
        repository: &RepositoryRecord,
        path: &str,
    ) -> SyncResult<PushOutcome> {
        let key = FileKey::new(repository.id, path);
        let session = self.session(&key)?;
        let _io = session.io.lock().await;

        let (content, revision) = {
            let mut state = session.state();
            if state.content == state.baseline {
                return Err(SyncError::Unmodified(path.to_string()));
            }
            state.pushing = true;
            (state.content.clone(), state.revision)
        };
        tracing::info!(repository = %repository.full_name, path, "pushing");

        let remote = self.write_remote(token, repository, path, &content).await;
        let (new_sha, created) = match remote {
            Ok(written) => written,
            Err(e) => {
                session.state().pushing = false;
                tracing::warn!(repository = %repository.full_name, path, error = %e, "push failed");
                return Err(e);
            }
        };

        let sha = RemoteSha::synced(new_sha);
        let stored = self
            .inner
            .store
            .put(repository.id, path, &content, &sha)
            .await;

        let status = {
            let mut state = session.state();
            state.pushing = false;
            state.remote_sha = sha;
            state.baseline = content;
            if stored.is_ok() {
                state.saved_revision = state.saved_revision.max(revision);
                state.sha_unsaved = false;
            } else {
                // The next flush or close records the pushed SHA
                state.sha_unsaved = true;
            }
            state.status()
        };
        if status == FileStatus::Clean {
            self.inner.debouncer.cancel(&key);
        }

        let snapshot = stored?;
        tracing::info!(
            repository = %repository.full_name,
            path,
            sha = %snapshot.sha,
            created,
            "pushed"
        );
        Ok(PushOutcome {
            snapshot,
            created,
            status,
        })
    }

    async fn write_remote(
        &self,
        token: Option<&AccessToken>,
        repository: &RepositoryRecord,
        path: &str,
        content: &str,
    ) -> SyncResult<(String, bool)> {
        let gateway = &self.inner.gateway;
        let base = gateway
            .fetch_current_sha(token, &repository.full_name, path)
            .await?;
        let new_sha = gateway
            .write_file(token, &repository.full_name, path, content, base.as_deref())
            .await?;
        Ok((new_sha, base.is_none()))
    }

    /// Markdown paths in the repository's default branch.
    pub async fn list_markdown_files(
        &self,
        token: Option<&AccessToken>,
        repository: &RepositoryRecord,
    ) -> SyncResult<Vec<String>> {
        Ok(self
            .inner
            .gateway
            .list_markdown_paths(token, &repository.full_name)
            .await?)
    }

    fn user_lock(&self, user_id: UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.inner.user_locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(user_id).or_default().clone()
    }

    /// Reconciles the user's stored repositories with the remote listing.
    ///
    /// Records the remote no longer lists are cascade-deleted, new remote
    /// repositories are created, and the reconciled set is returned in remote
    /// listing order. Runs one at a time per user.
    pub async fn sync_repositories(
        &self,
        token: Option<&AccessToken>,
        user_id: UserId,
    ) -> SyncResult<Vec<RepositoryRecord>> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let remote = self.inner.gateway.list_repositories(token).await?;
        let local = self.inner.store.list_repositories(user_id).await?;

        let listed: HashSet<&str> = remote.iter().map(|r| r.github_id.as_str()).collect();
        for record in local.iter().filter(|r| !listed.contains(r.github_id.as_str())) {
            tracing::info!(repository = %record.full_name, "removing repository no longer on remote");
            self.drop_sessions(record.id);
            self.inner.store.delete_repository_cascade(record.id).await?;
        }

        let mut reconciled = Vec::with_capacity(remote.len());
        for repo in &remote {
            let record = match self
                .inner
                .store
                .get_repository_by_github_id(&repo.github_id, user_id)
                .await?
            {
                Some(existing) => existing,
                None => {
                    tracing::debug!(repository = %repo.full_name, "tracking new repository");
                    self.inner.store.create_repository(repo.for_user(user_id)).await?
                }
            };
            reconciled.push(record);
        }
        Ok(reconciled)
    }

    fn drop_sessions(&self, repository_id: RepositoryId) {
        let dropped: Vec<(FileKey, Arc<FileSession>)> = {
            let mut sessions = self.sessions();
            let keys: Vec<FileKey> = sessions
                .keys()
                .filter(|k| k.repository_id == repository_id)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|k| sessions.remove(&k).map(|s| (k, s)))
                .collect()
        };
        for (key, session) in dropped {
            self.inner.debouncer.cancel(&key);
            if session.state().status() != FileStatus::Clean {
                tracing::warn!(file = %key, "discarding edits to a repository removed remotely");
            }
        }
    }
}
