//! End-to-end editing session against a remote with fixed SHAs.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gitmark_core::{
    AccessToken, ContentStore, EngineConfig, FileKey, FileStatus, GatewayError, GatewayResult,
    MemoryStore, RemoteFile, RemoteGateway, RemoteRepository, RemoteSha, RemoteUser, SyncEngine,
};

/// Remote holding one file whose SHAs follow a fixed script.
struct ScriptedRemote {
    file: Mutex<RemoteFile>,
    next_shas: Mutex<Vec<&'static str>>,
    writes: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedRemote {
    fn new(content: &str, sha: &str, next_shas: Vec<&'static str>) -> Self {
        Self {
            file: Mutex::new(RemoteFile {
                content: content.to_string(),
                sha: sha.to_string(),
            }),
            next_shas: Mutex::new(next_shas),
            writes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RemoteGateway for ScriptedRemote {
    async fn fetch_viewer(&self, _token: Option<&AccessToken>) -> GatewayResult<RemoteUser> {
        Err(GatewayError::Unauthenticated)
    }

    async fn list_repositories(
        &self,
        _token: Option<&AccessToken>,
    ) -> GatewayResult<Vec<RemoteRepository>> {
        Ok(vec![RemoteRepository::new("1", "octo/notes")])
    }

    async fn fetch_file(
        &self,
        _token: Option<&AccessToken>,
        _repo: &str,
        path: &str,
    ) -> GatewayResult<RemoteFile> {
        if path != "README.md" {
            return Err(GatewayError::NotFound(path.to_string()));
        }
        Ok(self.file.lock().unwrap().clone())
    }

    async fn fetch_current_sha(
        &self,
        _token: Option<&AccessToken>,
        _repo: &str,
        _path: &str,
    ) -> GatewayResult<Option<String>> {
        Ok(Some(self.file.lock().unwrap().sha.clone()))
    }

    async fn write_file(
        &self,
        _token: Option<&AccessToken>,
        _repo: &str,
        path: &str,
        content: &str,
        base_sha: Option<&str>,
    ) -> GatewayResult<String> {
        let mut file = self.file.lock().unwrap();
        if base_sha != Some(file.sha.as_str()) {
            return Err(GatewayError::Rejected {
                path: path.to_string(),
                reason: "stale base".to_string(),
            });
        }
        self.writes
            .lock()
            .unwrap()
            .push((content.to_string(), base_sha.map(str::to_string)));
        let sha = self.next_shas.lock().unwrap().remove(0).to_string();
        *file = RemoteFile {
            content: content.to_string(),
            sha: sha.clone(),
        };
        Ok(sha)
    }

    async fn list_markdown_paths(
        &self,
        _token: Option<&AccessToken>,
        _repo: &str,
    ) -> GatewayResult<Vec<String>> {
        Ok(vec!["README.md".to_string()])
    }
}

#[tokio::test(start_paused = true)]
async fn open_edit_autosave_push() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(ScriptedRemote::new("# Hi", "abc", vec!["def"]));
    let engine = SyncEngine::new(
        store.clone(),
        remote.clone(),
        EngineConfig {
            debounce: Duration::from_millis(1000),
        },
    );
    let token = AccessToken::new("token");

    let repos = engine.sync_repositories(Some(&token), 1).await.unwrap();
    let repo = &repos[0];
    let key = FileKey::new(repo.id, "README.md");

    let open = engine
        .open_file(Some(&token), repo, "README.md")
        .await
        .unwrap();
    assert_eq!(open.status, FileStatus::Clean);
    let snapshot = store.get(repo.id, "README.md").await.unwrap().unwrap();
    assert_eq!(snapshot.content, "# Hi");
    assert_eq!(snapshot.sha, RemoteSha::synced("abc"));

    assert_eq!(engine.edit(&key, "# Hi there").unwrap(), FileStatus::Dirty);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(engine.status(&key), Some(FileStatus::Clean));
    let snapshot = store.get(repo.id, "README.md").await.unwrap().unwrap();
    assert_eq!(snapshot.content, "# Hi there");
    assert_eq!(snapshot.sha, RemoteSha::synced("abc"));

    let outcome = engine.push(Some(&token), repo, "README.md").await.unwrap();
    assert_eq!(outcome.status, FileStatus::Clean);
    let snapshot = store.get(repo.id, "README.md").await.unwrap().unwrap();
    assert_eq!(snapshot.content, "# Hi there");
    assert_eq!(snapshot.sha, RemoteSha::synced("def"));

    let writes = remote.writes.lock().unwrap().clone();
    assert_eq!(
        writes,
        vec![("# Hi there".to_string(), Some("abc".to_string()))]
    );
}

