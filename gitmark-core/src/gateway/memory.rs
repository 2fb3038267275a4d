use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{is_markdown_path, require_token, GatewayError, GatewayResult, RemoteFile, RemoteGateway};
use crate::models::{AccessToken, RemoteRepository, RemoteUser};

#[derive(Debug)]
struct HostedRepository {
    meta: RemoteRepository,
    default_branch: Option<String>,
    files: BTreeMap<String, RemoteFile>,
}

#[derive(Debug, Default)]
struct RemoteState {
    users: HashMap<String, RemoteUser>,
    repositories: Vec<HostedRepository>,
    unavailable: bool,
    calls: usize,
    writes: usize,
}

impl RemoteState {
    fn repository(&self, full_name: &str) -> GatewayResult<&HostedRepository> {
        self.repositories
            .iter()
            .find(|r| r.meta.full_name == full_name)
            .ok_or_else(|| GatewayError::NotFound(full_name.to_string()))
    }

    fn repository_mut(&mut self, full_name: &str) -> GatewayResult<&mut HostedRepository> {
        self.repositories
            .iter_mut()
            .find(|r| r.meta.full_name == full_name)
            .ok_or_else(|| GatewayError::NotFound(full_name.to_string()))
    }
}

/// In-process remote with GitHub-like semantics.
///
/// Blob SHAs are content-addressed, so writing the same content twice yields
/// the same SHA. Used for tests and offline runs; drift from other writers and
/// outages can be simulated.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
}

/// Content-addressed blob id in the style of git's object hashing.
pub fn blob_sha(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> GatewayResult<MutexGuard<'_, RemoteState>> {
        self.state
            .lock()
            .map_err(|_| GatewayError::Unavailable("remote state lock poisoned".to_string()))
    }

    /// Opens a call: checks the credential and simulated availability.
    fn begin(&self, token: Option<&AccessToken>) -> GatewayResult<MutexGuard<'_, RemoteState>> {
        let token = require_token(token)?;
        let mut state = self.lock()?;
        state.calls += 1;

        if !state.users.is_empty() && !state.users.contains_key(token.as_str()) {
            return Err(GatewayError::Unauthenticated);
        }
        if state.unavailable {
            return Err(GatewayError::Unavailable("simulated outage".to_string()));
        }
        Ok(state)
    }

    /// Registers a valid credential. Once any user is registered, unknown
    /// tokens are refused.
    pub fn add_user(&self, token: &str, user: RemoteUser) {
        if let Ok(mut state) = self.lock() {
            state.users.insert(token.to_string(), user);
        }
    }

    /// Hosts a repository with a `main` default branch.
    pub fn add_repository(&self, repository: RemoteRepository) {
        if let Ok(mut state) = self.lock() {
            state.repositories.push(HostedRepository {
                meta: repository,
                default_branch: Some("main".to_string()),
                files: BTreeMap::new(),
            });
        }
    }

    pub fn remove_repository(&self, full_name: &str) {
        if let Ok(mut state) = self.lock() {
            state.repositories.retain(|r| r.meta.full_name != full_name);
        }
    }

    pub fn set_default_branch(&self, full_name: &str, branch: Option<&str>) {
        if let Ok(mut state) = self.lock() {
            if let Ok(repo) = state.repository_mut(full_name) {
                repo.default_branch = branch.map(str::to_string);
            }
        }
    }

    /// Writes content directly, as another client would. Returns the new SHA.
    pub fn set_remote_content(&self, full_name: &str, path: &str, content: &str) -> String {
        let sha = blob_sha(content);
        if let Ok(mut state) = self.lock() {
            if let Ok(repo) = state.repository_mut(full_name) {
                repo.files.insert(
                    path.to_string(),
                    RemoteFile {
                        content: content.to_string(),
                        sha: sha.clone(),
                    },
                );
            }
        }
        sha
    }

    pub fn remote_content(&self, full_name: &str, path: &str) -> Option<RemoteFile> {
        let state = self.lock().ok()?;
        let repo = state.repository(full_name).ok()?;
        repo.files.get(path).cloned()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut state) = self.lock() {
            state.unavailable = unavailable;
        }
    }

    /// Number of authenticated calls made so far.
    pub fn call_count(&self) -> usize {
        self.lock().map(|s| s.calls).unwrap_or(0)
    }

    /// Number of successful writes made through the gateway contract.
    pub fn write_count(&self) -> usize {
        self.lock().map(|s| s.writes).unwrap_or(0)
    }
}

#[async_trait]
impl RemoteGateway for MemoryRemote {
    async fn fetch_viewer(&self, token: Option<&AccessToken>) -> GatewayResult<RemoteUser> {
        let state = self.begin(token)?;
        let token = require_token(token)?;
        state
            .users
            .get(token.as_str())
            .cloned()
            .ok_or(GatewayError::Unauthenticated)
    }

    async fn list_repositories(
        &self,
        token: Option<&AccessToken>,
    ) -> GatewayResult<Vec<RemoteRepository>> {
        let state = self.begin(token)?;
        Ok(state.repositories.iter().map(|r| r.meta.clone()).collect())
    }

    async fn fetch_file(
        &self,
        token: Option<&AccessToken>,
        repo_full_name: &str,
        path: &str,
    ) -> GatewayResult<RemoteFile> {
        let state = self.begin(token)?;
        state
            .repository(repo_full_name)?
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("{}/{}", repo_full_name, path)))
    }

    async fn fetch_current_sha(
        &self,
        token: Option<&AccessToken>,
        repo_full_name: &str,
        path: &str,
    ) -> GatewayResult<Option<String>> {
        let state = self.begin(token)?;
        Ok(state
            .repository(repo_full_name)?
            .files
            .get(path)
            .map(|f| f.sha.clone()))
    }

    async fn write_file(
        &self,
        token: Option<&AccessToken>,
        repo_full_name: &str,
        path: &str,
        content: &str,
        base_sha: Option<&str>,
    ) -> GatewayResult<String> {
        let mut state = self.begin(token)?;
        let repo = state.repository_mut(repo_full_name)?;

        let current = repo.files.get(path).map(|f| f.sha.as_str());
        match (base_sha, current) {
            (Some(base), Some(current)) if base == current => {}
            (None, None) => {}
            (Some(base), Some(current)) => {
                return Err(GatewayError::Rejected {
                    path: path.to_string(),
                    reason: format!("base {} does not match {}", base, current),
                })
            }
            (Some(base), None) => {
                return Err(GatewayError::Rejected {
                    path: path.to_string(),
                    reason: format!("base {} given for a file that does not exist", base),
                })
            }
            (None, Some(_)) => {
                return Err(GatewayError::Rejected {
                    path: path.to_string(),
                    reason: "file exists and no base sha was supplied".to_string(),
                })
            }
        }

        let sha = blob_sha(content);
        repo.files.insert(
            path.to_string(),
            RemoteFile {
                content: content.to_string(),
                sha: sha.clone(),
            },
        );
        state.writes += 1;
        Ok(sha)
    }

    async fn list_markdown_paths(
        &self,
        token: Option<&AccessToken>,
        repo_full_name: &str,
    ) -> GatewayResult<Vec<String>> {
        let state = self.begin(token)?;
        let repo = state.repository(repo_full_name)?;
        if repo.default_branch.is_none() {
            return Err(GatewayError::Unavailable(format!(
                "default branch of {} cannot be resolved",
                repo_full_name
            )));
        }
        Ok(repo
            .files
            .keys()
            .filter(|p| is_markdown_path(p))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> AccessToken {
        AccessToken::new("token")
    }

    fn remote() -> MemoryRemote {
        let remote = MemoryRemote::new();
        remote.add_repository(RemoteRepository::new("1", "octo/notes"));
        remote
    }

    #[tokio::test]
    async fn test_write_then_fetch_round_trip() {
        let remote = remote();
        let t = token();

        let sha = remote
            .write_file(Some(&t), "octo/notes", "README.md", "# Hi", None)
            .await
            .unwrap();
        let file = remote
            .fetch_file(Some(&t), "octo/notes", "README.md")
            .await
            .unwrap();

        assert_eq!(file.content, "# Hi");
        assert_eq!(file.sha, sha);
    }

    #[tokio::test]
    async fn test_stale_base_sha_is_rejected() {
        let remote = remote();
        let t = token();
        let first = remote.set_remote_content("octo/notes", "a.md", "one");
        remote.set_remote_content("octo/notes", "a.md", "two");

        let result = remote
            .write_file(Some(&t), "octo/notes", "a.md", "three", Some(&first))
            .await;

        assert!(matches!(result, Err(GatewayError::Rejected { .. })));
        assert_eq!(remote.remote_content("octo/notes", "a.md").unwrap().content, "two");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthenticated() {
        let remote = remote();
        let result = remote.fetch_file(None, "octo/notes", "a.md").await;
        assert_eq!(result, Err(GatewayError::Unauthenticated));
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_token_refused_once_users_registered() {
        let remote = remote();
        remote.add_user(
            "good",
            RemoteUser {
                github_id: "9".to_string(),
                login: "octo".to_string(),
                avatar_url: None,
            },
        );

        let bad = remote.list_repositories(Some(&AccessToken::new("bad"))).await;
        assert_eq!(bad, Err(GatewayError::Unauthenticated));

        let viewer = remote
            .fetch_viewer(Some(&AccessToken::new("good")))
            .await
            .unwrap();
        assert_eq!(viewer.login, "octo");
    }

    #[tokio::test]
    async fn test_list_markdown_paths() {
        let remote = remote();
        let t = token();
        remote.set_remote_content("octo/notes", "README.md", "a");
        remote.set_remote_content("octo/notes", "docs/guide.md", "b");
        remote.set_remote_content("octo/notes", "src/lib.rs", "c");

        let paths = remote
            .list_markdown_paths(Some(&t), "octo/notes")
            .await
            .unwrap();
        assert_eq!(paths, vec!["README.md", "docs/guide.md"]);

        remote.set_default_branch("octo/notes", None);
        let result = remote.list_markdown_paths(Some(&t), "octo/notes").await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_outage() {
        let remote = remote();
        remote.set_unavailable(true);
        let result = remote.list_repositories(Some(&token())).await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }
}
