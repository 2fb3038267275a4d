use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ContentStore, StoreError, StoreResult};
use crate::models::{
    FileKey, FileSnapshot, NewRepository, NewUser, RemoteSha, RepositoryId, RepositoryRecord,
    User, UserId,
};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    repositories: BTreeMap<RepositoryId, RepositoryRecord>,
    files: BTreeMap<FileKey, FileSnapshot>,
    next_user_id: UserId,
    next_repository_id: RepositoryId,
}

impl Tables {
    fn file_range(repository_id: RepositoryId) -> std::ops::Range<FileKey> {
        FileKey::new(repository_id, "")..FileKey::new(repository_id + 1, "")
    }
}

/// In-memory content store.
///
/// Snapshots live in an ordered map keyed by (repository, path). All tables
/// sit behind one lock, so a cascade delete is atomic for readers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn get_user_by_github_id(&self, github_id: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.github_id == github_id)
            .cloned())
    }

    async fn get_user_by_token(&self, access_token: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.access_token == access_token)
            .cloned())
    }

    async fn upsert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.write()?;

        if let Some(existing) = tables
            .users
            .values_mut()
            .find(|u| u.github_id == user.github_id)
        {
            existing.username = user.username;
            existing.access_token = user.access_token;
            existing.avatar_url = user.avatar_url;
            return Ok(existing.clone());
        }

        tables.next_user_id += 1;
        let created = User {
            id: tables.next_user_id,
            github_id: user.github_id,
            username: user.username,
            access_token: user.access_token,
            avatar_url: user.avatar_url,
            created_at: Utc::now(),
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_repositories(&self, user_id: UserId) -> StoreResult<Vec<RepositoryRecord>> {
        Ok(self
            .read()?
            .repositories
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_repository(&self, id: RepositoryId) -> StoreResult<Option<RepositoryRecord>> {
        Ok(self.read()?.repositories.get(&id).cloned())
    }

    async fn get_repository_by_github_id(
        &self,
        github_id: &str,
        user_id: UserId,
    ) -> StoreResult<Option<RepositoryRecord>> {
        Ok(self
            .read()?
            .repositories
            .values()
            .find(|r| r.github_id == github_id && r.user_id == user_id)
            .cloned())
    }

    async fn create_repository(&self, repository: NewRepository) -> StoreResult<RepositoryRecord> {
        let mut tables = self.write()?;

        if let Some(existing) = tables
            .repositories
            .values()
            .find(|r| r.github_id == repository.github_id && r.user_id == repository.user_id)
        {
            return Ok(existing.clone());
        }

        tables.next_repository_id += 1;
        let record = RepositoryRecord {
            id: tables.next_repository_id,
            github_id: repository.github_id,
            name: repository.name,
            full_name: repository.full_name,
            owner: repository.owner,
            is_private: repository.is_private,
            user_id: repository.user_id,
        };
        tables.repositories.insert(record.id, record.clone());
        Ok(record)
    }

    async fn delete_repository_cascade(&self, id: RepositoryId) -> StoreResult<()> {
        let mut tables = self.write()?;
        tables.repositories.remove(&id);

        let keys: Vec<FileKey> = tables
            .files
            .range(Tables::file_range(id))
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            tables.files.remove(&key);
        }
        Ok(())
    }

    async fn get(
        &self,
        repository_id: RepositoryId,
        path: &str,
    ) -> StoreResult<Option<FileSnapshot>> {
        Ok(self
            .read()?
            .files
            .get(&FileKey::new(repository_id, path))
            .cloned())
    }

    async fn put(
        &self,
        repository_id: RepositoryId,
        path: &str,
        content: &str,
        sha: &RemoteSha,
    ) -> StoreResult<FileSnapshot> {
        let mut tables = self.write()?;

        if !tables.repositories.contains_key(&repository_id) {
            return Err(StoreError::NotFound(format!("repository {}", repository_id)));
        }

        let snapshot = tables
            .files
            .entry(FileKey::new(repository_id, path))
            .and_modify(|existing| {
                existing.content = content.to_string();
                existing.sha = sha.clone();
                existing.last_modified = Utc::now();
            })
            .or_insert_with(|| FileSnapshot::new(repository_id, path, content, sha.clone()));
        Ok(snapshot.clone())
    }

    async fn delete(&self, repository_id: RepositoryId, path: &str) -> StoreResult<()> {
        self.write()?
            .files
            .remove(&FileKey::new(repository_id, path));
        Ok(())
    }

    async fn list_by_repository(
        &self,
        repository_id: RepositoryId,
    ) -> StoreResult<Vec<FileSnapshot>> {
        Ok(self
            .read()?
            .files
            .range(Tables::file_range(repository_id))
            .map(|(_, v)| v.clone())
            .collect())
    }
}
