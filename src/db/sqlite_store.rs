use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use gitmark_core::{
    ContentStore, FileSnapshot, NewRepository, NewUser, RemoteSha, RepositoryId,
    RepositoryRecord, StoreError, StoreResult, User, UserId,
};

/// Content store persisted in SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

// Row types for database queries
#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    github_id: String,
    username: String,
    access_token: String,
    avatar_url: Option<String>,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct RepositoryRow {
    id: i64,
    github_id: String,
    name: String,
    full_name: String,
    owner: String,
    is_private: bool,
    user_id: i64,
}

#[derive(sqlx::FromRow)]
struct FileRow {
    repository_id: i64,
    path: String,
    content: String,
    sha: String,
    last_modified: String,
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            github_id: row.github_id,
            username: row.username,
            access_token: row.access_token,
            avatar_url: row.avatar_url,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

impl From<RepositoryRow> for RepositoryRecord {
    fn from(row: RepositoryRow) -> Self {
        RepositoryRecord {
            id: row.id,
            github_id: row.github_id,
            name: row.name,
            full_name: row.full_name,
            owner: row.owner,
            is_private: row.is_private,
            user_id: row.user_id,
        }
    }
}

impl From<FileRow> for FileSnapshot {
    fn from(row: FileRow) -> Self {
        FileSnapshot {
            repository_id: row.repository_id,
            path: row.path,
            content: row.content,
            sha: RemoteSha::from(row.sha),
            last_modified: parse_timestamp(&row.last_modified),
        }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

const USER_COLUMNS: &str = "id, github_id, username, access_token, avatar_url, created_at";
const REPOSITORY_COLUMNS: &str = "id, github_id, name, full_name, owner, is_private, user_id";
const FILE_COLUMNS: &str = "repository_id, path, content, sha, last_modified";

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_user(&self, column: &str, value: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE {} = ?",
            USER_COLUMNS, column
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(User::from))
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        Ok(row.map(User::from))
    }

    async fn get_user_by_github_id(&self, github_id: &str) -> StoreResult<Option<User>> {
        self.fetch_user("github_id", github_id).await
    }

    async fn get_user_by_token(&self, access_token: &str) -> StoreResult<Option<User>> {
        self.fetch_user("access_token", access_token).await
    }

    async fn upsert_user(&self, user: NewUser) -> StoreResult<User> {
        sqlx::query(
            r#"
            INSERT INTO users (github_id, username, access_token, avatar_url, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(github_id) DO UPDATE SET
                username = excluded.username,
                access_token = excluded.access_token,
                avatar_url = excluded.avatar_url
            "#,
        )
        .bind(&user.github_id)
        .bind(&user.username)
        .bind(&user.access_token)
        .bind(&user.avatar_url)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        self.get_user_by_github_id(&user.github_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user.github_id)))
    }

    async fn list_repositories(&self, user_id: UserId) -> StoreResult<Vec<RepositoryRecord>> {
        let rows: Vec<RepositoryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM repositories WHERE user_id = ? ORDER BY id",
            REPOSITORY_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(RepositoryRecord::from).collect())
    }

    async fn get_repository(&self, id: RepositoryId) -> StoreResult<Option<RepositoryRecord>> {
        let row: Option<RepositoryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM repositories WHERE id = ?",
            REPOSITORY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(RepositoryRecord::from))
    }

    async fn get_repository_by_github_id(
        &self,
        github_id: &str,
        user_id: UserId,
    ) -> StoreResult<Option<RepositoryRecord>> {
        let row: Option<RepositoryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM repositories WHERE github_id = ? AND user_id = ?",
            REPOSITORY_COLUMNS
        ))
        .bind(github_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(RepositoryRecord::from))
    }

    async fn create_repository(&self, repository: NewRepository) -> StoreResult<RepositoryRecord> {
        sqlx::query(
            r#"
            INSERT INTO repositories (github_id, name, full_name, owner, is_private, user_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(github_id, user_id) DO NOTHING
            "#,
        )
        .bind(&repository.github_id)
        .bind(&repository.name)
        .bind(&repository.full_name)
        .bind(&repository.owner)
        .bind(repository.is_private)
        .bind(repository.user_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        self.get_repository_by_github_id(&repository.github_id, repository.user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("repository {}", repository.full_name)))
    }

    async fn delete_repository_cascade(&self, id: RepositoryId) -> StoreResult<()> {
        // ON DELETE CASCADE removes the repository's files in the same statement
        sqlx::query("DELETE FROM repositories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get(
        &self,
        repository_id: RepositoryId,
        path: &str,
    ) -> StoreResult<Option<FileSnapshot>> {
        let row: Option<FileRow> = sqlx::query_as(&format!(
            "SELECT {} FROM markdown_files WHERE repository_id = ? AND path = ?",
            FILE_COLUMNS
        ))
        .bind(repository_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(FileSnapshot::from))
    }

    async fn put(
        &self,
        repository_id: RepositoryId,
        path: &str,
        content: &str,
        sha: &RemoteSha,
    ) -> StoreResult<FileSnapshot> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM repositories WHERE id = ?")
            .bind(repository_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("repository {}", repository_id)));
        }

        let row: FileRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO markdown_files (repository_id, path, content, sha, last_modified)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(repository_id, path) DO UPDATE SET
                content = excluded.content,
                sha = excluded.sha,
                last_modified = excluded.last_modified
            RETURNING {}
            "#,
            FILE_COLUMNS
        ))
        .bind(repository_id)
        .bind(path)
        .bind(content)
        .bind(sha.as_str())
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(row.into())
    }

    async fn delete(&self, repository_id: RepositoryId, path: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM markdown_files WHERE repository_id = ? AND path = ?")
            .bind(repository_id)
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_by_repository(
        &self,
        repository_id: RepositoryId,
    ) -> StoreResult<Vec<FileSnapshot>> {
        let rows: Vec<FileRow> = sqlx::query_as(&format!(
            "SELECT {} FROM markdown_files WHERE repository_id = ? ORDER BY path",
            FILE_COLUMNS
        ))
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(FileSnapshot::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use gitmark_core::RemoteRepository;
    use tempfile::TempDir;

    struct TestContext {
        store: SqliteStore,
        _temp_dir: TempDir, // Keep alive for duration of test
    }

    async fn setup_store() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(&db_path).await.unwrap();
        TestContext {
            store: SqliteStore::new(pool),
            _temp_dir: temp_dir,
        }
    }

    async fn create_repo(store: &SqliteStore, github_id: &str, name: &str) -> RepositoryRecord {
        store
            .create_repository(RemoteRepository::new(github_id, name).for_user(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get_snapshot() {
        let ctx = setup_store().await;
        let store = &ctx.store;
        let repo = create_repo(store, "1", "octo/notes").await;

        let created = store
            .put(repo.id, "README.md", "# Hi", &RemoteSha::synced("abc"))
            .await
            .unwrap();
        assert_eq!(created.content, "# Hi");
        assert_eq!(created.sha, RemoteSha::synced("abc"));

        let fetched = store.get(repo.id, "README.md").await.unwrap().unwrap();
        assert_eq!(fetched.content, "# Hi");
        assert_eq!(fetched.sha, RemoteSha::synced("abc"));
    }

    #[tokio::test]
    async fn test_put_overwrites_and_keeps_one_row() {
        let ctx = setup_store().await;
        let store = &ctx.store;
        let repo = create_repo(store, "1", "octo/notes").await;

        store
            .put(repo.id, "README.md", "# Hi", &RemoteSha::synced("abc"))
            .await
            .unwrap();
        let updated = store
            .put(repo.id, "README.md", "# Hi there", &RemoteSha::Unsynced)
            .await
            .unwrap();
        assert_eq!(updated.content, "# Hi there");
        assert_eq!(updated.sha, RemoteSha::Unsynced);

        // The sentinel is what lands on disk
        let (sha,): (String,) =
            sqlx::query_as("SELECT sha FROM markdown_files WHERE repository_id = ?")
                .bind(repo.id)
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(sha, "local");

        assert_eq!(store.list_by_repository(repo.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_identical_twice() {
        let ctx = setup_store().await;
        let store = &ctx.store;
        let repo = create_repo(store, "1", "octo/notes").await;
        let sha = RemoteSha::synced("abc");

        let first = store.put(repo.id, "a.md", "x", &sha).await.unwrap();
        let second = store.put(repo.id, "a.md", "x", &sha).await.unwrap();
        assert_eq!(first.content, second.content);
        assert_eq!(first.sha, second.sha);
        assert!(second.last_modified >= first.last_modified);
    }

    #[tokio::test]
    async fn test_put_unknown_repository() {
        let ctx = setup_store().await;
        let result = ctx
            .store
            .put(42, "a.md", "x", &RemoteSha::Unsynced)
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_file_is_idempotent() {
        let ctx = setup_store().await;
        let store = &ctx.store;
        let repo = create_repo(store, "1", "octo/notes").await;
        store
            .put(repo.id, "a.md", "x", &RemoteSha::Unsynced)
            .await
            .unwrap();

        store.delete(repo.id, "a.md").await.unwrap();
        store.delete(repo.id, "a.md").await.unwrap();
        assert!(store.get(repo.id, "a.md").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_repository_cascades() {
        let ctx = setup_store().await;
        let store = &ctx.store;
        let repo = create_repo(store, "1", "octo/notes").await;
        let other = create_repo(store, "2", "octo/other").await;

        store
            .put(repo.id, "a.md", "x", &RemoteSha::Unsynced)
            .await
            .unwrap();
        store
            .put(repo.id, "docs/b.md", "y", &RemoteSha::Unsynced)
            .await
            .unwrap();
        store
            .put(other.id, "a.md", "z", &RemoteSha::Unsynced)
            .await
            .unwrap();

        store.delete_repository_cascade(repo.id).await.unwrap();

        assert!(store.get_repository(repo.id).await.unwrap().is_none());
        assert!(store.list_by_repository(repo.id).await.unwrap().is_empty());
        assert_eq!(store.list_by_repository(other.id).await.unwrap().len(), 1);

        store.delete_repository_cascade(repo.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_repository_is_idempotent() {
        let ctx = setup_store().await;
        let store = &ctx.store;

        let first = create_repo(store, "1", "octo/notes").await;
        let second = create_repo(store, "1", "octo/notes").await;
        assert_eq!(first, second);
        assert_eq!(first.owner, "octo");
        assert_eq!(first.name, "notes");
        assert_eq!(store.list_repositories(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_user() {
        let ctx = setup_store().await;
        let store = &ctx.store;

        let user = NewUser {
            github_id: "7".to_string(),
            username: "octo".to_string(),
            access_token: "old".to_string(),
            avatar_url: Some("https://example.com/a.png".to_string()),
        };
        let created = store.upsert_user(user.clone()).await.unwrap();
        let refreshed = store
            .upsert_user(NewUser {
                access_token: "new".to_string(),
                ..user
            })
            .await
            .unwrap();

        assert_eq!(created.id, refreshed.id);
        assert_eq!(refreshed.access_token, "new");
        assert!(store.get_user_by_token("old").await.unwrap().is_none());
        assert_eq!(
            store.get_user(created.id).await.unwrap().unwrap().username,
            "octo"
        );
    }
}
