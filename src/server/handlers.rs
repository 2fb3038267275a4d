use axum::{
    body::Bytes,
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use gitmark_core::{FileKey, OpenFile, PushOutcome, RepositoryId, RepositoryRecord, SyncError, User};

use super::{ApiError, AppState};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Get current user info
pub async fn me(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
struct PushRequest {
    content: Option<String>,
}

/// Looks up a repository record, hiding records that belong to someone else.
async fn owned_repository(
    state: &AppState,
    user: &User,
    id: RepositoryId,
) -> Result<RepositoryRecord, ApiError> {
    match state.engine.store().get_repository(id).await? {
        Some(repo) if repo.user_id == user.id => Ok(repo),
        _ => Err(ApiError::NotFound(format!("repository {}", id))),
    }
}

/// Opens the file unless a session already exists, then applies `content`.
async fn open_and_edit(
    state: &AppState,
    user: &User,
    repo: &RepositoryRecord,
    path: &str,
    content: String,
) -> Result<OpenFile, ApiError> {
    let token = user.token();
    let key = FileKey::new(repo.id, path);
    if state.engine.view(&key).is_none() {
        state.engine.open_file(Some(&token), repo, path).await?;
    }
    state.engine.edit(&key, content)?;
    state
        .engine
        .view(&key)
        .ok_or_else(|| ApiError::Sync(SyncError::NotOpen(key)))
}

/// Reconciles and lists the user's repositories
pub async fn list_repositories(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<RepositoryRecord>>, ApiError> {
    let repos = state
        .engine
        .sync_repositories(Some(&user.token()), user.id)
        .await?;
    Ok(Json(repos))
}

pub async fn list_files(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<RepositoryId>,
) -> Result<Json<Vec<String>>, ApiError> {
    let repo = owned_repository(&state, &user, id).await?;
    let paths = state
        .engine
        .list_markdown_files(Some(&user.token()), &repo)
        .await?;
    Ok(Json(paths))
}

pub async fn open_file(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((id, path)): Path<(RepositoryId, String)>,
) -> Result<Json<OpenFile>, ApiError> {
    let repo = owned_repository(&state, &user, id).await?;
    let open = state
        .engine
        .open_file(Some(&user.token()), &repo, &path)
        .await?;
    Ok(Json(open))
}

/// Records an edit; the local save happens after the debounce delay
pub async fn edit_file(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((id, path)): Path<(RepositoryId, String)>,
    Json(req): Json<EditRequest>,
) -> Result<Json<OpenFile>, ApiError> {
    let repo = owned_repository(&state, &user, id).await?;
    let open = open_and_edit(&state, &user, &repo, &path, req.content).await?;
    Ok(Json(open))
}

pub async fn flush_file(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((id, path)): Path<(RepositoryId, String)>,
) -> Result<Json<OpenFile>, ApiError> {
    let repo = owned_repository(&state, &user, id).await?;
    let key = FileKey::new(repo.id, path);
    state.engine.flush(&key).await?;
    state
        .engine
        .view(&key)
        .map(Json)
        .ok_or_else(|| ApiError::Sync(SyncError::NotOpen(key)))
}

/// Pushes the open file. An optional `{"content": ...}` body is applied as
/// an edit first.
pub async fn push_file(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((id, path)): Path<(RepositoryId, String)>,
    body: Bytes,
) -> Result<Json<PushOutcome>, ApiError> {
    let req: PushRequest = if body.is_empty() {
        PushRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid push body: {}", e)))?
    };

    let repo = owned_repository(&state, &user, id).await?;
    if let Some(content) = req.content {
        open_and_edit(&state, &user, &repo, &path, content).await?;
    }
    let outcome = state
        .engine
        .push(Some(&user.token()), &repo, &path)
        .await?;
    Ok(Json(outcome))
}
