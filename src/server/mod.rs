//! HTTP API for the editor.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check (no auth required)
//! - `GET /api/auth/me`: The authenticated user
//! - `GET /api/repositories`: Reconcile and list the user's repositories
//! - `GET /api/repositories/{id}/files`: Markdown paths in the default branch
//! - `GET /api/repositories/{id}/files/{*path}`: Open a file
//! - `PUT /api/repositories/{id}/files/{*path}`: Record an edit
//! - `POST /api/repositories/{id}/flush/{*path}`: Save a pending edit now
//! - `POST /api/repositories/{id}/push/{*path}`: Push to GitHub
//!
//! Requests authenticate with `Authorization: Bearer <GitHub token>`; the
//! token must belong to a user that has logged in before.

mod error;
mod handlers;

pub use error::{ApiError, ErrorBody};

use axum::{
    extract::{Request, State},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};

use gitmark_core::SyncEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: SyncEngine,
}

impl AppState {
    pub fn new(engine: SyncEngine) -> Self {
        Self { engine }
    }
}

/// Authentication middleware
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    // Extract Authorization header
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(h) if h.starts_with("Bearer ") => h[7..].to_string(),
        Some(_) => {
            return ApiError::Unauthorized(
                "invalid_auth",
                "Authorization header must use Bearer scheme",
            )
            .into_response();
        }
        None => {
            return ApiError::Unauthorized("missing_auth", "Authorization header required")
                .into_response();
        }
    };

    match state.engine.store().get_user_by_token(&token).await {
        Ok(Some(user)) => {
            tracing::debug!(user = %user.username, "authenticated request");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Ok(None) => ApiError::Unauthorized("invalid_token", "Unknown access token").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(handlers::health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/auth/me", get(handlers::me))
        .route("/api/repositories", get(handlers::list_repositories))
        .route("/api/repositories/{id}/files", get(handlers::list_files))
        .route(
            "/api/repositories/{id}/files/{*path}",
            get(handlers::open_file).put(handlers::edit_file),
        )
        .route(
            "/api/repositories/{id}/flush/{*path}",
            post(handlers::flush_file),
        )
        .route(
            "/api/repositories/{id}/push/{*path}",
            post(handlers::push_file),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
