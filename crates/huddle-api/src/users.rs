use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;

use huddle_types::api::{LoginRequest, RegisterRequest, UpdateUserRequest};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::state::{AppState, blocking};

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub search: Option<String>,
    pub exclude_user_id: Option<i64>,
}

/// POST /api/registration
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = blocking(&state, move |s| {
        s.db.register_user(&req.username, &req.email, &req.password)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// POST /api/login: credential check only; no session is issued.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = blocking(&state, move |s| s.db.verify_login(&req.username, &req.password)).await?;
    Ok(Json(profile))
}

/// GET /api/users?search=&exclude_user_id=
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserSearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let users = blocking(&state, move |s| {
        s.db.list_users(query.search.as_deref(), query.exclude_user_id)
    })
    .await?;
    Ok(Json(users))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(&state, move |s| s.db.get_user(user_id)).await?;
    Ok(Json(user))
}

/// PUT /api/users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(&state, move |s| {
        s.db.update_user(
            user_id,
            req.username.as_deref(),
            req.email.as_deref(),
            req.avatar_url.as_deref(),
        )
    })
    .await?;
    Ok(Json(user))
}
