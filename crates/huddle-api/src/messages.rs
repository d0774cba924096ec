use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;

use huddle_types::api::{EditMessageRequest, SendMessageRequest, StatusMessage};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::state::{AppState, blocking};

/// Upper bound on a single page, whatever the client asks for.
const MAX_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub conversation_id: i64,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct RequesterQuery {
    pub user_id: i64,
}

/// GET /api/messages?conversation_id=&limit=&offset=
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.min(MAX_PAGE);
    let messages = blocking(&state, move |s| {
        s.db.list_messages(query.conversation_id, limit, query.offset)
    })
    .await?;
    Ok(Json(messages))
}

/// GET /api/messages/{id}
pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(&state, move |s| s.db.get_message(message_id)).await?;
    Ok(Json(message))
}

/// POST /api/messages
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(&state, move |s| {
        s.db.send_message(
            req.conversation_id,
            req.sender_id,
            req.content.as_deref(),
            req.attachment_url.as_deref(),
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// PUT /api/messages/{id}
pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Json(req): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(&state, move |s| {
        s.db.edit_message(message_id, req.sender_id, &req.content)
    })
    .await?;
    Ok(Json(message))
}

/// DELETE /api/messages/{id}?user_id=
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Query(query): Query<RequesterQuery>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |s| s.db.delete_message(message_id, query.user_id)).await?;
    Ok(Json(StatusMessage::new("Message deleted successfully")))
}
