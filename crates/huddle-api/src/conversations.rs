use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;

use huddle_types::api::{
    AddMemberRequest, CreateConversationRequest, RenameConversationRequest, StatusMessage,
};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::state::{AppState, blocking};

#[derive(Debug, Deserialize)]
pub struct ConversationListQuery {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RemoveMemberQuery {
    pub requester_id: Option<i64>,
}

/// GET /api/conversations?user_id=: the user's conversation list.
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let list = blocking(&state, move |s| s.db.list_conversations_for_user(query.user_id)).await?;
    Ok(Json(list))
}

/// GET /api/conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = blocking(&state, move |s| s.db.get_conversation_detail(conversation_id)).await?;
    Ok(Json(detail))
}

/// POST /api/conversations: 201 when created, 200 when an existing direct
/// conversation was returned instead.
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = blocking(&state, move |s| {
        s.db.create_conversation(
            req.name.as_deref(),
            req.is_group,
            req.created_by_id,
            &req.member_ids,
        )
    })
    .await?;

    let status = if created.existing {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(created)))
}

/// PUT /api/conversations/{id}
pub async fn rename_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
    Json(req): Json<RenameConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |s| {
        s.db.rename_conversation(conversation_id, req.name.as_deref())
    })
    .await?;
    Ok(Json(StatusMessage::new("Conversation updated successfully")))
}

/// POST /api/conversations/{id}/members
pub async fn add_member(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |s| s.db.add_member(conversation_id, req.user_id)).await?;
    Ok(Json(StatusMessage::new("Member added successfully")))
}

/// DELETE /api/conversations/{id}/members/{user_id}?requester_id=
pub async fn remove_member(
    State(state): State<AppState>,
    Path((conversation_id, user_id)): Path<(i64, i64)>,
    Query(query): Query<RemoveMemberQuery>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |s| {
        s.db.remove_member(conversation_id, user_id, query.requester_id, s.removal_policy)
    })
    .await?;
    Ok(Json(StatusMessage::new("Member removed successfully")))
}
