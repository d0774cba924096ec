use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;

use huddle_types::api::{StatusMessage, ToggleReactionRequest};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::messages::RequesterQuery;
use crate::state::{AppState, blocking};

#[derive(Debug, Deserialize)]
pub struct ReactionQuery {
    pub message_id: i64,
}

/// GET /api/reactions?message_id=
pub async fn list_reactions(
    State(state): State<AppState>,
    Query(query): Query<ReactionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let reactions = blocking(&state, move |s| s.db.list_reactions(query.message_id)).await?;
    Ok(Json(reactions))
}

/// POST /api/reactions: toggle. 201 with the reaction when added, 200 with
/// `{"removed": true}` when removed.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = blocking(&state, move |s| {
        s.db.toggle_reaction(req.message_id, req.user_id, &req.emoji)
    })
    .await?;

    let status = if outcome.removed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

/// DELETE /api/reactions/{id}?user_id=
pub async fn remove_reaction(
    State(state): State<AppState>,
    Path(reaction_id): Path<i64>,
    Query(query): Query<RequesterQuery>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |s| s.db.remove_reaction(reaction_id, query.user_id)).await?;
    Ok(Json(StatusMessage::new("Reaction removed successfully")))
}

/// GET /api/reactions/grouped?message_id=
pub async fn grouped_reactions(
    State(state): State<AppState>,
    Query(query): Query<ReactionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let groups = blocking(&state, move |s| s.db.group_reactions(query.message_id)).await?;
    Ok(Json(groups))
}
