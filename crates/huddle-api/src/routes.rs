use axum::{
    Json, Router,
    routing::{delete, get, post},
};
use serde::Serialize;

use crate::state::AppState;
use crate::{conversations, messages, reactions, users};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// All API routes. Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Users
        .route("/api/registration", post(users::register))
        .route("/api/login", post(users::login))
        .route("/api/users", get(users::list_users))
        .route("/api/users/{id}", get(users::get_user).put(users::update_user))
        // Conversations
        .route(
            "/api/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            get(conversations::get_conversation).put(conversations::rename_conversation),
        )
        .route("/api/conversations/{id}/members", post(conversations::add_member))
        .route(
            "/api/conversations/{id}/members/{user_id}",
            delete(conversations::remove_member),
        )
        // Messages
        .route(
            "/api/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route(
            "/api/messages/{id}",
            get(messages::get_message)
                .put(messages::edit_message)
                .delete(messages::delete_message),
        )
        // Reactions
        .route(
            "/api/reactions",
            get(reactions::list_reactions).post(reactions::toggle_reaction),
        )
        .route("/api/reactions/grouped", get(reactions::grouped_reactions))
        .route("/api/reactions/{id}", delete(reactions::remove_reaction))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
