use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use huddle_db::ChatError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Body(#[from] JsonRejection),

    #[error(transparent)]
    Query(#[from] QueryRejection),

    #[error(transparent)]
    Path(#[from] PathRejection),
}

fn status_for(err: &ChatError) -> StatusCode {
    match err {
        ChatError::Validation(_) => StatusCode::BAD_REQUEST,
        ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        ChatError::Conflict(_) => StatusCode::CONFLICT,
        ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
        ChatError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        ChatError::Storage(_) | ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Chat(err) => {
                let status = status_for(err);
                if status.is_server_error() {
                    // Do not leak storage details to clients.
                    error!(error = %err, "request failed");
                    (status, "Internal server error".to_string())
                } else {
                    (status, err.to_string())
                }
            }
            ApiError::Join(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            ApiError::Body(rejection) => (rejection.status(), rejection.body_text()),
            ApiError::Query(rejection) => (rejection.status(), rejection.body_text()),
            ApiError::Path(rejection) => (rejection.status(), rejection.body_text()),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status() {
        let cases = [
            (ChatError::validation("x"), StatusCode::BAD_REQUEST),
            (ChatError::not_found("x"), StatusCode::NOT_FOUND),
            (ChatError::conflict("x"), StatusCode::CONFLICT),
            (ChatError::forbidden("x"), StatusCode::FORBIDDEN),
            (ChatError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (ChatError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
