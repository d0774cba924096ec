use std::sync::Arc;

use tracing::error;

use huddle_db::{Database, RemovalPolicy};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub removal_policy: RemovalPolicy,
}

impl AppStateInner {
    pub fn new(db: Database, removal_policy: RemovalPolicy) -> AppState {
        Arc::new(Self { db, removal_policy })
    }
}

/// Runs a store call off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> huddle_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    let result = tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Join(e)
        })?;
    Ok(result?)
}
