use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, Success};
use crate::error::AuthError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness probe. Opens a read transaction so a wedged store reports unhealthy.
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Success<Health>>, ApiError> {
    if let Err(e) = state.db.begin_read() {
        return Err(ApiError::from_auth(&AuthError::from(e), state.config.dev_mode));
    }
    Ok(Success::ok(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}
