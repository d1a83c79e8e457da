//! Site settings endpoints
//!
//! - GET /api/settings - Current settings as a key/value map
//! - PUT /api/settings - Upsert settings (admin)

use axum::{
    extract::State,
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use std::collections::BTreeMap;

use crate::api::middleware::{self, ApiError, AppState};

pub fn router(state: AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/", axum::routing::put(update_settings))
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new().route("/", get(get_settings)).merge(admin)
}

async fn get_settings(State(state): State<AppState>) -> Json<BTreeMap<String, String>> {
    Json(state.settings_service.snapshot().values.clone())
}

/// Values may be sent as strings, numbers or booleans; all are stored as text.
async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<BTreeMap<String, serde_json::Value>>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let mut values = BTreeMap::new();
    for (key, value) in body {
        let text = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            other => {
                return Err(ApiError::validation_error(format!(
                    "Unsupported value for {}: {}",
                    key, other
                )))
            }
        };
        values.insert(key, text);
    }

    let snapshot = state.settings_service.update(values).await?;
    tracing::info!(version = snapshot.version, "Settings updated");
    Ok(Json(snapshot.values.clone()))
}
