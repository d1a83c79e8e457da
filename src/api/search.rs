//! Global search endpoint
//!
//! - GET /api/search?q&limit - Published articles, published blogs and categories

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::services::search::{effective_limit, SearchResults};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(search))
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResults>, ApiError> {
    let limit = effective_limit(query.limit.as_deref());
    Ok(Json(state.search_service.search(&query.q, limit).await?))
}
