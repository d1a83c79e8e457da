//! Category API endpoints
//!
//! - GET /api/categories - List all categories with their parent
//! - GET /api/categories/{id} - Get one category
//! - POST /api/categories - Create category
//! - PUT /api/categories/{id} - Partial update
//! - DELETE /api/categories/{id} - Delete a category with no children and no articles

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{double_option, flexible_id, nullable_flexible_id, parse_id, MessageResponse};
use crate::api::middleware::{self, ApiError, AppState};
use crate::models::{Category, CategoryChanges, CategoryWithParent};
use crate::services::category::CreateCategoryInput;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    #[serde(default)]
    pub name: String,
    pub name_hi: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    #[serde(default, deserialize_with = "flexible_id")]
    pub parent_id: Option<i64>,
    pub sort_order: Option<i32>,
}

impl From<CreateCategoryRequest> for CreateCategoryInput {
    fn from(req: CreateCategoryRequest) -> Self {
        Self {
            name: req.name,
            name_hi: req.name_hi,
            slug: req.slug,
            description: req.description,
            image: req.image,
            icon: req.icon,
            color: req.color,
            parent_id: req.parent_id,
            sort_order: req.sort_order,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub name_hi: Option<Option<String>>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub image: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub icon: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub color: Option<Option<String>>,
    /// `null` makes the category a root
    #[serde(default, deserialize_with = "nullable_flexible_id")]
    pub parent_id: Option<Option<i64>>,
    pub sort_order: Option<i32>,
}

impl From<UpdateCategoryRequest> for CategoryChanges {
    fn from(req: UpdateCategoryRequest) -> Self {
        Self {
            name: req.name.map(|n| n.trim().to_string()),
            name_hi: req.name_hi,
            slug: req.slug,
            description: req.description,
            image: req.image,
            icon: req.icon,
            color: req.color,
            parent_id: req.parent_id,
            sort_order: req.sort_order,
        }
    }
}

pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/", get(list_categories))
        .route("/{id}", get(get_category));

    let protected = Router::new()
        .route("/", post(create_category))
        .route("/{id}", put(update_category).delete(delete_category))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    public.merge(protected)
}

async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryWithParent>>, ApiError> {
    Ok(Json(state.category_service.list().await?))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CategoryWithParent>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.category_service.get(id).await?))
}

async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(body.into()).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.category_service.update(id, body.into()).await?))
}

async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id)?;
    state.category_service.delete(id).await?;
    Ok(Json(MessageResponse::new("Category deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_to_changes() {
        let body: UpdateCategoryRequest =
            serde_json::from_str(r#"{"name":" Sports ","parentId":null,"color":null}"#).unwrap();
        let changes: CategoryChanges = body.into();
        assert_eq!(changes.name.as_deref(), Some("Sports"));
        assert_eq!(changes.parent_id, Some(None));
        assert_eq!(changes.color, Some(None));
        assert!(changes.icon.is_none());
    }

    #[test]
    fn test_create_request_parent_as_string() {
        let body: CreateCategoryRequest =
            serde_json::from_str(r#"{"name":"Cricket","nameHi":"क्रिकेट","parentId":"2"}"#).unwrap();
        let input: CreateCategoryInput = body.into();
        assert_eq!(input.parent_id, Some(2));
        assert_eq!(input.name_hi.as_deref(), Some("क्रिकेट"));
    }
}
