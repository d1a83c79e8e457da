//! Blog API endpoints
//!
//! - GET /api/blogs - List posts (filters: lang, author, status, search)
//! - GET /api/blogs/{slug} - Get one post, counting a reader view
//! - POST /api/blogs - Create post
//! - PUT /api/blogs/{id} - Partial update
//! - DELETE /api/blogs/{id} - Delete post

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::articles::{non_empty, parse_param};
use crate::api::common::{double_option, flexible_id, nullable_flexible_id, parse_id, MessageResponse};
use crate::api::middleware::{self, ApiError, AppState, AuthenticatedUser};
use crate::models::{BlogFilter, ContentStatus, Language, ReadContext};
use crate::services::blog::{BlogView, CreateBlogInput, UpdateBlogInput};

#[derive(Debug, Default, Deserialize)]
pub struct ListBlogsQuery {
    pub lang: Option<String>,
    /// Author id
    pub author: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
}

impl ListBlogsQuery {
    fn into_filter(self) -> Result<BlogFilter, ApiError> {
        Ok(BlogFilter {
            status: parse_param::<ContentStatus>(self.status)?,
            author_id: non_empty(self.author).map(|a| parse_id(&a)).transpose()?,
            language: parse_param::<Language>(self.lang)?,
            search: non_empty(self.search),
            limit: None,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlogRequest {
    #[serde(default)]
    pub title: String,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub short_description: Option<String>,
    pub image: Option<String>,
    #[serde(default, deserialize_with = "flexible_id")]
    pub category_id: Option<i64>,
    /// Tag names
    pub tags: Option<Vec<String>>,
    pub status: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
}

impl From<CreateBlogRequest> for CreateBlogInput {
    fn from(req: CreateBlogRequest) -> Self {
        Self {
            title: req.title,
            slug: req.slug,
            content: req.content,
            short_description: req.short_description,
            image: req.image,
            category_id: req.category_id,
            tags: req.tags,
            status: req.status,
            scheduled_at: req.scheduled_at,
            language: req.language,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBlogRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub short_description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub image: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_flexible_id")]
    pub category_id: Option<Option<i64>>,
    pub tags: Option<Vec<String>>,
    pub status: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
}

impl From<UpdateBlogRequest> for UpdateBlogInput {
    fn from(req: UpdateBlogRequest) -> Self {
        Self {
            title: req.title,
            slug: req.slug,
            content: req.content,
            short_description: req.short_description,
            image: req.image,
            category_id: req.category_id,
            tags: req.tags,
            status: req.status,
            scheduled_at: req.scheduled_at,
            language: req.language,
        }
    }
}

pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/", get(list_blogs))
        .route("/{slug}", get(get_blog))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ));

    let protected = Router::new()
        .route("/", post(create_blog))
        .route("/{slug}", put(update_blog).delete(delete_blog))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    public.merge(protected)
}

async fn list_blogs(
    State(state): State<AppState>,
    Query(query): Query<ListBlogsQuery>,
) -> Result<Json<Vec<BlogView>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.blog_service.list(&filter).await?))
}

async fn get_blog(
    State(state): State<AppState>,
    Extension(ctx): Extension<ReadContext>,
    Path(slug): Path<String>,
) -> Result<Json<BlogView>, ApiError> {
    Ok(Json(state.blog_service.get(&slug, ctx).await?))
}

async fn create_blog(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<CreateBlogRequest>,
) -> Result<(StatusCode, Json<BlogView>), ApiError> {
    let blog = state.blog_service.create(body.into(), user.0.id).await?;
    Ok((StatusCode::CREATED, Json(blog)))
}

async fn update_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateBlogRequest>,
) -> Result<Json<BlogView>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.blog_service.update(id, body.into()).await?))
}

async fn delete_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id)?;
    state.blog_service.delete(id).await?;
    Ok(Json(MessageResponse::new("Blog deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_null_category_disconnects() {
        let body: UpdateBlogRequest = serde_json::from_str(r#"{"categoryId":null}"#).unwrap();
        assert_eq!(UpdateBlogInput::from(body).category_id, Some(None));

        let body: UpdateBlogRequest = serde_json::from_str(r#"{"title":"New"}"#).unwrap();
        assert_eq!(UpdateBlogInput::from(body).category_id, None);
    }

    #[test]
    fn test_list_query() {
        let filter = ListBlogsQuery {
            lang: Some("hi".into()),
            status: Some("draft".into()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.language, Some(Language::Hi));
        assert_eq!(filter.status, Some(ContentStatus::Draft));
    }
}
