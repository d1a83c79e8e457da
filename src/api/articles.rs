//! Article API endpoints
//!
//! - GET /api/articles - List articles (filters: category, tag, status, search, limit, author, lang)
//! - GET /api/articles/{slugOrId} - Get one article, counting a reader view
//! - POST /api/articles - Create article
//! - PUT /api/articles/{id} - Partial update
//! - PATCH /api/articles/{id}/toggle - Flip published / draft
//! - DELETE /api/articles/{id} - Delete article
//!
//! Every route under `/{slug_or_id}` shares one parameter name; writes only accept numeric ids.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, patch, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::common::{double_option, flexible_id, nullable_flexible_id, parse_id, MessageResponse};
use crate::api::middleware::{self, ApiError, AppState, AuthenticatedUser};
use crate::models::{ArticleFilter, ContentStatus, Language, ReadContext};
use crate::services::article::{ArticleView, CreateArticleInput, ToggleResult, UpdateArticleInput};

/// Query parameters for listing articles
#[derive(Debug, Default, Deserialize)]
pub struct ListArticlesQuery {
    /// Category slug
    pub category: Option<String>,
    /// Tag slug
    pub tag: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub limit: Option<String>,
    /// Author id
    pub author: Option<String>,
    pub lang: Option<String>,
}

impl ListArticlesQuery {
    fn into_filter(self) -> Result<ArticleFilter, ApiError> {
        Ok(ArticleFilter {
            category_slug: non_empty(self.category),
            tag_slug: non_empty(self.tag),
            status: parse_param::<ContentStatus>(self.status)?,
            author_id: non_empty(self.author).map(|a| parse_id(&a)).transpose()?,
            language: parse_param::<Language>(self.lang)?,
            search: non_empty(self.search),
            limit: non_empty(self.limit)
                .map(|l| parse_id(&l))
                .transpose()?
                .filter(|l| *l > 0),
        })
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse an optional query value, rejecting unknown values with a 400.
pub(crate) fn parse_param<T>(value: Option<String>) -> Result<Option<T>, ApiError>
where
    T: std::str::FromStr<Err = String>,
{
    non_empty(value)
        .map(|v| v.parse::<T>().map_err(ApiError::validation_error))
        .transpose()
}

/// Request body for creating an article
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArticleRequest {
    #[serde(default)]
    pub title: String,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub short_description: Option<String>,
    /// URL or base64 data URL
    pub image: Option<String>,
    pub video_url: Option<String>,
    #[serde(default, deserialize_with = "flexible_id")]
    pub category_id: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub is_featured: Option<bool>,
    pub is_trending: Option<bool>,
    pub is_breaking: Option<bool>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
}

impl From<CreateArticleRequest> for CreateArticleInput {
    fn from(req: CreateArticleRequest) -> Self {
        Self {
            title: req.title,
            slug: req.slug,
            content: req.content,
            short_description: req.short_description,
            image: req.image,
            video_url: req.video_url,
            category_id: req.category_id,
            tags: req.tags,
            is_featured: req.is_featured,
            is_trending: req.is_trending,
            is_breaking: req.is_breaking,
            meta_title: req.meta_title,
            meta_description: req.meta_description,
            meta_keywords: req.meta_keywords,
            metadata: req.metadata,
            priority: req.priority,
            status: req.status,
            scheduled_at: req.scheduled_at,
            language: req.language,
        }
    }
}

/// Request body for updating an article. Absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateArticleRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub short_description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub image: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub video_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_flexible_id")]
    pub category_id: Option<Option<i64>>,
    pub tags: Option<Vec<String>>,
    pub is_featured: Option<bool>,
    pub is_trending: Option<bool>,
    pub is_breaking: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub meta_title: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub meta_description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub meta_keywords: Option<Option<String>>,
    pub metadata: Option<serde_json::Value>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
}

impl From<UpdateArticleRequest> for UpdateArticleInput {
    fn from(req: UpdateArticleRequest) -> Self {
        Self {
            title: req.title,
            slug: req.slug,
            content: req.content,
            short_description: req.short_description,
            image: req.image,
            video_url: req.video_url,
            category_id: req.category_id,
            tags: req.tags,
            is_featured: req.is_featured,
            is_trending: req.is_trending,
            is_breaking: req.is_breaking,
            meta_title: req.meta_title,
            meta_description: req.meta_description,
            meta_keywords: req.meta_keywords,
            metadata: req.metadata,
            priority: req.priority,
            status: req.status,
            scheduled_at: req.scheduled_at,
            language: req.language,
        }
    }
}

/// Build the articles router
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/", get(list_articles))
        .route("/{slug_or_id}", get(get_article))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ));

    let protected = Router::new()
        .route("/", axum::routing::post(create_article))
        .route("/{slug_or_id}", put(update_article).delete(delete_article))
        .route("/{slug_or_id}/toggle", patch(toggle_article))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    public.merge(protected)
}

/// GET /api/articles
async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ListArticlesQuery>,
) -> Result<Json<Vec<ArticleView>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.article_service.list(&filter).await?))
}

/// GET /api/articles/{slugOrId}
async fn get_article(
    State(state): State<AppState>,
    Extension(ctx): Extension<ReadContext>,
    Path(slug_or_id): Path<String>,
) -> Result<Json<ArticleView>, ApiError> {
    Ok(Json(state.article_service.get(&slug_or_id, ctx).await?))
}

/// POST /api/articles
async fn create_article(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<CreateArticleRequest>,
) -> Result<(StatusCode, Json<ArticleView>), ApiError> {
    let article = state.article_service.create(body.into(), user.0.id).await?;
    Ok((StatusCode::CREATED, Json(article)))
}

/// PUT /api/articles/{id}
async fn update_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateArticleRequest>,
) -> Result<Json<ArticleView>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.article_service.update(id, body.into()).await?))
}

/// PATCH /api/articles/{id}/toggle
async fn toggle_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ToggleResult>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.article_service.toggle(id).await?))
}

/// DELETE /api/articles/{id}
async fn delete_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id)?;
    state.article_service.delete(id).await?;
    Ok(Json(MessageResponse::new("Article deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_into_filter() {
        let query = ListArticlesQuery {
            category: Some("politics".into()),
            status: Some("published".into()),
            author: Some("3".into()),
            lang: Some("hi".into()),
            limit: Some("5".into()),
            search: Some("  ".into()),
            ..Default::default()
        };
        let filter = query.into_filter().unwrap();
        assert_eq!(filter.category_slug.as_deref(), Some("politics"));
        assert_eq!(filter.status, Some(ContentStatus::Published));
        assert_eq!(filter.author_id, Some(3));
        assert_eq!(filter.language, Some(Language::Hi));
        assert_eq!(filter.limit, Some(5));
        assert!(filter.search.is_none());
    }

    #[test]
    fn test_list_query_rejects_bad_values() {
        for query in [
            ListArticlesQuery {
                status: Some("ARCHIVED".into()),
                ..Default::default()
            },
            ListArticlesQuery {
                lang: Some("fr".into()),
                ..Default::default()
            },
            ListArticlesQuery {
                author: Some("abc".into()),
                ..Default::default()
            },
        ] {
            assert_eq!(query.into_filter().unwrap_err().error.code, "VALIDATION_ERROR");
        }
    }

    #[test]
    fn test_create_request_accepts_string_category() {
        let body: CreateArticleRequest = serde_json::from_str(
            r#"{"title":"Budget 2025 Highlights","categoryId":"4","status":"PUBLISHED","tags":["Economy"]}"#,
        )
        .unwrap();
        let input: CreateArticleInput = body.into();
        assert_eq!(input.category_id, Some(4));
        assert_eq!(input.tags, Some(vec!["Economy".to_string()]));
    }

    #[test]
    fn test_update_request_null_image_clears() {
        let body: UpdateArticleRequest =
            serde_json::from_str(r#"{"image":null,"isBreaking":true}"#).unwrap();
        let input: UpdateArticleInput = body.into();
        assert_eq!(input.image, Some(None));
        assert_eq!(input.is_breaking, Some(true));
        assert!(input.category_id.is_none());
        assert!(input.title.is_none());
    }
}
