//! API middleware
//!
//! Contains:
//! - the shared application state
//! - the API error type and its mapping from service errors
//! - authentication (bearer session tokens) and admin authorization

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{
    SqlxArticleRepository, SqlxBlogRepository, SqlxCategoryRepository, SqlxMediaRepository,
    SqlxSessionRepository, SqlxSettingsRepository, SqlxTagRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{ReadContext, User, UserRole};
use crate::services::article::{ArticleService, ArticleServiceError};
use crate::services::blog::{BlogService, BlogServiceError};
use crate::services::category::{CategoryService, CategoryServiceError};
use crate::services::ingest::{IngestError, MediaPipeline};
use crate::services::media::{MediaService, MediaServiceError};
use crate::services::search::{SearchService, SearchServiceError};
use crate::services::settings::{SettingsService, SettingsServiceError};
use crate::services::storage::{LocalUploads, ObjectStore};
use crate::services::tag::TagService;
use crate::services::user::{UserService, UserServiceError};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub article_service: Arc<ArticleService>,
    pub blog_service: Arc<BlogService>,
    pub category_service: Arc<CategoryService>,
    pub media_service: Arc<MediaService>,
    pub search_service: Arc<SearchService>,
    pub settings_service: Arc<SettingsService>,
    pub pipeline: Arc<MediaPipeline>,
}

impl AppState {
    /// Wire repositories and services over `pool`.
    ///
    /// `remote` is the object store uploads go to first; without one every
    /// upload is written to the local uploads directory.
    pub async fn build(
        pool: DynDatabasePool,
        config: &Config,
        remote: Option<Arc<dyn ObjectStore>>,
    ) -> anyhow::Result<Self> {
        let settings_service =
            Arc::new(SettingsService::load(SqlxSettingsRepository::boxed(pool.clone())).await?);

        let local = LocalUploads::from_config(&config.upload);
        local.ensure_dir().await?;
        let pipeline = Arc::new(MediaPipeline::new(remote, local, settings_service.clone()));

        let cache = crate::cache::create_cache(&config.cache);
        let article_repo = SqlxArticleRepository::boxed(pool.clone());
        let blog_repo = SqlxBlogRepository::boxed(pool.clone());
        let user_repo = SqlxUserRepository::boxed(pool.clone());

        let category_service = Arc::new(
            CategoryService::new(
                SqlxCategoryRepository::boxed(pool.clone()),
                article_repo.clone(),
                pipeline.clone(),
                cache,
            )
            .with_cache_ttl(std::time::Duration::from_secs(config.cache.ttl_seconds)),
        );
        let tag_service = Arc::new(TagService::new(SqlxTagRepository::boxed(pool.clone())));

        Ok(Self {
            user_service: Arc::new(UserService::new(
                user_repo.clone(),
                SqlxSessionRepository::boxed(pool.clone()),
            )),
            article_service: Arc::new(ArticleService::new(
                article_repo.clone(),
                user_repo.clone(),
                tag_service.clone(),
                category_service.clone(),
                pipeline.clone(),
            )),
            blog_service: Arc::new(BlogService::new(
                blog_repo.clone(),
                user_repo.clone(),
                tag_service,
                category_service.clone(),
                pipeline.clone(),
            )),
            media_service: Arc::new(MediaService::new(
                SqlxMediaRepository::boxed(pool),
                pipeline.clone(),
            )),
            search_service: Arc::new(SearchService::new(
                article_repo,
                blog_repo,
                user_repo,
                category_service.clone(),
            )),
            category_service,
            settings_service,
            pipeline,
        })
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new("DUPLICATE", message)
    }

    /// Log the full error chain; the client only gets a generic message.
    pub fn internal(err: &anyhow::Error) -> Self {
        tracing::error!("Request failed: {:#}", err);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" | "DUPLICATE" | "PAYLOAD_TOO_LARGE_LIMIT" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::TooLarge {
                size_mb,
                limit_mb,
                class,
            } => ApiError::with_details(
                "PAYLOAD_TOO_LARGE_LIMIT",
                err.to_string(),
                serde_json::json!({ "sizeMb": size_mb, "limitMb": limit_mb, "class": class }),
            ),
            IngestError::InvalidDataUrl => ApiError::validation_error(err.to_string()),
            IngestError::Storage(e) => ApiError::internal(&e),
        }
    }
}

impl From<ArticleServiceError> for ApiError {
    fn from(err: ArticleServiceError) -> Self {
        match err {
            ArticleServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            ArticleServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ArticleServiceError::DuplicateSlug(msg) => ApiError::duplicate(msg),
            ArticleServiceError::Media(e) => e.into(),
            ArticleServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<BlogServiceError> for ApiError {
    fn from(err: BlogServiceError) -> Self {
        match err {
            BlogServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            BlogServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            BlogServiceError::DuplicateSlug(msg) => ApiError::duplicate(msg),
            BlogServiceError::Media(e) => e.into(),
            BlogServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::DuplicateSlug(msg) => ApiError::duplicate(msg),
            CategoryServiceError::HasChildren | CategoryServiceError::HasArticles => {
                ApiError::validation_error(err.to_string())
            }
            CategoryServiceError::Media(e) => e.into(),
            CategoryServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<MediaServiceError> for ApiError {
    fn from(err: MediaServiceError) -> Self {
        match err {
            MediaServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            MediaServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            MediaServiceError::Ingest(e) => e.into(),
            MediaServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<SearchServiceError> for ApiError {
    fn from(err: SearchServiceError) -> Self {
        match err {
            SearchServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<SettingsServiceError> for ApiError {
    fn from(err: SettingsServiceError) -> Self {
        match err {
            SettingsServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            SettingsServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

/// Extract the bearer token from the `Authorization` header
pub fn extract_session_token(request: &Request) -> Option<String> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware
///
/// Always attaches a [`ReadContext`]. Only a token that resolves to a live
/// session makes the request a preview; anything else reads as an anonymous
/// reader.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut ctx = ReadContext::reader();
    if let Some(token) = extract_session_token(&request) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                ctx = ReadContext::preview();
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session lookup failed: {}", e),
        }
    }
    request.extensions_mut().insert(ctx);
    next.run(request).await
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if user.0.role != UserRole::Admin {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}
