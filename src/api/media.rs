//! Media library API endpoints
//!
//! - GET /api/media - Published media, paginated
//! - GET /api/media/admin - All media, paginated (auth)
//! - POST /api/media - Create from a multipart `file` or a JSON `url` (auth)
//! - PUT /api/media/{id} - Update title, description, category, isPublished (auth)
//! - PATCH /api/media/{id}/toggle - Flip isPublished (auth)
//! - DELETE /api/media/{id} - Delete (auth)
//! - POST /api/media/{id}/view - Count a view

use axum::{
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware as axum_middleware,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::api::articles::{non_empty, parse_param};
use crate::api::common::{double_option, parse_id, MessageResponse};
use crate::api::middleware::{self, ApiError, AppState};
use crate::models::{ListParams, Media, MediaChanges, MediaType, Pagination};
use crate::services::ingest::{classify_mime, extension_for, object_key, MediaSource};
use crate::services::media::{CreateMediaInput, MediaQuery};

const MEDIA_FILE_PREFIX: &str = "media";
const DEFAULT_MEDIA_PAGE_SIZE: u32 = 20;

#[derive(Debug, Default, Deserialize)]
pub struct ListMediaQuery {
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub category: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListMediaQuery {
    fn into_query(self) -> Result<MediaQuery, ApiError> {
        let page = parse_u32(self.page)?.unwrap_or(1);
        let limit = parse_u32(self.limit)?.unwrap_or(DEFAULT_MEDIA_PAGE_SIZE);
        Ok(MediaQuery {
            media_type: parse_param::<MediaType>(self.media_type)?,
            category: non_empty(self.category),
            params: ListParams::new(page, limit),
        })
    }
}

fn parse_u32(value: Option<String>) -> Result<Option<u32>, ApiError> {
    non_empty(value)
        .map(|v| {
            v.parse::<u32>()
                .map_err(|_| ApiError::validation_error(format!("Invalid number: {}", v)))
        })
        .transpose()
}

#[derive(Debug, Serialize)]
pub struct MediaListResponse {
    pub media: Vec<Media>,
    pub pagination: Pagination,
}

/// JSON body for `POST /api/media`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMediaRequest {
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Plain URL or base64 data URL
    pub url: Option<String>,
    pub thumbnail: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    pub duration: Option<String>,
    pub is_published: Option<bool>,
}

impl From<CreateMediaRequest> for CreateMediaInput {
    fn from(req: CreateMediaRequest) -> Self {
        Self {
            media_type: req.media_type,
            title: req.title,
            description: req.description,
            url: req.url,
            thumbnail: req.thumbnail,
            category: req.category,
            size: req.size,
            duration: req.duration,
            is_published: req.is_published,
            file: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMediaRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub category: Option<String>,
    pub is_published: Option<bool>,
}

impl From<UpdateMediaRequest> for MediaChanges {
    fn from(req: UpdateMediaRequest) -> Self {
        Self {
            title: req.title.map(|t| t.trim().to_string()),
            description: req.description,
            category: req.category.filter(|c| !c.trim().is_empty()),
            is_published: req.is_published,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub is_published: bool,
}

pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/", get(list_media))
        .route("/{id}/view", post(count_view));

    let protected = Router::new()
        .route("/", post(create_media))
        .route("/admin", get(list_media_admin))
        .route("/{id}", put(update_media).delete(delete_media))
        .route("/{id}/toggle", patch(toggle_media))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    public.merge(protected)
}

async fn list_media(
    State(state): State<AppState>,
    Query(query): Query<ListMediaQuery>,
) -> Result<Json<MediaListResponse>, ApiError> {
    let result = state.media_service.list_public(query.into_query()?).await?;
    Ok(Json(MediaListResponse {
        pagination: result.pagination(),
        media: result.items,
    }))
}

async fn list_media_admin(
    State(state): State<AppState>,
    Query(query): Query<ListMediaQuery>,
) -> Result<Json<MediaListResponse>, ApiError> {
    let result = state.media_service.list_admin(query.into_query()?).await?;
    Ok(Json(MediaListResponse {
        pagination: result.pagination(),
        media: result.items,
    }))
}

/// POST /api/media
///
/// Multipart bodies carry the upload in a `file` field plus text fields;
/// anything else is read as JSON.
async fn create_media(
    State(state): State<AppState>,
    request: Request,
) -> Result<(StatusCode, Json<Media>), ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let input = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::validation_error(e.body_text()))?;
        read_multipart(&state, multipart).await?
    } else {
        let Json(body) = Json::<CreateMediaRequest>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::validation_error(e.body_text()))?;
        body.into()
    };

    let media = state.media_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(media)))
}

/// Collect the text fields and stream the `file` field into the uploads directory.
async fn read_multipart(state: &AppState, mut multipart: Multipart) -> Result<CreateMediaInput, ApiError> {
    let mut input = CreateMediaInput::default();
    let local = state.pipeline.local();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                discard(state, input.file.take()).await;
                return Err(ApiError::validation_error(e.body_text()));
            }
        };
        let name = field.name().unwrap_or("").to_string();

        if name == "file" {
            let original_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let stored_name = object_key(
                MEDIA_FILE_PREFIX,
                &extension_for(original_name.as_deref(), &content_type, classify_mime(&content_type)),
            );

            // a second file field replaces the first
            discard(state, input.file.take()).await;
            let size = match stream_to_file(local, &stored_name, field).await {
                Ok(size) => size,
                Err(e) => {
                    if let Ok(path) = local.path_for(&stored_name) {
                        local.remove(&path).await;
                    }
                    return Err(e);
                }
            };
            input.file = Some(MediaSource::TempFile {
                stored_name,
                original_name,
                content_type,
                size,
            });
            continue;
        }

        let value = match field.text().await {
            Ok(value) => value,
            Err(e) => {
                discard(state, input.file.take()).await;
                return Err(ApiError::validation_error(e.body_text()));
            }
        };
        match name.as_str() {
            "type" => input.media_type = Some(value),
            "title" => input.title = Some(value),
            "description" => input.description = Some(value),
            "url" => input.url = Some(value),
            "thumbnail" => input.thumbnail = Some(value),
            "category" => input.category = Some(value),
            "size" => input.size = Some(value),
            "duration" => input.duration = Some(value),
            "isPublished" => input.is_published = Some(value.trim() == "true"),
            _ => {}
        }
    }

    Ok(input)
}

async fn stream_to_file(
    local: &crate::services::storage::LocalUploads,
    stored_name: &str,
    mut field: axum::extract::multipart::Field<'_>,
) -> Result<u64, ApiError> {
    local.ensure_dir().await.map_err(|e| ApiError::internal(&e))?;
    let path = local.path_for(stored_name).map_err(|e| ApiError::internal(&e))?;
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| ApiError::internal(&anyhow::Error::new(e).context("Failed to create upload file")))?;

    let mut size = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::validation_error(e.body_text()))?
    {
        size += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::internal(&anyhow::Error::new(e).context("Failed to write upload")))?;
    }
    file.flush()
        .await
        .map_err(|e| ApiError::internal(&anyhow::Error::new(e).context("Failed to write upload")))?;
    Ok(size)
}

async fn discard(state: &AppState, file: Option<MediaSource>) {
    if let Some(MediaSource::TempFile { stored_name, .. }) = file {
        let local = state.pipeline.local();
        if let Ok(path) = local.path_for(&stored_name) {
            local.remove(&path).await;
        }
    }
}

async fn update_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateMediaRequest>,
) -> Result<Json<Media>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.media_service.update(id, body.into()).await?))
}

async fn toggle_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let id = parse_id(&id)?;
    let media = state.media_service.toggle_publish(id).await?;
    Ok(Json(ToggleResponse {
        is_published: media.is_published,
    }))
}

async fn delete_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id)?;
    state.media_service.delete(id).await?;
    Ok(Json(MessageResponse::new("Media deleted successfully")))
}

async fn count_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Media>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.media_service.increment_views(id).await?))
}
