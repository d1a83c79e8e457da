//! Media library service
//!
//! Gallery images and videos. Uploads go through the ingestion pipeline;
//! this service owns the records.

use anyhow::Context;
use std::sync::Arc;
use thiserror::Error;

use crate::db::repositories::MediaRepository;
use crate::models::{
    ListParams, Media, MediaChanges, MediaFilter, MediaType, NewMedia, PagedResult,
    GALLERY_CATEGORY,
};
use crate::services::ingest::{IngestError, MediaPipeline, MediaSource, THUMBNAIL_CATEGORY};

/// Key category for media library uploads
pub const MEDIA_KEY_CATEGORY: &str = "media";

#[derive(Debug, Error)]
pub enum MediaServiceError {
    #[error("Media not found")]
    NotFound(i64),

    #[error("{0}")]
    ValidationError(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for a new media record.
///
/// The payload is either an uploaded `file` or a `url`, which may itself be
/// a base64 data URL.
#[derive(Debug, Clone, Default)]
pub struct CreateMediaInput {
    pub media_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub thumbnail: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    pub duration: Option<String>,
    pub is_published: Option<bool>,
    pub file: Option<MediaSource>,
}

/// Listing query shared by the public and admin listings
#[derive(Debug, Clone, Default)]
pub struct MediaQuery {
    pub media_type: Option<MediaType>,
    pub category: Option<String>,
    pub params: ListParams,
}

const REQUIRED_FIELDS: &str = "Type, title, and URL/File are required";

pub struct MediaService {
    repo: Arc<dyn MediaRepository>,
    pipeline: Arc<MediaPipeline>,
}

impl MediaService {
    pub fn new(repo: Arc<dyn MediaRepository>, pipeline: Arc<MediaPipeline>) -> Self {
        Self { repo, pipeline }
    }

    /// Published media. Without a category filter, `SYSTEM` media is hidden.
    pub async fn list_public(&self, query: MediaQuery) -> Result<PagedResult<Media>, MediaServiceError> {
        self.list(query, true).await
    }

    /// Every media record, published or not
    pub async fn list_admin(&self, query: MediaQuery) -> Result<PagedResult<Media>, MediaServiceError> {
        self.list(query, false).await
    }

    async fn list(&self, query: MediaQuery, published_only: bool) -> Result<PagedResult<Media>, MediaServiceError> {
        let filter = MediaFilter {
            media_type: query.media_type,
            category: query.category.filter(|c| !c.trim().is_empty()),
            published_only,
        };
        let (items, total) = tokio::try_join!(
            self.repo.list(&filter, &query.params),
            self.repo.count(&filter)
        )
        .context("Failed to list media")?;
        Ok(PagedResult::new(items, total, query.params))
    }

    pub async fn get(&self, id: i64) -> Result<Media, MediaServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get media")?
            .ok_or(MediaServiceError::NotFound(id))
    }

    pub async fn create(&self, input: CreateMediaInput) -> Result<Media, MediaServiceError> {
        let title = input.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let type_name = input.media_type.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let has_payload = input.file.is_some()
            || input.url.as_deref().is_some_and(|u| !u.trim().is_empty());

        let (Some(title), Some(type_name), true) = (title, type_name, has_payload) else {
            self.discard_upload(input.file).await;
            return Err(MediaServiceError::ValidationError(REQUIRED_FIELDS.to_string()));
        };
        let media_type = match type_name.parse::<MediaType>() {
            Ok(t) => t,
            Err(e) => {
                self.discard_upload(input.file).await;
                return Err(MediaServiceError::ValidationError(e));
            }
        };
        let title = title.to_string();

        let mut size = input.size;
        let url = match (input.file, input.url) {
            (Some(file), _) => {
                let stored = self.pipeline.ingest(file, MEDIA_KEY_CATEGORY).await?;
                size = Some(stored.size_label());
                stored.url
            }
            (None, Some(url)) if url.starts_with("data:") => {
                let stored = self
                    .pipeline
                    .ingest(MediaSource::DataUrl(url), MEDIA_KEY_CATEGORY)
                    .await?;
                size = Some(stored.size_label());
                stored.url
            }
            (None, Some(url)) => url.trim().to_string(),
            (None, None) => {
                return Err(MediaServiceError::ValidationError(REQUIRED_FIELDS.to_string()))
            }
        };

        let thumbnail = self
            .pipeline
            .resolve_optional_image(input.thumbnail, THUMBNAIL_CATEGORY)
            .await?;

        let new_media = NewMedia {
            media_type,
            title,
            description: input.description,
            url,
            thumbnail,
            category: input
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| GALLERY_CATEGORY.to_string()),
            size,
            duration: input.duration,
            is_published: input.is_published.unwrap_or(true),
        };

        let media = self.repo.create(&new_media).await.context("Failed to create media")?;
        tracing::info!(id = media.id, media_type = %media.media_type, "Media created");
        Ok(media)
    }

    pub async fn update(&self, id: i64, changes: MediaChanges) -> Result<Media, MediaServiceError> {
        if changes.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(MediaServiceError::ValidationError("Title must not be empty".to_string()));
        }
        let mut media = self.get(id).await?;
        media.apply(changes);
        self.repo
            .update(&media)
            .await
            .context("Failed to update media")?
            .ok_or(MediaServiceError::NotFound(id))
    }

    /// Flip only `is_published`
    pub async fn toggle_publish(&self, id: i64) -> Result<Media, MediaServiceError> {
        let mut media = self.get(id).await?;
        let is_published = !media.is_published;
        media.apply(MediaChanges {
            is_published: Some(is_published),
            ..Default::default()
        });
        self.repo
            .update(&media)
            .await
            .context("Failed to toggle media")?
            .ok_or(MediaServiceError::NotFound(id))
    }

    pub async fn delete(&self, id: i64) -> Result<(), MediaServiceError> {
        if !self.repo.delete(id).await.context("Failed to delete media")? {
            return Err(MediaServiceError::NotFound(id));
        }
        Ok(())
    }

    /// Count one view and return the updated record
    pub async fn increment_views(&self, id: i64) -> Result<Media, MediaServiceError> {
        self.repo
            .increment_views(id)
            .await
            .context("Failed to increment media views")?
            .ok_or(MediaServiceError::NotFound(id))
    }

    /// Remove a multipart temp file belonging to a rejected request
    async fn discard_upload(&self, file: Option<MediaSource>) {
        if let Some(MediaSource::TempFile { stored_name, .. }) = file {
            if let Ok(path) = self.pipeline.local().path_for(&stored_name) {
                self.pipeline.local().remove(&path).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxMediaRepository, SqlxSettingsRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::services::ingest::tests::RecordingStore;
    use crate::services::settings::SettingsService;
    use crate::services::storage::{LocalUploads, ObjectStore};
    use tempfile::TempDir;

    struct Fixture {
        service: MediaService,
        store: Arc<RecordingStore>,
        _dir: TempDir,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let settings = Arc::new(
            SettingsService::load(SqlxSettingsRepository::boxed(pool.clone()))
                .await
                .unwrap(),
        );
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RecordingStore::default());
        let pipeline = MediaPipeline::new(
            Some(store.clone() as Arc<dyn ObjectStore>),
            LocalUploads::new(dir.path(), "http://localhost:3000"),
            settings,
        );
        Fixture {
            service: MediaService::new(SqlxMediaRepository::boxed(pool), Arc::new(pipeline)),
            store,
            _dir: dir,
        }
    }

    fn input(media_type: &str, title: &str, url: &str) -> CreateMediaInput {
        CreateMediaInput {
            media_type: Some(media_type.to_string()),
            title: Some(title.to_string()),
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_with_plain_url() {
        let f = setup().await;
        let media = f
            .service
            .create(input("IMAGE", "Raipur skyline", "https://example.com/a.jpg"))
            .await
            .unwrap();

        assert_eq!(media.media_type, MediaType::Image);
        assert_eq!(media.category, GALLERY_CATEGORY);
        assert!(media.is_published);
        assert!(f.store.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_fields() {
        let f = setup().await;
        for bad in [
            input("", "t", "https://x/y.png"),
            input("IMAGE", "  ", "https://x/y.png"),
            input("IMAGE", "t", ""),
        ] {
            let err = f.service.create(bad).await.unwrap_err();
            assert_eq!(err.to_string(), "Type, title, and URL/File are required");
        }

        let err = f
            .service
            .create(input("AUDIO", "t", "https://x/y.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_create_ingests_data_url_and_thumbnail() {
        let f = setup().await;
        let mut req = input("VIDEO", "Clip", "data:video/mp4;base64,AAAAAAAA");
        req.thumbnail = Some("data:image/png;base64,AAAA".to_string());

        let media = f.service.create(req).await.unwrap();

        assert!(media.url.starts_with("https://cdn.test/media-"));
        assert!(media.url.ends_with(".mp4"));
        assert!(media.thumbnail.unwrap().starts_with("https://cdn.test/thumb-"));
        assert_eq!(media.size.as_deref(), Some("0 KB"));
        assert_eq!(f.store.puts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_toggle_and_listings() {
        let f = setup().await;
        let media = f
            .service
            .create(input("IMAGE", "One", "https://x/1.png"))
            .await
            .unwrap();

        let toggled = f.service.toggle_publish(media.id).await.unwrap();
        assert!(!toggled.is_published);
        assert_eq!(toggled.title, "One");

        let public = f.service.list_public(MediaQuery::default()).await.unwrap();
        assert_eq!(public.total, 0);
        let admin = f.service.list_admin(MediaQuery::default()).await.unwrap();
        assert_eq!(admin.total, 1);
        assert_eq!(admin.pagination().total_pages, 1);

        let back = f.service.toggle_publish(media.id).await.unwrap();
        assert!(back.is_published);
    }

    #[tokio::test]
    async fn test_update_views_delete() {
        let f = setup().await;
        let media = f
            .service
            .create(input("IMAGE", "One", "https://x/1.png"))
            .await
            .unwrap();

        let updated = f
            .service
            .update(
                media.id,
                MediaChanges {
                    title: Some("Renamed".into()),
                    category: Some("SYSTEM".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.category, "SYSTEM");

        assert_eq!(f.service.increment_views(media.id).await.unwrap().views, 1);

        f.service.delete(media.id).await.unwrap();
        assert!(matches!(
            f.service.delete(media.id).await,
            Err(MediaServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.increment_views(media.id).await,
            Err(MediaServiceError::NotFound(_))
        ));
    }
}
