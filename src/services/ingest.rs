//! Media ingestion pipeline
//!
//! Every uploaded image or video goes through [`MediaPipeline::ingest`]:
//! classify the payload, check it against the upload limits of the current
//! settings snapshot, push it to R2, and fall back to the local uploads
//! directory when R2 is not configured or the upload fails.

use base64::Engine;
use chrono::Utc;
use futures::future::try_join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::models::MediaType;
use crate::services::settings::SettingsService;
use crate::services::slug::random_suffix;
use crate::services::storage::{LocalUploads, ObjectStore};

/// Key category for images embedded in rich-text content
pub const CONTENT_IMAGE_CATEGORY: &str = "content";
/// Key category for media thumbnails
pub const THUMBNAIL_CATEGORY: &str = "thumb";

static CONTENT_IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"src="data:image/([a-zA-Z]*);base64,([^"]*)""#).expect("valid content image regex")
});

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Where an upload comes from
#[derive(Debug, Clone)]
pub enum MediaSource {
    /// Multipart file already written into the uploads directory
    TempFile {
        stored_name: String,
        original_name: Option<String>,
        content_type: String,
        size: u64,
    },
    /// Raw bytes held in memory
    Bytes {
        data: Vec<u8>,
        content_type: String,
        file_name: Option<String>,
    },
    /// `data:<mime>;base64,<payload>`
    DataUrl(String),
}

/// Result of a successful ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedMedia {
    pub url: String,
    pub media_type: MediaType,
    pub size_bytes: u64,
}

impl IngestedMedia {
    /// Size as shown in the media library, e.g. `"1234 KB"`
    pub fn size_label(&self) -> String {
        size_label(self.size_bytes)
    }
}

pub fn size_label(bytes: u64) -> String {
    format!("{} KB", (bytes as f64 / 1024.0).round() as u64)
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Upload size limit exceeded: {size_mb:.2}MB exceeds the {limit_mb}MB limit for {class}")]
    TooLarge {
        size_mb: f64,
        limit_mb: f64,
        class: &'static str,
    },

    #[error("Invalid base64 data URL")]
    InvalidDataUrl,

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Classify a MIME type: `video/*` is a video, everything else an image.
pub fn classify_mime(content_type: &str) -> MediaType {
    if content_type.trim().to_ascii_lowercase().starts_with("video/") {
        MediaType::Video
    } else {
        MediaType::Image
    }
}

fn classify_data_url(data_url: &str) -> MediaType {
    if data_url.starts_with("data:video") {
        MediaType::Video
    } else {
        MediaType::Image
    }
}

/// Decoded size of a base64 data URL, estimated without decoding
pub fn estimated_data_url_size(data_url: &str) -> u64 {
    let payload = data_url.split_once(',').map(|(_, p)| p).unwrap_or(data_url);
    (payload.len() as u64) * 3 / 4
}

/// Split `data:<mime>;base64,<payload>` into its MIME type and payload.
fn parse_data_url(data_url: &str) -> Option<(&str, &str)> {
    let rest = data_url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    if mime.is_empty() {
        return None;
    }
    Some((mime, payload))
}

/// File extension for an upload, from its original name or its MIME type.
pub(crate) fn extension_for(file_name: Option<&str>, content_type: &str, media_type: MediaType) -> String {
    let from_name = file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));
    if let Some(ext) = from_name {
        return ext.to_ascii_lowercase();
    }

    let subtype = content_type
        .split_once('/')
        .map(|(_, s)| s.split(';').next().unwrap_or(s).trim().to_ascii_lowercase())
        .unwrap_or_default();
    match subtype.as_str() {
        "jpeg" | "pjpeg" => "jpg".to_string(),
        "svg+xml" => "svg".to_string(),
        "quicktime" => "mov".to_string(),
        s if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()) => s.to_string(),
        _ => match media_type {
            MediaType::Image => "jpg".to_string(),
            MediaType::Video => "mp4".to_string(),
        },
    }
}

/// Object key: `<category>-<epochMillis>-<5 base36>.<ext>`
pub fn object_key(category: &str, ext: &str) -> String {
    format!(
        "{}-{}-{}.{}",
        category,
        Utc::now().timestamp_millis(),
        random_suffix(),
        ext
    )
}

pub struct MediaPipeline {
    remote: Option<Arc<dyn ObjectStore>>,
    local: LocalUploads,
    settings: Arc<SettingsService>,
}

impl MediaPipeline {
    pub fn new(
        remote: Option<Arc<dyn ObjectStore>>,
        local: LocalUploads,
        settings: Arc<SettingsService>,
    ) -> Self {
        Self {
            remote,
            local,
            settings,
        }
    }

    pub fn local(&self) -> &LocalUploads {
        &self.local
    }

    /// Validate, store and return the public URL of an upload.
    ///
    /// The size check happens before any storage call. Base64 payloads are
    /// checked using their estimated decoded size before being decoded.
    pub async fn ingest(&self, source: MediaSource, category: &str) -> Result<IngestedMedia, IngestError> {
        let limits = self.settings.upload_limits();

        let (media_type, size) = match &source {
            MediaSource::TempFile {
                content_type, size, ..
            } => (classify_mime(content_type), *size),
            MediaSource::Bytes {
                data, content_type, ..
            } => (classify_mime(content_type), data.len() as u64),
            MediaSource::DataUrl(url) => (classify_data_url(url), estimated_data_url_size(url)),
        };

        let limit_mb = limits.limit_mb(media_type);
        if size > limits.limit_bytes(media_type) {
            if let MediaSource::TempFile { stored_name, .. } = &source {
                if let Ok(path) = self.local.path_for(stored_name) {
                    self.local.remove(&path).await;
                }
            }
            let size_mb = size as f64 / BYTES_PER_MB;
            tracing::warn!(category, "Blocked upload of {:.2}MB (limit {}MB)", size_mb, limit_mb);
            return Err(IngestError::TooLarge {
                size_mb,
                limit_mb,
                class: match media_type {
                    MediaType::Image => "images",
                    MediaType::Video => "videos",
                },
            });
        }

        match source {
            MediaSource::TempFile {
                stored_name,
                original_name,
                content_type,
                size,
            } => {
                let path = self.local.path_for(&stored_name)?;
                if let Some(remote) = &self.remote {
                    let ext = extension_for(
                        original_name.as_deref().or(Some(stored_name.as_str())),
                        &content_type,
                        media_type,
                    );
                    let key = object_key(category, &ext);
                    let uploaded = match tokio::fs::read(&path).await {
                        Ok(body) => remote.put(&key, body, &content_type).await,
                        Err(e) => Err(anyhow::Error::new(e).context("Failed to read temp upload")),
                    };
                    match uploaded {
                        Ok(url) => {
                            self.local.remove(&path).await;
                            return Ok(IngestedMedia {
                                url,
                                media_type,
                                size_bytes: size,
                            });
                        }
                        Err(e) => {
                            tracing::warn!(store = remote.name(), "Upload failed, keeping local copy: {:#}", e);
                        }
                    }
                }
                Ok(IngestedMedia {
                    url: self.local.url_for(&stored_name),
                    media_type,
                    size_bytes: size,
                })
            }
            MediaSource::Bytes {
                data,
                content_type,
                file_name,
            } => {
                let ext = extension_for(file_name.as_deref(), &content_type, media_type);
                self.store_bytes(data, &content_type, &ext, media_type, category).await
            }
            MediaSource::DataUrl(url) => {
                let (mime, payload) = parse_data_url(&url).ok_or(IngestError::InvalidDataUrl)?;
                let data = base64::engine::general_purpose::STANDARD
                    .decode(payload.trim())
                    .map_err(|_| IngestError::InvalidDataUrl)?;
                let ext = extension_for(None, mime, media_type);
                self.store_bytes(data, mime, &ext, media_type, category).await
            }
        }
    }

    async fn store_bytes(
        &self,
        data: Vec<u8>,
        content_type: &str,
        ext: &str,
        media_type: MediaType,
        category: &str,
    ) -> Result<IngestedMedia, IngestError> {
        let size_bytes = data.len() as u64;
        let key = object_key(category, ext);

        if let Some(remote) = &self.remote {
            // keep a copy for the fallback path
            match remote.put(&key, data.clone(), content_type).await {
                Ok(url) => {
                    return Ok(IngestedMedia {
                        url,
                        media_type,
                        size_bytes,
                    })
                }
                Err(e) => {
                    tracing::warn!(store = remote.name(), key = %key, "Upload failed, writing locally: {:#}", e);
                }
            }
        }

        let url = self.local.put(&key, data, content_type).await?;
        Ok(IngestedMedia {
            url,
            media_type,
            size_bytes,
        })
    }

    /// Ingest `value` when it is an inline base64 image, otherwise return it as is.
    pub async fn resolve_inline_image(&self, value: &str, category: &str) -> Result<String, IngestError> {
        if value.starts_with("data:image") {
            let ingested = self
                .ingest(MediaSource::DataUrl(value.to_string()), category)
                .await?;
            Ok(ingested.url)
        } else {
            Ok(value.to_string())
        }
    }

    /// [`resolve_inline_image`](Self::resolve_inline_image) for optional fields
    pub async fn resolve_optional_image(
        &self,
        value: Option<String>,
        category: &str,
    ) -> Result<Option<String>, IngestError> {
        match value {
            Some(v) => Ok(Some(self.resolve_inline_image(&v, category).await?)),
            None => Ok(None),
        }
    }

    /// Upload every inline base64 `<img src>` in `html` and point it at the
    /// stored copy.
    ///
    /// All uploads run concurrently; if any of them fails the whole call fails
    /// and the content is left untouched.
    pub async fn process_content_images(&self, html: &str) -> Result<String, IngestError> {
        let matches: Vec<(std::ops::Range<usize>, String)> = CONTENT_IMAGE_RE
            .captures_iter(html)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let ext = caps.get(1).map_or("", |m| m.as_str());
                let data = caps.get(2).map_or("", |m| m.as_str());
                Some((whole.range(), format!("data:image/{};base64,{}", ext, data)))
            })
            .collect();

        if matches.is_empty() {
            return Ok(html.to_string());
        }

        let uploads = matches.iter().map(|(_, data_url)| {
            self.ingest(MediaSource::DataUrl(data_url.clone()), CONTENT_IMAGE_CATEGORY)
        });
        let stored = try_join_all(uploads).await?;
        tracing::debug!(count = stored.len(), "Rewrote inline content images");

        let mut out = String::with_capacity(html.len());
        let mut last = 0;
        for ((range, _), media) in matches.iter().zip(stored) {
            out.push_str(&html[last..range.start]);
            out.push_str(&format!("src=\"{}\"", media.url));
            last = range.end;
        }
        out.push_str(&html[last..]);
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::SqlxSettingsRepository;
    use crate::db::{create_test_pool, migrations};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every put; optionally fails them all
    #[derive(Default)]
    pub struct RecordingStore {
        pub puts: Mutex<Vec<(String, usize, String)>>,
        pub fail: bool,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> anyhow::Result<String> {
            if self.fail {
                anyhow::bail!("bucket unavailable");
            }
            self.puts
                .lock()
                .unwrap()
                .push((key.to_string(), body.len(), content_type.to_string()));
            Ok(format!("https://cdn.test/{}", key))
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    async fn settings(image_mb: &str) -> Arc<SettingsService> {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let service = SettingsService::load(SqlxSettingsRepository::boxed(pool)).await.unwrap();
        let mut values = BTreeMap::new();
        values.insert("max_image_upload_size".to_string(), image_mb.to_string());
        service.update(values).await.unwrap();
        Arc::new(service)
    }

    async fn pipeline(
        store: Option<Arc<RecordingStore>>,
        image_mb: &str,
    ) -> (MediaPipeline, TempDir) {
        let dir = TempDir::new().unwrap();
        let local = LocalUploads::new(dir.path(), "http://localhost:3000");
        let remote = store.map(|s| s as Arc<dyn ObjectStore>);
        (MediaPipeline::new(remote, local, settings(image_mb).await), dir)
    }

    fn data_url(mime: &str, bytes: &[u8]) -> String {
        format!(
            "data:{};base64,{}",
            mime,
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    #[test]
    fn test_size_label() {
        assert_eq!(size_label(0), "0 KB");
        assert_eq!(size_label(1536), "2 KB");
        assert_eq!(size_label(1_263_616), "1234 KB");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify_mime("video/mp4"), MediaType::Video);
        assert_eq!(classify_mime("image/png"), MediaType::Image);
        assert_eq!(classify_mime("application/pdf"), MediaType::Image);
        assert_eq!(classify_data_url("data:video/webm;base64,AA"), MediaType::Video);
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for(Some("clip.MOV"), "video/quicktime", MediaType::Video), "mov");
        assert_eq!(extension_for(None, "image/jpeg", MediaType::Image), "jpg");
        assert_eq!(extension_for(None, "image/svg+xml", MediaType::Image), "svg");
        assert_eq!(extension_for(None, "", MediaType::Video), "mp4");
    }

    #[test]
    fn test_parse_data_url() {
        assert_eq!(parse_data_url("data:image/png;base64,AAAA"), Some(("image/png", "AAAA")));
        assert_eq!(parse_data_url("data:image/png,AAAA"), None);
        assert_eq!(parse_data_url("https://example.com/a.png"), None);
    }

    #[tokio::test]
    async fn test_data_url_goes_to_remote() {
        let store = Arc::new(RecordingStore::default());
        let (pipeline, _dir) = pipeline(Some(store.clone()), "10").await;

        let media = pipeline
            .ingest(MediaSource::DataUrl(data_url("image/png", &[7u8; 2048])), "article")
            .await
            .unwrap();

        assert!(media.url.starts_with("https://cdn.test/article-"));
        assert!(media.url.ends_with(".png"));
        assert_eq!(media.size_bytes, 2048);
        assert_eq!(media.size_label(), "2 KB");
        let puts = store.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].2, "image/png");
    }

    #[tokio::test]
    async fn test_oversized_base64_rejected_before_storage() {
        let store = Arc::new(RecordingStore::default());
        let (pipeline, _dir) = pipeline(Some(store.clone()), "1").await;

        // ~1.5MB decoded
        let payload = "A".repeat(2 * 1024 * 1024);
        let err = pipeline
            .ingest(
                MediaSource::DataUrl(format!("data:image/png;base64,{}", payload)),
                "gallery",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::TooLarge { class: "images", .. }));
        assert_eq!(
            err.to_string(),
            "Upload size limit exceeded: 1.50MB exceeds the 1MB limit for images"
        );
        assert!(store.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_temp_file_is_deleted() {
        let (pipeline, dir) = pipeline(None, "0.001").await;
        let path = dir.path().join("media-1.png");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();

        let err = pipeline
            .ingest(
                MediaSource::TempFile {
                    stored_name: "media-1.png".into(),
                    original_name: Some("photo.png".into()),
                    content_type: "image/png".into(),
                    size: 4096,
                },
                "gallery",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::TooLarge { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_temp_file_uploaded_and_removed() {
        let store = Arc::new(RecordingStore::default());
        let (pipeline, dir) = pipeline(Some(store.clone()), "10").await;
        let path = dir.path().join("media-2.mp4");
        std::fs::write(&path, vec![1u8; 100]).unwrap();

        let media = pipeline
            .ingest(
                MediaSource::TempFile {
                    stored_name: "media-2.mp4".into(),
                    original_name: Some("clip.mp4".into()),
                    content_type: "video/mp4".into(),
                    size: 100,
                },
                "media",
            )
            .await
            .unwrap();

        assert_eq!(media.media_type, MediaType::Video);
        assert!(media.url.starts_with("https://cdn.test/media-"));
        assert!(media.url.ends_with(".mp4"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local_file() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let (pipeline, dir) = pipeline(Some(store), "10").await;
        std::fs::write(dir.path().join("media-3.jpg"), vec![1u8; 10]).unwrap();

        let media = pipeline
            .ingest(
                MediaSource::TempFile {
                    stored_name: "media-3.jpg".into(),
                    original_name: None,
                    content_type: "image/jpeg".into(),
                    size: 10,
                },
                "media",
            )
            .await
            .unwrap();

        assert_eq!(media.url, "http://localhost:3000/uploads/media-3.jpg");
        assert!(dir.path().join("media-3.jpg").exists());
    }

    #[tokio::test]
    async fn test_unconfigured_base64_written_locally() {
        let (pipeline, dir) = pipeline(None, "10").await;

        let media = pipeline
            .ingest(MediaSource::DataUrl(data_url("image/gif", b"GIF89a")), "category")
            .await
            .unwrap();

        let file = media
            .url
            .strip_prefix("http://localhost:3000/uploads/")
            .unwrap();
        assert!(file.starts_with("category-") && file.ends_with(".gif"));
        assert_eq!(std::fs::read(dir.path().join(file)).unwrap(), b"GIF89a");
    }

    #[tokio::test]
    async fn test_invalid_base64_rejected() {
        let (pipeline, _dir) = pipeline(None, "10").await;
        let err = pipeline
            .ingest(MediaSource::DataUrl("data:image/png;base64,@@@".into()), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidDataUrl));
    }

    #[tokio::test]
    async fn test_resolve_inline_image_passthrough() {
        let store = Arc::new(RecordingStore::default());
        let (pipeline, _dir) = pipeline(Some(store.clone()), "10").await;

        let url = pipeline
            .resolve_inline_image("https://example.com/a.png", "article")
            .await
            .unwrap();
        assert_eq!(url, "https://example.com/a.png");
        assert!(store.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_process_content_images() {
        let store = Arc::new(RecordingStore::default());
        let (pipeline, _dir) = pipeline(Some(store.clone()), "10").await;

        let html = format!(
            r#"<p>a</p><img src="{}"><p>b</p><img alt="x" src="{}"><img src="https://keep.me/c.png">"#,
            data_url("image/png", b"one"),
            data_url("image/jpeg", b"two"),
        );
        let out = pipeline.process_content_images(&html).await.unwrap();

        assert!(!out.contains("base64"));
        assert_eq!(out.matches("https://cdn.test/content-").count(), 2);
        assert!(out.contains(r#"src="https://keep.me/c.png""#));
        assert!(out.starts_with("<p>a</p><img src=\"https://cdn.test/content-"));
        assert_eq!(store.puts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_process_content_images_without_images() {
        let (pipeline, _dir) = pipeline(None, "10").await;
        let html = "<p>plain</p>";
        assert_eq!(pipeline.process_content_images(html).await.unwrap(), html);
    }
}
