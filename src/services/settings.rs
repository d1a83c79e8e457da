//! Settings service
//!
//! Site settings are read through an immutable, versioned snapshot. The
//! snapshot is loaded at startup and swapped atomically after every write,
//! so request handlers never query the settings table themselves.

use anyhow::Context;
use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::db::repositories::SettingsRepository;
use crate::models::MediaType;

/// Known setting keys
pub mod keys {
    pub const SITE_TITLE: &str = "site_title";
    pub const MAX_IMAGE_UPLOAD_SIZE: &str = "max_image_upload_size";
    pub const MAX_VIDEO_UPLOAD_SIZE: &str = "max_video_upload_size";
}

pub const DEFAULT_IMAGE_LIMIT_MB: f64 = 10.0;
pub const DEFAULT_VIDEO_LIMIT_MB: f64 = 500.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Per-class upload size limits, in megabytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadLimits {
    pub image_mb: f64,
    pub video_mb: f64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            image_mb: DEFAULT_IMAGE_LIMIT_MB,
            video_mb: DEFAULT_VIDEO_LIMIT_MB,
        }
    }
}

impl UploadLimits {
    /// Read limits from raw setting values, falling back to the defaults for
    /// missing, unparsable, non-finite or non-positive values.
    pub fn from_values(values: &BTreeMap<String, String>) -> Self {
        Self {
            image_mb: parse_limit(values, keys::MAX_IMAGE_UPLOAD_SIZE, DEFAULT_IMAGE_LIMIT_MB),
            video_mb: parse_limit(values, keys::MAX_VIDEO_UPLOAD_SIZE, DEFAULT_VIDEO_LIMIT_MB),
        }
    }

    pub fn limit_mb(&self, media_type: MediaType) -> f64 {
        match media_type {
            MediaType::Image => self.image_mb,
            MediaType::Video => self.video_mb,
        }
    }

    pub fn limit_bytes(&self, media_type: MediaType) -> u64 {
        (self.limit_mb(media_type) * BYTES_PER_MB) as u64
    }
}

fn parse_limit(values: &BTreeMap<String, String>, key: &str, default: f64) -> f64 {
    let Some(raw) = values.get(key) else {
        return default;
    };
    match raw.trim().parse::<f64>() {
        Ok(mb) if mb.is_finite() && mb > 0.0 => mb,
        _ => {
            tracing::warn!(key, value = %raw, "Invalid upload limit, using default of {}MB", default);
            default
        }
    }
}

/// Immutable view of all settings at one point in time
#[derive(Debug, Clone, Default)]
pub struct SettingsSnapshot {
    /// Bumped on every reload
    pub version: u64,
    pub values: BTreeMap<String, String>,
    pub upload_limits: UploadLimits,
}

impl SettingsSnapshot {
    pub fn from_values(version: u64, values: BTreeMap<String, String>) -> Self {
        let upload_limits = UploadLimits::from_values(&values);
        Self {
            version,
            values,
            upload_limits,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

#[derive(Debug, Error)]
pub enum SettingsServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    snapshot: ArcSwap<SettingsSnapshot>,
}

impl SettingsService {
    /// Create the service and load the first snapshot.
    pub async fn load(repo: Arc<dyn SettingsRepository>) -> anyhow::Result<Self> {
        let service = Self {
            repo,
            snapshot: ArcSwap::from_pointee(SettingsSnapshot::default()),
        };
        service.reload().await?;
        Ok(service)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<SettingsSnapshot> {
        self.snapshot.load_full()
    }

    pub fn upload_limits(&self) -> UploadLimits {
        self.snapshot.load().upload_limits
    }

    /// Re-read every setting and publish a new snapshot.
    pub async fn reload(&self) -> anyhow::Result<Arc<SettingsSnapshot>> {
        let values: BTreeMap<String, String> = self
            .repo
            .get_all()
            .await
            .context("Failed to load settings")?
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect();

        let version = self.snapshot.load().version + 1;
        let snapshot = Arc::new(SettingsSnapshot::from_values(version, values));
        self.snapshot.store(snapshot.clone());
        tracing::debug!(version, "Settings snapshot loaded");
        Ok(snapshot)
    }

    /// Upsert settings and reload the snapshot.
    pub async fn update(
        &self,
        values: BTreeMap<String, String>,
    ) -> Result<Arc<SettingsSnapshot>, SettingsServiceError> {
        if values.keys().any(|k| k.trim().is_empty()) {
            return Err(SettingsServiceError::ValidationError(
                "Setting keys must not be empty".to_string(),
            ));
        }
        if values.is_empty() {
            return Ok(self.snapshot());
        }

        self.repo
            .set_many(&values)
            .await
            .context("Failed to save settings")?;
        Ok(self.reload().await?)
    }
}
