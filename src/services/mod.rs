//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They own
//! validation, slug resolution, media ingestion, caching and the content
//! lifecycle.

pub mod article;
pub mod blog;
pub mod category;
pub mod ingest;
pub mod media;
pub mod password;
pub mod search;
pub mod settings;
pub mod slug;
pub mod storage;
pub mod tag;
pub mod user;

pub use article::{ArticleService, ArticleServiceError, ArticleView};
pub use blog::{BlogService, BlogServiceError, BlogView};
pub use category::{CategoryService, CategoryServiceError, CreateCategoryInput};
pub use ingest::{IngestError, MediaPipeline, MediaSource};
pub use media::{MediaService, MediaServiceError};
pub use password::{hash_password, verify_password};
pub use search::{SearchResults, SearchService};
pub use settings::{SettingsService, SettingsServiceError, SettingsSnapshot, UploadLimits};
pub use slug::{insert_with_unique_slug, slugify, SlugKind};
pub use storage::{LocalUploads, ObjectStore, R2ObjectStore};
pub use tag::{TagService, TagServiceError};
pub use user::{LoginInput, UserService, UserServiceError};
