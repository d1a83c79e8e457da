//! Article service
//!
//! Business logic for news articles:
//! - list and detail views with category, author and tags attached
//! - create and partial update, with inline images moved to storage
//! - publish toggling through the single lifecycle transition
//! - reader view counting
//!
//! Scheduled articles whose time has come are promoted before every public
//! read, so readers never see a stale schedule.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::db::is_unique_violation;
use crate::db::repositories::{ArticleRepository, UserRepository};
use crate::models::{
    Article, ArticleChanges, ArticleFilter, AuthorSummary, CategoryWithParent, ContentStatus,
    Language, NewArticle, PublishState, ReadContext, StatusChange, Tag, TagTarget,
    DEFAULT_PRIORITY,
};
use crate::services::category::{CategoryService, CategoryServiceError};
use crate::services::ingest::{IngestError, MediaPipeline};
use crate::services::slug::{insert_with_unique_slug, resolve_slug, SlugError, SlugKind};
use crate::services::tag::{TagService, TagServiceError};

/// Key category for featured images
const IMAGE_KEY_CATEGORY: &str = "article";

const INVALID_CATEGORY: &str = "Please select a valid category.";

#[derive(Debug, thiserror::Error)]
pub enum ArticleServiceError {
    #[error("Article not found")]
    NotFound(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    DuplicateSlug(String),

    #[error(transparent)]
    Media(#[from] IngestError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<SlugError> for ArticleServiceError {
    fn from(err: SlugError) -> Self {
        match err {
            SlugError::Duplicate { .. } => ArticleServiceError::DuplicateSlug(err.to_string()),
            SlugError::Insert(e) => ArticleServiceError::InternalError(e),
        }
    }
}

impl From<TagServiceError> for ArticleServiceError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::DuplicateSlug(msg) => ArticleServiceError::DuplicateSlug(msg),
            TagServiceError::InternalError(e) => ArticleServiceError::InternalError(e),
        }
    }
}

impl From<CategoryServiceError> for ArticleServiceError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::InternalError(e) => ArticleServiceError::InternalError(e),
            other => ArticleServiceError::InternalError(anyhow::anyhow!(other.to_string())),
        }
    }
}

/// Article as returned by the API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleView {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub short_description: Option<String>,
    pub image: Option<String>,
    pub video_url: Option<String>,
    pub views: i64,
    pub status: ContentStatus,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub language: Language,
    pub is_featured: bool,
    pub is_trending: bool,
    pub is_breaking: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub metadata: serde_json::Value,
    pub priority: String,
    pub category_id: i64,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category: Option<CategoryWithParent>,
    pub author: Option<AuthorSummary>,
    pub tags: Vec<Tag>,
}

impl ArticleView {
    fn new(
        article: Article,
        category: Option<CategoryWithParent>,
        author: Option<AuthorSummary>,
        tags: Vec<Tag>,
    ) -> Self {
        Self {
            id: article.id,
            title: article.title,
            slug: article.slug,
            content: article.content,
            short_description: article.short_description,
            image: article.image,
            video_url: article.video_url,
            views: article.views,
            status: article.state.status(),
            published: article.state.is_published(),
            published_at: article.state.published_at(),
            scheduled_at: article.state.scheduled_at(),
            language: article.language,
            is_featured: article.is_featured,
            is_trending: article.is_trending,
            is_breaking: article.is_breaking,
            meta_title: article.meta_title,
            meta_description: article.meta_description,
            meta_keywords: article.meta_keywords,
            metadata: article.metadata,
            priority: article.priority,
            category_id: article.category_id,
            author_id: article.author_id,
            created_at: article.created_at,
            updated_at: article.updated_at,
            category,
            author,
            tags,
        }
    }
}

/// Result of a publish toggle
#[derive(Debug, Clone, Serialize)]
pub struct ToggleResult {
    pub message: String,
    pub published: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CreateArticleInput {
    pub title: String,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub short_description: Option<String>,
    pub image: Option<String>,
    pub video_url: Option<String>,
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

/// Partial update. Absent fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct UpdateArticleInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub short_description: Option<Option<String>>,
    pub image: Option<Option<String>>,
    pub video_url: Option<Option<String>>,
    /// `Some(None)` is an explicit null, which articles reject
    pub category_id: Option<Option<i64>>,
    pub tags: Option<Vec<String>>,
    pub is_featured: Option<bool>,
    pub is_trending: Option<bool>,
    pub is_breaking: Option<bool>,
    pub meta_title: Option<Option<String>>,
    pub meta_description: Option<Option<String>>,
    pub meta_keywords: Option<Option<String>>,
    pub metadata: Option<serde_json::Value>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
}

pub struct ArticleService {
    repo: Arc<dyn ArticleRepository>,
    users: Arc<dyn UserRepository>,
    tags: Arc<TagService>,
    categories: Arc<CategoryService>,
    pipeline: Arc<MediaPipeline>,
}

impl ArticleService {
    pub fn new(
        repo: Arc<dyn ArticleRepository>,
        users: Arc<dyn UserRepository>,
        tags: Arc<TagService>,
        categories: Arc<CategoryService>,
        pipeline: Arc<MediaPipeline>,
    ) -> Self {
        Self {
            repo,
            users,
            tags,
            categories,
            pipeline,
        }
    }

    pub async fn list(&self, filter: &ArticleFilter) -> Result<Vec<ArticleView>, ArticleServiceError> {
        self.promote_due().await;
        let articles = self.repo.list(filter).await.context("Failed to list articles")?;
        self.views(articles).await
    }

    /// Look an article up by id (all digits) or slug.
    ///
    /// Reader requests bump the view counter in the background; the response
    /// carries the count as it was read.
    pub async fn get(&self, slug_or_id: &str, ctx: ReadContext) -> Result<ArticleView, ArticleServiceError> {
        self.promote_due().await;

        let article = if !slug_or_id.is_empty() && slug_or_id.bytes().all(|b| b.is_ascii_digit()) {
            match slug_or_id.parse::<i64>() {
                Ok(id) => self.repo.get_by_id(id).await,
                Err(_) => Ok(None),
            }
        } else {
            self.repo.get_by_slug(slug_or_id).await
        }
        .context("Failed to get article")?
        .ok_or_else(|| ArticleServiceError::NotFound(slug_or_id.to_string()))?;

        if !ctx.is_preview {
            let repo = Arc::clone(&self.repo);
            let id = article.id;
            tokio::spawn(async move {
                if let Err(e) = repo.increment_views(id).await {
                    tracing::warn!(article_id = id, "Failed to count article view: {:#}", e);
                }
            });
        }

        self.detail_view(article).await
    }

    pub async fn create(&self, input: CreateArticleInput, author_id: i64) -> Result<ArticleView, ArticleServiceError> {
        let category_id = self.require_category(input.category_id).await?;

        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(ArticleServiceError::ValidationError("Title is required".to_string()));
        }

        let language = parse_language(input.language.as_deref())?;
        let now = Utc::now();
        let state = match StatusChange::from_request(input.status.as_deref(), input.scheduled_at)
            .map_err(ArticleServiceError::ValidationError)?
        {
            Some(change) => PublishState::default().transition(change, now),
            None => PublishState::default(),
        };

        let image = self
            .pipeline
            .resolve_optional_image(input.image, IMAGE_KEY_CATEGORY)
            .await?;
        let content = match input.content {
            Some(content) => self.pipeline.process_content_images(&content).await?,
            None => String::new(),
        };

        let slug = resolve_slug(input.slug.as_deref(), &title, SlugKind::Article);
        let new_article = NewArticle {
            slug: slug.clone(),
            title,
            content,
            short_description: input.short_description,
            image,
            video_url: input.video_url,
            state,
            language,
            is_featured: input.is_featured.unwrap_or(false),
            is_trending: input.is_trending.unwrap_or(false),
            is_breaking: input.is_breaking.unwrap_or(false),
            meta_title: input.meta_title,
            meta_description: input.meta_description,
            meta_keywords: input.meta_keywords,
            metadata: input.metadata.unwrap_or_else(|| serde_json::json!({})),
            priority: input
                .priority
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PRIORITY.to_string()),
            category_id,
            author_id,
        };

        let article = insert_with_unique_slug(SlugKind::Article, &slug, |slug| {
            let article = NewArticle {
                slug,
                ..new_article.clone()
            };
            async move { self.repo.create(&article).await }
        })
        .await?;

        if let Some(names) = input.tags {
            self.tags.replace_for(TagTarget::Article, article.id, &names).await?;
        }

        tracing::info!(id = article.id, slug = %article.slug, author_id, "Article created");
        self.detail_view(article).await
    }

    pub async fn update(&self, id: i64, input: UpdateArticleInput) -> Result<ArticleView, ArticleServiceError> {
        let mut article = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get article")?
            .ok_or_else(|| ArticleServiceError::NotFound(id.to_string()))?;

        let category_id = match input.category_id {
            Some(requested) => Some(self.require_category(requested).await?),
            None => None,
        };

        if let Some(title) = &input.title {
            if title.trim().is_empty() {
                return Err(ArticleServiceError::ValidationError("Title is required".to_string()));
            }
        }

        let state = StatusChange::from_request(input.status.as_deref(), input.scheduled_at)
            .map_err(ArticleServiceError::ValidationError)?
            .map(|change| article.state.transition(change, Utc::now()));

        let language = match input.language.as_deref() {
            Some(lang) => Some(parse_language(Some(lang))?),
            None => None,
        };

        let image = match input.image {
            Some(Some(image)) => Some(Some(
                self.pipeline.resolve_inline_image(&image, IMAGE_KEY_CATEGORY).await?,
            )),
            other => other,
        };
        let content = match input.content {
            Some(content) => Some(self.pipeline.process_content_images(&content).await?),
            None => None,
        };

        article.apply(ArticleChanges {
            title: input.title.map(|t| t.trim().to_string()),
            slug: input.slug.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            content,
            short_description: input.short_description,
            image,
            video_url: input.video_url,
            state,
            language,
            is_featured: input.is_featured,
            is_trending: input.is_trending,
            is_breaking: input.is_breaking,
            meta_title: input.meta_title,
            meta_description: input.meta_description,
            meta_keywords: input.meta_keywords,
            metadata: input.metadata,
            priority: input.priority.filter(|p| !p.trim().is_empty()),
            category_id,
        });

        let updated = match self.repo.update(&article).await {
            Ok(Some(updated)) => updated,
            Ok(None) => return Err(ArticleServiceError::NotFound(id.to_string())),
            Err(e) if is_unique_violation(&e) => {
                return Err(SlugError::Duplicate {
                    entity: SlugKind::Article.entity(),
                    slug: article.slug,
                }
                .into())
            }
            Err(e) => return Err(e.context("Failed to update article").into()),
        };

        if let Some(names) = input.tags {
            self.tags.replace_for(TagTarget::Article, id, &names).await?;
        }

        tracing::info!(id, "Article updated");
        self.detail_view(updated).await
    }

    /// Flip between published and draft.
    pub async fn toggle(&self, id: i64) -> Result<ToggleResult, ArticleServiceError> {
        let mut article = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get article")?
            .ok_or_else(|| ArticleServiceError::NotFound(id.to_string()))?;

        article.state = article.state.toggled(Utc::now());
        article.updated_at = Utc::now();
        let updated = self
            .repo
            .update(&article)
            .await
            .context("Failed to toggle article")?
            .ok_or_else(|| ArticleServiceError::NotFound(id.to_string()))?;

        let published = updated.state.is_published();
        Ok(ToggleResult {
            message: format!(
                "Article {}",
                if published { "activated" } else { "deactivated" }
            ),
            published,
        })
    }

    pub async fn delete(&self, id: i64) -> Result<(), ArticleServiceError> {
        if !self.repo.delete(id).await.context("Failed to delete article")? {
            return Err(ArticleServiceError::NotFound(id.to_string()));
        }
        tracing::info!(id, "Article deleted");
        Ok(())
    }

    async fn promote_due(&self) {
        match self.repo.promote_due(Utc::now()).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "Published scheduled articles"),
            Err(e) => tracing::warn!("Failed to promote scheduled articles: {:#}", e),
        }
    }

    /// The category must be given and must exist.
    async fn require_category(&self, category_id: Option<i64>) -> Result<i64, ArticleServiceError> {
        let id = category_id
            .ok_or_else(|| ArticleServiceError::ValidationError(INVALID_CATEGORY.to_string()))?;
        match self.categories.get(id).await {
            Ok(_) => Ok(id),
            Err(CategoryServiceError::NotFound(_)) => {
                Err(ArticleServiceError::ValidationError(INVALID_CATEGORY.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn category_index(&self) -> Result<HashMap<i64, CategoryWithParent>, ArticleServiceError> {
        Ok(self
            .categories
            .list()
            .await?
            .into_iter()
            .map(|c| (c.category.id, c))
            .collect())
    }

    async fn views(&self, articles: Vec<Article>) -> Result<Vec<ArticleView>, ArticleServiceError> {
        if articles.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
        let author_ids: Vec<i64> = articles
            .iter()
            .map(|a| a.author_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let (mut tags, authors, categories) = tokio::try_join!(
            async {
                self.tags
                    .get_for_many(TagTarget::Article, &ids)
                    .await
                    .map_err(ArticleServiceError::from)
            },
            async {
                self.users
                    .get_by_ids(&author_ids)
                    .await
                    .context("Failed to load authors")
                    .map_err(ArticleServiceError::from)
            },
            self.category_index(),
        )?;

        Ok(articles
            .into_iter()
            .map(|article| {
                let category = categories.get(&article.category_id).cloned();
                let author = authors.get(&article.author_id).map(|u| u.summary());
                let tags = tags.remove(&article.id).unwrap_or_default();
                ArticleView::new(article, category, author, tags)
            })
            .collect())
    }

    async fn detail_view(&self, article: Article) -> Result<ArticleView, ArticleServiceError> {
        let (tags, author, categories) = tokio::try_join!(
            async {
                self.tags
                    .get_for(TagTarget::Article, article.id)
                    .await
                    .map_err(ArticleServiceError::from)
            },
            async {
                self.users
                    .get_by_id(article.author_id)
                    .await
                    .context("Failed to load author")
                    .map_err(ArticleServiceError::from)
            },
            self.category_index(),
        )?;
        let category = categories.get(&article.category_id).cloned();
        Ok(ArticleView::new(
            article,
            category,
            author.map(|u| u.profile()),
            tags,
        ))
    }
}

fn parse_language(value: Option<&str>) -> Result<Language, ArticleServiceError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.parse().map_err(ArticleServiceError::ValidationError),
        None => Ok(Language::default()),
    }
}
