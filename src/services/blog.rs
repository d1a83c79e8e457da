//! Blog service
//!
//! Blog posts share the article lifecycle but carry fewer editorial fields.
//! Slugs keep Devanagari, the category is optional and tags are matched by
//! name.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::db::is_unique_violation;
use crate::db::repositories::{BlogRepository, UserRepository};
use crate::models::{
    AuthorSummary, Blog, BlogChanges, BlogFilter, Category, ContentStatus, Language, NewBlog,
    PublishState, ReadContext, StatusChange, Tag, TagTarget,
};
use crate::services::category::{CategoryService, CategoryServiceError};
use crate::services::ingest::{IngestError, MediaPipeline};
use crate::services::slug::{insert_with_unique_slug, resolve_slug, SlugError, SlugKind};
use crate::services::tag::{TagService, TagServiceError};

const IMAGE_KEY_CATEGORY: &str = "blog";

const INVALID_CATEGORY: &str = "Please select a valid category.";

#[derive(Debug, thiserror::Error)]
pub enum BlogServiceError {
    #[error("Blog not found")]
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

impl From<SlugError> for BlogServiceError {
    fn from(err: SlugError) -> Self {
        match err {
            SlugError::Duplicate { .. } => BlogServiceError::DuplicateSlug(err.to_string()),
            SlugError::Insert(e) => BlogServiceError::InternalError(e),
        }
    }
}

impl From<TagServiceError> for BlogServiceError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::DuplicateSlug(msg) => BlogServiceError::DuplicateSlug(msg),
            TagServiceError::InternalError(e) => BlogServiceError::InternalError(e),
        }
    }
}

impl From<CategoryServiceError> for BlogServiceError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::InternalError(e) => BlogServiceError::InternalError(e),
            other => BlogServiceError::InternalError(anyhow::anyhow!(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogView {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub short_description: Option<String>,
    pub image: Option<String>,
    pub views: i64,
    pub status: ContentStatus,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub language: Language,
    pub category_id: Option<i64>,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category: Option<Category>,
    pub author: Option<AuthorSummary>,
    pub tags: Vec<Tag>,
}

impl BlogView {
    fn new(blog: Blog, category: Option<Category>, author: Option<AuthorSummary>, tags: Vec<Tag>) -> Self {
        Self {
            id: blog.id,
            title: blog.title,
            slug: blog.slug,
            content: blog.content,
            short_description: blog.short_description,
            image: blog.image,
            views: blog.views,
            status: blog.state.status(),
            published: blog.state.is_published(),
            published_at: blog.state.published_at(),
            scheduled_at: blog.state.scheduled_at(),
            language: blog.language,
            category_id: blog.category_id,
            author_id: blog.author_id,
            created_at: blog.created_at,
            updated_at: blog.updated_at,
            category,
            author,
            tags,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateBlogInput {
    pub title: String,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub short_description: Option<String>,
    pub image: Option<String>,
    pub category_id: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub status: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBlogInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub short_description: Option<Option<String>>,
    pub image: Option<Option<String>>,
    /// `Some(None)` disconnects the category
    pub category_id: Option<Option<i64>>,
    pub tags: Option<Vec<String>>,
    pub status: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
}

pub struct BlogService {
    repo: Arc<dyn BlogRepository>,
    users: Arc<dyn UserRepository>,
    tags: Arc<TagService>,
    categories: Arc<CategoryService>,
    pipeline: Arc<MediaPipeline>,
}

impl BlogService {
    pub fn new(
        repo: Arc<dyn BlogRepository>,
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

    pub async fn list(&self, filter: &BlogFilter) -> Result<Vec<BlogView>, BlogServiceError> {
        self.promote_due().await;
        let blogs = self.repo.list(filter).await.context("Failed to list blogs")?;
        if blogs.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = blogs.iter().map(|b| b.id).collect();
        let author_ids: Vec<i64> = blogs
            .iter()
            .map(|b| b.author_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let (mut tags, authors, categories) = tokio::try_join!(
            async {
                self.tags
                    .get_for_many(TagTarget::Blog, &ids)
                    .await
                    .map_err(BlogServiceError::from)
            },
            async {
                self.users
                    .get_by_ids(&author_ids)
                    .await
                    .context("Failed to load authors")
                    .map_err(BlogServiceError::from)
            },
            self.category_index(),
        )?;

        Ok(blogs
            .into_iter()
            .map(|blog| {
                let category = blog.category_id.and_then(|id| categories.get(&id).cloned());
                let author = authors.get(&blog.author_id).map(|u| u.summary());
                let tags = tags.remove(&blog.id).unwrap_or_default();
                BlogView::new(blog, category, author, tags)
            })
            .collect())
    }

    pub async fn get(&self, slug: &str, ctx: ReadContext) -> Result<BlogView, BlogServiceError> {
        self.promote_due().await;
        let blog = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get blog")?
            .ok_or_else(|| BlogServiceError::NotFound(slug.to_string()))?;

        if !ctx.is_preview {
            let repo = Arc::clone(&self.repo);
            let id = blog.id;
            tokio::spawn(async move {
                if let Err(e) = repo.increment_views(id).await {
                    tracing::warn!(blog_id = id, "Failed to count blog view: {:#}", e);
                }
            });
        }

        self.view(blog).await
    }

    pub async fn create(&self, input: CreateBlogInput, author_id: i64) -> Result<BlogView, BlogServiceError> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(BlogServiceError::ValidationError("Title is required".to_string()));
        }
        if let Some(id) = input.category_id {
            self.require_category(id).await?;
        }

        let language = parse_language(input.language.as_deref())?;
        let state = match StatusChange::from_request(input.status.as_deref(), input.scheduled_at)
            .map_err(BlogServiceError::ValidationError)?
        {
            Some(change) => PublishState::default().transition(change, Utc::now()),
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

        let slug = resolve_slug(input.slug.as_deref(), &title, SlugKind::Blog);
        let new_blog = NewBlog {
            slug: slug.clone(),
            title,
            content,
            short_description: input.short_description,
            image,
            state,
            language,
            category_id: input.category_id,
            author_id,
        };

        let blog = insert_with_unique_slug(SlugKind::Blog, &slug, |slug| {
            let blog = NewBlog {
                slug,
                ..new_blog.clone()
            };
            async move { self.repo.create(&blog).await }
        })
        .await?;

        if let Some(names) = input.tags {
            self.tags.replace_for(TagTarget::Blog, blog.id, &names).await?;
        }

        tracing::info!(id = blog.id, slug = %blog.slug, author_id, "Blog created");
        self.view(blog).await
    }

    pub async fn update(&self, id: i64, input: UpdateBlogInput) -> Result<BlogView, BlogServiceError> {
        let mut blog = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get blog")?
            .ok_or_else(|| BlogServiceError::NotFound(id.to_string()))?;

        if let Some(title) = &input.title {
            if title.trim().is_empty() {
                return Err(BlogServiceError::ValidationError("Title is required".to_string()));
            }
        }
        if let Some(Some(category_id)) = input.category_id {
            self.require_category(category_id).await?;
        }

        let state = StatusChange::from_request(input.status.as_deref(), input.scheduled_at)
            .map_err(BlogServiceError::ValidationError)?
            .map(|change| blog.state.transition(change, Utc::now()));
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

        blog.apply(BlogChanges {
            title: input.title.map(|t| t.trim().to_string()),
            slug: input.slug.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            content,
            short_description: input.short_description,
            image,
            state,
            language,
            category_id: input.category_id,
        });

        let updated = match self.repo.update(&blog).await {
            Ok(Some(updated)) => updated,
            Ok(None) => return Err(BlogServiceError::NotFound(id.to_string())),
            Err(e) if is_unique_violation(&e) => {
                return Err(SlugError::Duplicate {
                    entity: SlugKind::Blog.entity(),
                    slug: blog.slug,
                }
                .into())
            }
            Err(e) => return Err(e.context("Failed to update blog").into()),
        };

        if let Some(names) = input.tags {
            self.tags.replace_for(TagTarget::Blog, id, &names).await?;
        }

        self.view(updated).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), BlogServiceError> {
        if !self.repo.delete(id).await.context("Failed to delete blog")? {
            return Err(BlogServiceError::NotFound(id.to_string()));
        }
        tracing::info!(id, "Blog deleted");
        Ok(())
    }

    async fn promote_due(&self) {
        match self.repo.promote_due(Utc::now()).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "Published scheduled blogs"),
            Err(e) => tracing::warn!("Failed to promote scheduled blogs: {:#}", e),
        }
    }

    async fn require_category(&self, id: i64) -> Result<(), BlogServiceError> {
        match self.categories.get(id).await {
            Ok(_) => Ok(()),
            Err(CategoryServiceError::NotFound(_)) => {
                Err(BlogServiceError::ValidationError(INVALID_CATEGORY.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn category_index(&self) -> Result<HashMap<i64, Category>, BlogServiceError> {
        Ok(self
            .categories
            .list()
            .await?
            .into_iter()
            .map(|c| (c.category.id, c.category))
            .collect())
    }

    async fn view(&self, blog: Blog) -> Result<BlogView, BlogServiceError> {
        let tags = self.tags.get_for(TagTarget::Blog, blog.id).await?;
        let author = self
            .users
            .get_by_id(blog.author_id)
            .await
            .context("Failed to load author")?;
        let category = match blog.category_id {
            Some(id) => self.category_index().await?.remove(&id),
            None => None,
        };
        Ok(BlogView::new(blog, category, author.map(|u| u.summary()), tags))
    }
}

fn parse_language(value: Option<&str>) -> Result<Language, BlogServiceError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.parse().map_err(BlogServiceError::ValidationError),
        None => Ok(Language::default()),
    }
}
