//! Category service
//!
//! Categories are small and read on nearly every page, so the list is cached
//! in memory and dropped on any category write.
//!
//! A category cannot be deleted while it still has sub-categories or
//! articles; both are checked before anything is touched.

use crate::cache::{Cache, CacheLayer};
use crate::db::is_unique_violation;
use crate::db::repositories::{ArticleRepository, CategoryRepository};
use crate::models::{Category, CategoryChanges, CategorySummary, CategoryWithParent, NewCategory};
use crate::services::ingest::{IngestError, MediaPipeline};
use crate::services::slug::{insert_with_unique_slug, resolve_slug, SlugError, SlugKind};
use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const CATEGORY_CACHE_TTL_SECS: u64 = 600;

/// Key category for uploaded category images
const IMAGE_KEY_CATEGORY: &str = "category";

const CACHE_KEY_CATEGORY_LIST: &str = "categories:list";
const CACHE_PATTERN_ALL: &str = "categories:*";

#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category not found")]
    NotFound(i64),

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    DuplicateSlug(String),

    #[error("Cannot delete category with sub-categories. Delete children first.")]
    HasChildren,

    #[error("Cannot delete category that has articles. Move articles first.")]
    HasArticles,

    #[error(transparent)]
    Media(#[from] IngestError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<SlugError> for CategoryServiceError {
    fn from(err: SlugError) -> Self {
        match err {
            SlugError::Duplicate { .. } => CategoryServiceError::DuplicateSlug(err.to_string()),
            SlugError::Insert(e) => CategoryServiceError::InternalError(e),
        }
    }
}

/// Input for creating a category
#[derive(Debug, Clone, Default)]
pub struct CreateCategoryInput {
    pub name: String,
    pub name_hi: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: Option<i32>,
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    articles: Arc<dyn ArticleRepository>,
    pipeline: Arc<MediaPipeline>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl CategoryService {
    pub fn new(
        repo: Arc<dyn CategoryRepository>,
        articles: Arc<dyn ArticleRepository>,
        pipeline: Arc<MediaPipeline>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            repo,
            articles,
            pipeline,
            cache,
            cache_ttl: Duration::from_secs(CATEGORY_CACHE_TTL_SECS),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// All categories, roots first then by sort order, each with its parent.
    pub async fn list(&self) -> Result<Vec<CategoryWithParent>, CategoryServiceError> {
        if let Some(list) = self
            .cache
            .get::<Vec<CategoryWithParent>>(CACHE_KEY_CATEGORY_LIST)
            .await
            .ok()
            .flatten()
        {
            return Ok(list);
        }

        let categories = self.repo.list().await.context("Failed to list categories")?;
        let summaries: HashMap<i64, CategorySummary> =
            categories.iter().map(|c| (c.id, c.summary())).collect();
        let list: Vec<CategoryWithParent> = categories
            .into_iter()
            .map(|category| CategoryWithParent {
                parent: category.parent_id.and_then(|id| summaries.get(&id).cloned()),
                category,
            })
            .collect();

        let _ = self.cache.set(CACHE_KEY_CATEGORY_LIST, &list, self.cache_ttl).await;
        Ok(list)
    }

    pub async fn get(&self, id: i64) -> Result<CategoryWithParent, CategoryServiceError> {
        self.list()
            .await?
            .into_iter()
            .find(|c| c.category.id == id)
            .ok_or(CategoryServiceError::NotFound(id))
    }

    /// Categories whose English or Hindi name contains `term`
    pub async fn search(&self, term: &str, limit: i64) -> Result<Vec<Category>, CategoryServiceError> {
        Ok(self
            .repo
            .search(term, limit)
            .await
            .context("Failed to search categories")?)
    }

    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category name is required".to_string(),
            ));
        }
        if let Some(parent_id) = input.parent_id {
            self.require_parent(parent_id).await?;
        }

        let image = self
            .pipeline
            .resolve_optional_image(input.image, IMAGE_KEY_CATEGORY)
            .await?;
        let slug = resolve_slug(input.slug.as_deref(), &name, SlugKind::Category);

        let new_category = NewCategory {
            name,
            name_hi: input.name_hi,
            slug: slug.clone(),
            description: input.description,
            image,
            icon: input.icon,
            color: input.color,
            parent_id: input.parent_id,
            sort_order: input.sort_order.unwrap_or(0),
        };

        let created = insert_with_unique_slug(SlugKind::Category, &slug, |slug| {
            let category = NewCategory {
                slug,
                ..new_category.clone()
            };
            async move { self.repo.create(&category).await }
        })
        .await?;

        self.invalidate_cache().await;
        tracing::info!(id = created.id, slug = %created.slug, "Category created");
        Ok(created)
    }

    pub async fn update(&self, id: i64, mut changes: CategoryChanges) -> Result<Category, CategoryServiceError> {
        let mut category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or(CategoryServiceError::NotFound(id))?;

        if changes.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(CategoryServiceError::ValidationError(
                "Category name is required".to_string(),
            ));
        }
        if let Some(Some(parent_id)) = changes.parent_id {
            self.require_parent(parent_id).await?;
            if self.would_create_cycle(id, parent_id).await? {
                return Err(CategoryServiceError::ValidationError(
                    "A category cannot be moved under itself or one of its sub-categories".to_string(),
                ));
            }
        }
        if let Some(Some(image)) = changes.image.take() {
            let image = self.pipeline.resolve_inline_image(&image, IMAGE_KEY_CATEGORY).await?;
            changes.image = Some(Some(image));
        }
        if let Some(slug) = changes.slug.take() {
            let slug = slug.trim().to_string();
            if !slug.is_empty() {
                changes.slug = Some(slug);
            }
        }

        category.apply(changes);
        let updated = match self.repo.update(&category).await {
            Ok(Some(updated)) => updated,
            Ok(None) => return Err(CategoryServiceError::NotFound(id)),
            Err(e) if is_unique_violation(&e) => {
                return Err(CategoryServiceError::DuplicateSlug(
                    SlugError::Duplicate {
                        entity: SlugKind::Category.entity(),
                        slug: category.slug,
                    }
                    .to_string(),
                ))
            }
            Err(e) => return Err(e.context("Failed to update category").into()),
        };

        self.invalidate_cache().await;
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        if self.repo.get_by_id(id).await.context("Failed to get category")?.is_none() {
            return Err(CategoryServiceError::NotFound(id));
        }

        let children = self
            .repo
            .count_children(id)
            .await
            .context("Failed to count sub-categories")?;
        if children > 0 {
            return Err(CategoryServiceError::HasChildren);
        }

        let articles = self
            .articles
            .count_by_category(id)
            .await
            .context("Failed to count category articles")?;
        if articles > 0 {
            return Err(CategoryServiceError::HasArticles);
        }

        if !self.repo.delete(id).await.context("Failed to delete category")? {
            return Err(CategoryServiceError::NotFound(id));
        }
        self.invalidate_cache().await;
        tracing::info!(id, "Category deleted");
        Ok(())
    }

    async fn require_parent(&self, parent_id: i64) -> Result<(), CategoryServiceError> {
        if self
            .repo
            .get_by_id(parent_id)
            .await
            .context("Failed to get parent category")?
            .is_none()
        {
            return Err(CategoryServiceError::ValidationError(format!(
                "Parent category {} does not exist",
                parent_id
            )));
        }
        Ok(())
    }

    /// Walk up from `new_parent_id`; reaching `category_id` means a cycle.
    async fn would_create_cycle(&self, category_id: i64, new_parent_id: i64) -> Result<bool, CategoryServiceError> {
        let parents: HashMap<i64, Option<i64>> = self
            .repo
            .list()
            .await
            .context("Failed to list categories")?
            .into_iter()
            .map(|c| (c.id, c.parent_id))
            .collect();

        let mut current = Some(new_parent_id);
        let mut steps = 0;
        while let Some(id) = current {
            if id == category_id {
                return Ok(true);
            }
            steps += 1;
            if steps > parents.len() {
                // existing data already loops
                return Ok(true);
            }
            current = parents.get(&id).copied().flatten();
        }
        Ok(false)
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_ALL).await {
            tracing::warn!("Failed to invalidate category cache: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{SqlxArticleRepository, SqlxCategoryRepository, SqlxSettingsRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::services::settings::SettingsService;
    use crate::services::storage::LocalUploads;

    struct Fixture {
        service: CategoryService,
        pool: DynDatabasePool,
        _dir: tempfile::TempDir,
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
        let dir = tempfile::TempDir::new().unwrap();
        let pipeline = Arc::new(MediaPipeline::new(
            None,
            LocalUploads::new(dir.path(), "http://localhost:3000"),
            settings,
        ));
        let service = CategoryService::new(
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxArticleRepository::boxed(pool.clone()),
            pipeline,
            Arc::new(MemoryCache::new()),
        );
        Fixture {
            service,
            pool,
            _dir: dir,
        }
    }

    fn named(name: &str) -> CreateCategoryInput {
        CreateCategoryInput {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_derives_slug() {
        let f = setup().await;
        let category = f.service.create(named("State News")).await.unwrap();
        assert_eq!(category.slug, "state-news");
        assert_eq!(category.sort_order, 0);

        let hindi = f.service.create(named("राज्य")).await.unwrap();
        assert!(hindi.slug.starts_with("category-"));
    }

    #[tokio::test]
    async fn test_create_duplicate_name_gets_distinct_slug() {
        let f = setup().await;
        let a = f.service.create(named("Sports")).await.unwrap();
        let b = f.service.create(named("Sports")).await.unwrap();
        assert_ne!(a.slug, b.slug);
    }

    #[tokio::test]
    async fn test_list_includes_parent_and_is_invalidated() {
        let f = setup().await;
        let root = f.service.create(named("India")).await.unwrap();
        assert_eq!(f.service.list().await.unwrap().len(), 1);

        let child = f
            .service
            .create(CreateCategoryInput {
                parent_id: Some(root.id),
                ..named("Chhattisgarh")
            })
            .await
            .unwrap();

        let list = f.service.list().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].category.id, root.id);
        let entry = f.service.get(child.id).await.unwrap();
        assert_eq!(entry.parent.unwrap().slug, "india");

        let json = serde_json::to_value(&list[1]).unwrap();
        assert_eq!(json["parentId"], root.id);
        assert_eq!(json["parent"]["slug"], "india");
    }

    #[tokio::test]
    async fn test_delete_rejected_with_children() {
        let f = setup().await;
        let root = f.service.create(named("India")).await.unwrap();
        f.service
            .create(CreateCategoryInput {
                parent_id: Some(root.id),
                ..named("Raipur")
            })
            .await
            .unwrap();

        let err = f.service.delete(root.id).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot delete category with sub-categories. Delete children first."
        );
        assert!(f.service.get(root.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_rejected_with_articles() {
        let f = setup().await;
        let category = f.service.create(named("Politics")).await.unwrap();
        let db = f.pool.sqlite().unwrap();
        sqlx::query("INSERT INTO users (name, email, password_hash) VALUES ('a', 'a@x.in', 'h')")
            .execute(db)
            .await
            .unwrap();
        sqlx::query("INSERT INTO articles (slug, title, category_id, author_id) VALUES ('a', 'A', ?, 1)")
            .bind(category.id)
            .execute(db)
            .await
            .unwrap();

        let err = f.service.delete(category.id).await.unwrap_err();
        assert!(matches!(err, CategoryServiceError::HasArticles));
    }

    #[tokio::test]
    async fn test_delete_and_not_found() {
        let f = setup().await;
        let category = f.service.create(named("Temp")).await.unwrap();
        f.service.delete(category.id).await.unwrap();
        assert!(matches!(
            f.service.get(category.id).await,
            Err(CategoryServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.delete(category.id).await,
            Err(CategoryServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_partial_and_cycle_guard() {
        let f = setup().await;
        let root = f.service.create(named("India")).await.unwrap();
        let child = f
            .service
            .create(CreateCategoryInput {
                parent_id: Some(root.id),
                ..named("Raipur")
            })
            .await
            .unwrap();

        let updated = f
            .service
            .update(
                child.id,
                CategoryChanges {
                    name_hi: Some(Some("रायपुर".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Raipur");
        assert_eq!(updated.name_hi.as_deref(), Some("रायपुर"));
        assert_eq!(updated.parent_id, Some(root.id));

        let err = f
            .service
            .update(
                root.id,
                CategoryChanges {
                    parent_id: Some(Some(child.id)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CategoryServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_update_to_taken_slug() {
        let f = setup().await;
        f.service.create(named("Sports")).await.unwrap();
        let other = f.service.create(named("Games")).await.unwrap();

        let err = f
            .service
            .update(
                other.id,
                CategoryChanges {
                    slug: Some("sports".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CategoryServiceError::DuplicateSlug(_)));
    }
}
