//! Global search
//!
//! One query fans out to published articles, published blogs and categories.
//! The three lookups run concurrently, after any scheduled content that has
//! come due is published.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::repositories::{ArticleRepository, BlogRepository, UserRepository};
use crate::models::{Category, CategoryWithParent};
use crate::services::category::{CategoryService, CategoryServiceError};

/// Queries shorter than this return nothing
pub const MIN_QUERY_LEN: usize = 2;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 20;
const CATEGORY_LIMIT: i64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum SearchServiceError {
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<CategoryServiceError> for SearchServiceError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::InternalError(e) => SearchServiceError::InternalError(e),
            other => SearchServiceError::InternalError(anyhow::anyhow!(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HitCategory {
    pub name: String,
    pub name_hi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HitAuthor {
    pub name: String,
}

/// An article or blog post in search results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentHit {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub short_description: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub category: Option<HitCategory>,
    pub author: Option<HitAuthor>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryHit {
    pub id: i64,
    pub name: String,
    pub name_hi: Option<String>,
    pub slug: String,
    pub color: Option<String>,
}

impl From<Category> for CategoryHit {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            name: c.name,
            name_hi: c.name_hi,
            slug: c.slug,
            color: c.color,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub articles: Vec<ContentHit>,
    pub blogs: Vec<ContentHit>,
    pub categories: Vec<CategoryHit>,
}

/// Interpret the raw `limit` parameter: default 10, at least 1, at most 20.
pub fn effective_limit(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT)
}

pub struct SearchService {
    articles: Arc<dyn ArticleRepository>,
    blogs: Arc<dyn BlogRepository>,
    users: Arc<dyn UserRepository>,
    categories: Arc<CategoryService>,
}

impl SearchService {
    pub fn new(
        articles: Arc<dyn ArticleRepository>,
        blogs: Arc<dyn BlogRepository>,
        users: Arc<dyn UserRepository>,
        categories: Arc<CategoryService>,
    ) -> Self {
        Self {
            articles,
            blogs,
            users,
            categories,
        }
    }

    pub async fn search(&self, query: &str, limit: i64) -> Result<SearchResults, SearchServiceError> {
        let term = query.trim();
        if term.chars().count() < MIN_QUERY_LEN {
            return Ok(SearchResults::default());
        }
        let take = limit.clamp(1, MAX_LIMIT);
        self.promote_due().await;

        let (articles, blogs, categories, index) = tokio::try_join!(
            async {
                self.articles
                    .search_published(term, take)
                    .await
                    .context("Failed to search articles")
                    .map_err(SearchServiceError::from)
            },
            async {
                self.blogs
                    .search_published(term, take)
                    .await
                    .context("Failed to search blogs")
                    .map_err(SearchServiceError::from)
            },
            async {
                self.categories
                    .search(term, CATEGORY_LIMIT)
                    .await
                    .map_err(SearchServiceError::from)
            },
            async {
                self.categories
                    .list()
                    .await
                    .map_err(SearchServiceError::from)
            },
        )?;

        let mut author_ids: Vec<i64> = articles
            .iter()
            .map(|a| a.author_id)
            .chain(blogs.iter().map(|b| b.author_id))
            .collect();
        author_ids.sort_unstable();
        author_ids.dedup();
        let authors = self
            .users
            .get_by_ids(&author_ids)
            .await
            .context("Failed to load authors")?;

        let index: HashMap<i64, CategoryWithParent> =
            index.into_iter().map(|c| (c.category.id, c)).collect();
        let author_of = |id: i64| authors.get(&id).map(|u| HitAuthor { name: u.name.clone() });

        let articles = articles
            .into_iter()
            .map(|a| ContentHit {
                category: index.get(&a.category_id).map(|c| HitCategory {
                    name: c.category.name.clone(),
                    name_hi: c.category.name_hi.clone(),
                    slug: Some(c.category.slug.clone()),
                }),
                author: author_of(a.author_id),
                id: a.id,
                title: a.title,
                slug: a.slug,
                short_description: a.short_description,
                image: a.image,
                created_at: a.created_at,
            })
            .collect();

        let blogs = blogs
            .into_iter()
            .map(|b| ContentHit {
                category: b.category_id.and_then(|id| index.get(&id)).map(|c| HitCategory {
                    name: c.category.name.clone(),
                    name_hi: c.category.name_hi.clone(),
                    slug: None,
                }),
                author: author_of(b.author_id),
                id: b.id,
                title: b.title,
                slug: b.slug,
                short_description: b.short_description,
                image: b.image,
                created_at: b.created_at,
            })
            .collect();

        Ok(SearchResults {
            articles,
            blogs,
            categories: categories.into_iter().map(CategoryHit::from).collect(),
        })
    }

    async fn promote_due(&self) {
        let now = Utc::now();
        let (articles, blogs) = tokio::join!(
            self.articles.promote_due(now),
            self.blogs.promote_due(now),
        );
        if let Err(e) = articles {
            tracing::warn!("Failed to promote scheduled articles: {:#}", e);
        }
        if let Err(e) = blogs {
            tracing::warn!("Failed to promote scheduled blogs: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{
        SqlxArticleRepository, SqlxBlogRepository, SqlxCategoryRepository, SqlxSettingsRepository,
        SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::services::ingest::MediaPipeline;
    use crate::services::settings::SettingsService;
    use crate::services::storage::LocalUploads;
    use proptest::prelude::*;

    async fn setup() -> (SearchService, DynDatabasePool, tempfile::TempDir) {
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
        let articles = SqlxArticleRepository::boxed(pool.clone());
        let categories = Arc::new(CategoryService::new(
            SqlxCategoryRepository::boxed(pool.clone()),
            articles.clone(),
            pipeline,
            Arc::new(MemoryCache::new()),
        ));
        let service = SearchService::new(
            articles,
            SqlxBlogRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            categories,
        );
        (service, pool, dir)
    }

    async fn seed(pool: &DynDatabasePool) {
        let db = pool.sqlite().unwrap();
        for sql in [
            "INSERT INTO users (name, email, password_hash) VALUES ('Asha', 'asha@mitaan.in', 'h')",
            "INSERT INTO categories (name, name_hi, slug, color) VALUES ('Budget News', 'बजट', 'budget-news', '#f00')",
            "INSERT INTO articles (slug, title, status, published_at, category_id, author_id) \
             VALUES ('budget-2025', 'Budget 2025 Highlights', 'PUBLISHED', CURRENT_TIMESTAMP, 1, 1)",
            "INSERT INTO articles (slug, title, status, category_id, author_id) \
             VALUES ('budget-draft', 'Budget draft', 'DRAFT', 1, 1)",
            "INSERT INTO blogs (slug, title, status, published_at, author_id) \
             VALUES ('my-budget', 'My budget diary', 'PUBLISHED', CURRENT_TIMESTAMP, 1)",
        ] {
            sqlx::query(sql).execute(db).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_short_query_returns_empty() {
        let (service, pool, _dir) = setup().await;
        seed(&pool).await;
        for q in ["", " ", "b", " b "] {
            let results = service.search(q, 10).await.unwrap();
            assert!(results.articles.is_empty());
            assert!(results.blogs.is_empty());
            assert!(results.categories.is_empty());
        }
    }

    #[tokio::test]
    async fn test_search_published_only() {
        let (service, pool, _dir) = setup().await;
        seed(&pool).await;

        let results = service.search("  budget ", 10).await.unwrap();
        assert_eq!(results.articles.len(), 1);
        assert_eq!(results.articles[0].slug, "budget-2025");
        let category = results.articles[0].category.as_ref().unwrap();
        assert_eq!(category.slug.as_deref(), Some("budget-news"));
        assert_eq!(results.articles[0].author.as_ref().unwrap().name, "Asha");

        assert_eq!(results.blogs.len(), 1);
        assert!(results.blogs[0].category.is_none());

        assert_eq!(results.categories.len(), 1);
        assert_eq!(results.categories[0].color.as_deref(), Some("#f00"));
    }

    #[tokio::test]
    async fn test_search_publishes_due_scheduled_content() {
        let (service, pool, _dir) = setup().await;
        seed(&pool).await;
        let db = pool.sqlite().unwrap();
        let due = Utc::now() - chrono::Duration::minutes(5);
        sqlx::query(
            "INSERT INTO articles (slug, title, status, scheduled_at, category_id, author_id) \
             VALUES ('budget-live', 'Budget live updates', 'SCHEDULED', ?, 1, 1)",
        )
        .bind(due)
        .execute(db)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO blogs (slug, title, status, scheduled_at, author_id) \
             VALUES ('budget-notes', 'Budget notes', 'SCHEDULED', ?, 1)",
        )
        .bind(due)
        .execute(db)
        .await
        .unwrap();

        let results = service.search("budget", 10).await.unwrap();
        assert!(results.articles.iter().any(|a| a.slug == "budget-live"));
        assert!(results.blogs.iter().any(|b| b.slug == "budget-notes"));
        assert!(results.articles.iter().all(|a| a.slug != "budget-draft"));
    }

    #[tokio::test]
    async fn test_search_hindi_category_name() {
        let (service, pool, _dir) = setup().await;
        seed(&pool).await;
        let results = service.search("बजट", 10).await.unwrap();
        assert_eq!(results.categories.len(), 1);
    }

    #[test]
    fn test_effective_limit() {
        assert_eq!(effective_limit(None), 10);
        assert_eq!(effective_limit(Some("5")), 5);
        assert_eq!(effective_limit(Some("500")), 20);
        assert_eq!(effective_limit(Some("abc")), 10);
        assert_eq!(effective_limit(Some("0")), 1);
    }

    proptest! {
        #[test]
        fn prop_effective_limit_in_range(raw in ".*") {
            let limit = effective_limit(Some(&raw));
            prop_assert!((1..=MAX_LIMIT).contains(&limit));
        }

        #[test]
        fn prop_numeric_limit_is_capped(n in 1i64..1000) {
            prop_assert_eq!(effective_limit(Some(&n.to_string())), n.min(MAX_LIMIT));
        }
    }
}
