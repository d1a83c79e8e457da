//! Article repository
//!
//! Database operations for news articles. The lifecycle state is spread over
//! the `status`, `published_at` and `scheduled_at` columns and rebuilt into a
//! [`PublishState`] on read.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::repositories::contains_pattern;
use crate::db::DynDatabasePool;
use crate::models::{Article, ArticleFilter, Language, NewArticle, PublishState};

const ARTICLE_COLUMNS: &str = "id, slug, title, content, short_description, image, video_url, \
     views, status, published_at, scheduled_at, language, is_featured, is_trending, is_breaking, \
     meta_title, meta_description, meta_keywords, metadata, priority, category_id, author_id, \
     created_at, updated_at";

#[async_trait]
pub trait ArticleRepository: Send + Sync {
    async fn create(&self, article: &NewArticle) -> Result<Article>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>>;

    /// Filtered listing, newest first
    async fn list(&self, filter: &ArticleFilter) -> Result<Vec<Article>>;

    /// Persist every column of an existing article. Returns `None` when the
    /// row no longer exists.
    async fn update(&self, article: &Article) -> Result<Option<Article>>;

    /// Delete an article. Returns false when it did not exist.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Atomic `views = views + 1`
    async fn increment_views(&self, id: i64) -> Result<()>;

    async fn count_by_category(&self, category_id: i64) -> Result<i64>;

    /// Published articles whose title, short description, content or a tag name match
    async fn search_published(&self, term: &str, limit: i64) -> Result<Vec<Article>>;

    /// Publish scheduled articles whose time has passed. Returns the number promoted.
    async fn promote_due(&self, now: DateTime<Utc>) -> Result<u64>;
}

pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(&self, article: &NewArticle) -> Result<Article> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_article_sqlite(self.pool.sqlite()?, article).await,
            DatabaseDriver::Postgres => {
                create_article_postgres(self.pool.postgres()?, article).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_article_sqlite(self.pool.sqlite()?, Lookup::Id(id)).await,
            DatabaseDriver::Postgres => get_article_postgres(self.pool.postgres()?, Lookup::Id(id)).await,
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_article_sqlite(self.pool.sqlite()?, Lookup::Slug(slug)).await,
            DatabaseDriver::Postgres => {
                get_article_postgres(self.pool.postgres()?, Lookup::Slug(slug)).await
            }
        }
    }

    async fn list(&self, filter: &ArticleFilter) -> Result<Vec<Article>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_articles_sqlite(self.pool.sqlite()?, filter).await,
            DatabaseDriver::Postgres => list_articles_postgres(self.pool.postgres()?, filter).await,
        }
    }

    async fn update(&self, article: &Article) -> Result<Option<Article>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_article_sqlite(self.pool.sqlite()?, article).await,
            DatabaseDriver::Postgres => {
                update_article_postgres(self.pool.postgres()?, article).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM articles WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Postgres => sqlx::query("DELETE FROM articles WHERE id = $1")
                .bind(id)
                .execute(self.pool.postgres()?)
                .await
                .map(|r| r.rows_affected()),
        };
        Ok(result.context("Failed to delete article")? > 0)
    }

    async fn increment_views(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("UPDATE articles SET views = views + 1 WHERE id = ?")
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to increment article views")?;
            }
            DatabaseDriver::Postgres => {
                sqlx::query("UPDATE articles SET views = views + 1 WHERE id = $1")
                    .bind(id)
                    .execute(self.pool.postgres()?)
                    .await
                    .context("Failed to increment article views")?;
            }
        }
        Ok(())
    }

    async fn count_by_category(&self, category_id: i64) -> Result<i64> {
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query("SELECT COUNT(*) as count FROM articles WHERE category_id = ?")
                    .bind(category_id)
                    .fetch_one(self.pool.sqlite()?)
                    .await
                    .context("Failed to count articles by category")?;
                row.get("count")
            }
            DatabaseDriver::Postgres => {
                let row =
                    sqlx::query("SELECT COUNT(*) as count FROM articles WHERE category_id = $1")
                        .bind(category_id)
                        .fetch_one(self.pool.postgres()?)
                        .await
                        .context("Failed to count articles by category")?;
                row.get("count")
            }
        };
        Ok(count)
    }

    async fn search_published(&self, term: &str, limit: i64) -> Result<Vec<Article>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => search_articles_sqlite(self.pool.sqlite()?, term, limit).await,
            DatabaseDriver::Postgres => {
                search_articles_postgres(self.pool.postgres()?, term, limit).await
            }
        }
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let sql = match self.pool.driver() {
            DatabaseDriver::Sqlite => PROMOTE_DUE_SQLITE,
            DatabaseDriver::Postgres => PROMOTE_DUE_POSTGRES,
        };
        let promoted = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Postgres => sqlx::query(sql)
                .bind(now)
                .execute(self.pool.postgres()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to promote scheduled articles")?;

        if promoted > 0 {
            tracing::info!("Published {} scheduled article(s)", promoted);
        }
        Ok(promoted)
    }
}

const PROMOTE_DUE_SQLITE: &str = "UPDATE articles \
     SET status = 'PUBLISHED', published_at = scheduled_at, scheduled_at = NULL \
     WHERE status = 'SCHEDULED' AND scheduled_at <= ?";

const PROMOTE_DUE_POSTGRES: &str = "UPDATE articles \
     SET status = 'PUBLISHED', published_at = scheduled_at, scheduled_at = NULL \
     WHERE status = 'SCHEDULED' AND scheduled_at <= $1";

/// Single-row lookup key
#[derive(Clone, Copy)]
enum Lookup<'a> {
    Id(i64),
    Slug(&'a str),
}

impl Lookup<'_> {
    fn column(&self) -> &'static str {
        match self {
            Lookup::Id(_) => "id",
            Lookup::Slug(_) => "slug",
        }
    }
}

fn metadata_to_text(value: &serde_json::Value) -> String {
    if value.is_null() {
        "{}".to_string()
    } else {
        value.to_string()
    }
}

fn metadata_from_text(text: &str) -> serde_json::Value {
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({}))
}

fn new_to_article(id: i64, article: &NewArticle, now: DateTime<Utc>) -> Article {
    Article {
        id,
        slug: article.slug.clone(),
        title: article.title.clone(),
        content: article.content.clone(),
        short_description: article.short_description.clone(),
        image: article.image.clone(),
        video_url: article.video_url.clone(),
        views: 0,
        state: article.state,
        language: article.language,
        is_featured: article.is_featured,
        is_trending: article.is_trending,
        is_breaking: article.is_breaking,
        meta_title: article.meta_title.clone(),
        meta_description: article.meta_description.clone(),
        meta_keywords: article.meta_keywords.clone(),
        metadata: article.metadata.clone(),
        priority: article.priority.clone(),
        category_id: article.category_id,
        author_id: article.author_id,
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_article_sqlite(pool: &SqlitePool, article: &NewArticle) -> Result<Article> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO articles (slug, title, content, short_description, image, video_url,
            status, published_at, scheduled_at, language, is_featured, is_trending, is_breaking,
            meta_title, meta_description, meta_keywords, metadata, priority, category_id,
            author_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&article.slug)
    .bind(&article.title)
    .bind(&article.content)
    .bind(&article.short_description)
    .bind(&article.image)
    .bind(&article.video_url)
    .bind(article.state.status().as_str())
    .bind(article.state.published_at())
    .bind(article.state.scheduled_at())
    .bind(article.language.as_str())
    .bind(article.is_featured)
    .bind(article.is_trending)
    .bind(article.is_breaking)
    .bind(&article.meta_title)
    .bind(&article.meta_description)
    .bind(&article.meta_keywords)
    .bind(metadata_to_text(&article.metadata))
    .bind(&article.priority)
    .bind(article.category_id)
    .bind(article.author_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create article")?;

    Ok(new_to_article(result.last_insert_rowid(), article, now))
}

async fn get_article_sqlite(pool: &SqlitePool, lookup: Lookup<'_>) -> Result<Option<Article>> {
    let sql = format!("SELECT {} FROM articles WHERE {} = ?", ARTICLE_COLUMNS, lookup.column());
    let query = sqlx::query(&sql);
    let query = match lookup {
        Lookup::Id(id) => query.bind(id),
        Lookup::Slug(slug) => query.bind(slug),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get article by {}", lookup.column()))?;

    match row {
        Some(row) => Ok(Some(row_to_article_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn list_articles_sqlite(pool: &SqlitePool, filter: &ArticleFilter) -> Result<Vec<Article>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM articles WHERE 1 = 1",
        ARTICLE_COLUMNS
    ));

    if let Some(slug) = &filter.category_slug {
        qb.push(" AND category_id IN (SELECT id FROM categories WHERE slug = ")
            .push_bind(slug.clone())
            .push(")");
    }
    if let Some(slug) = &filter.tag_slug {
        qb.push(
            " AND id IN (SELECT at.article_id FROM article_tags at \
             INNER JOIN tags t ON t.id = at.tag_id WHERE t.slug = ",
        )
        .push_bind(slug.clone())
        .push(")");
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(author_id) = filter.author_id {
        qb.push(" AND author_id = ").push_bind(author_id);
    }
    if let Some(language) = filter.language {
        qb.push(" AND language = ").push_bind(language.as_str());
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = contains_pattern(&search.to_lowercase());
        qb.push(" AND (LOWER(title) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR LOWER(content) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    qb.push(" ORDER BY created_at DESC, id DESC");
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list articles")?;

    rows.iter().map(row_to_article_sqlite).collect()
}

async fn update_article_sqlite(pool: &SqlitePool, article: &Article) -> Result<Option<Article>> {
    let result = sqlx::query(
        r#"
        UPDATE articles
        SET slug = ?, title = ?, content = ?, short_description = ?, image = ?, video_url = ?,
            status = ?, published_at = ?, scheduled_at = ?, language = ?, is_featured = ?,
            is_trending = ?, is_breaking = ?, meta_title = ?, meta_description = ?,
            meta_keywords = ?, metadata = ?, priority = ?, category_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&article.slug)
    .bind(&article.title)
    .bind(&article.content)
    .bind(&article.short_description)
    .bind(&article.image)
    .bind(&article.video_url)
    .bind(article.state.status().as_str())
    .bind(article.state.published_at())
    .bind(article.state.scheduled_at())
    .bind(article.language.as_str())
    .bind(article.is_featured)
    .bind(article.is_trending)
    .bind(article.is_breaking)
    .bind(&article.meta_title)
    .bind(&article.meta_description)
    .bind(&article.meta_keywords)
    .bind(metadata_to_text(&article.metadata))
    .bind(&article.priority)
    .bind(article.category_id)
    .bind(article.updated_at)
    .bind(article.id)
    .execute(pool)
    .await
    .context("Failed to update article")?;

    Ok((result.rows_affected() > 0).then(|| article.clone()))
}

async fn search_articles_sqlite(pool: &SqlitePool, term: &str, limit: i64) -> Result<Vec<Article>> {
    let pattern = contains_pattern(&term.to_lowercase());
    let sql = format!(
        r#"
        SELECT {} FROM articles
        WHERE status = 'PUBLISHED' AND (
            LOWER(title) LIKE ?1 ESCAPE '\'
            OR LOWER(COALESCE(short_description, '')) LIKE ?1 ESCAPE '\'
            OR LOWER(content) LIKE ?1 ESCAPE '\'
            OR id IN (SELECT at.article_id FROM article_tags at
                      INNER JOIN tags t ON t.id = at.tag_id
                      WHERE LOWER(t.name) LIKE ?1 ESCAPE '\')
        )
        ORDER BY created_at DESC, id DESC
        LIMIT ?2
        "#,
        ARTICLE_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to search articles")?;

    rows.iter().map(row_to_article_sqlite).collect()
}

fn row_to_article_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    let status: String = row.get("status");
    let language: String = row.get("language");
    let metadata: String = row.get("metadata");

    Ok(Article {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        content: row.get("content"),
        short_description: row.get("short_description"),
        image: row.get("image"),
        video_url: row.get("video_url"),
        views: row.get("views"),
        state: PublishState::from_columns(&status, row.get("published_at"), row.get("scheduled_at")),
        language: language.parse().unwrap_or(Language::En),
        is_featured: row.get("is_featured"),
        is_trending: row.get("is_trending"),
        is_breaking: row.get("is_breaking"),
        meta_title: row.get("meta_title"),
        meta_description: row.get("meta_description"),
        meta_keywords: row.get("meta_keywords"),
        metadata: metadata_from_text(&metadata),
        priority: row.get("priority"),
        category_id: row.get("category_id"),
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// PostgreSQL implementations
// ============================================================================

async fn create_article_postgres(pool: &PgPool, article: &NewArticle) -> Result<Article> {
    let now = Utc::now();

    let row = sqlx::query(
        r#"
        INSERT INTO articles (slug, title, content, short_description, image, video_url,
            status, published_at, scheduled_at, language, is_featured, is_trending, is_breaking,
            meta_title, meta_description, meta_keywords, metadata, priority, category_id,
            author_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22)
        RETURNING id
        "#,
    )
    .bind(&article.slug)
    .bind(&article.title)
    .bind(&article.content)
    .bind(&article.short_description)
    .bind(&article.image)
    .bind(&article.video_url)
    .bind(article.state.status().as_str())
    .bind(article.state.published_at())
    .bind(article.state.scheduled_at())
    .bind(article.language.as_str())
    .bind(article.is_featured)
    .bind(article.is_trending)
    .bind(article.is_breaking)
    .bind(&article.meta_title)
    .bind(&article.meta_description)
    .bind(&article.meta_keywords)
    .bind(metadata_to_text(&article.metadata))
    .bind(&article.priority)
    .bind(article.category_id)
    .bind(article.author_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("Failed to create article")?;

    Ok(new_to_article(row.get("id"), article, now))
}

async fn get_article_postgres(pool: &PgPool, lookup: Lookup<'_>) -> Result<Option<Article>> {
    let sql = format!("SELECT {} FROM articles WHERE {} = $1", ARTICLE_COLUMNS, lookup.column());
    let query = sqlx::query(&sql);
    let query = match lookup {
        Lookup::Id(id) => query.bind(id),
        Lookup::Slug(slug) => query.bind(slug),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get article by {}", lookup.column()))?;

    match row {
        Some(row) => Ok(Some(row_to_article_postgres(&row)?)),
        None => Ok(None),
    }
}

async fn list_articles_postgres(pool: &PgPool, filter: &ArticleFilter) -> Result<Vec<Article>> {
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} FROM articles WHERE 1 = 1",
        ARTICLE_COLUMNS
    ));

    if let Some(slug) = &filter.category_slug {
        qb.push(" AND category_id IN (SELECT id FROM categories WHERE slug = ")
            .push_bind(slug.clone())
            .push(")");
    }
    if let Some(slug) = &filter.tag_slug {
        qb.push(
            " AND id IN (SELECT at.article_id FROM article_tags at \
             INNER JOIN tags t ON t.id = at.tag_id WHERE t.slug = ",
        )
        .push_bind(slug.clone())
        .push(")");
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(author_id) = filter.author_id {
        qb.push(" AND author_id = ").push_bind(author_id);
    }
    if let Some(language) = filter.language {
        qb.push(" AND language = ").push_bind(language.as_str());
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = contains_pattern(search);
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR content ILIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    qb.push(" ORDER BY created_at DESC, id DESC");
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list articles")?;

    rows.iter().map(row_to_article_postgres).collect()
}

async fn update_article_postgres(pool: &PgPool, article: &Article) -> Result<Option<Article>> {
    let result = sqlx::query(
        r#"
        UPDATE articles
        SET slug = $1, title = $2, content = $3, short_description = $4, image = $5,
            video_url = $6, status = $7, published_at = $8, scheduled_at = $9, language = $10,
            is_featured = $11, is_trending = $12, is_breaking = $13, meta_title = $14,
            meta_description = $15, meta_keywords = $16, metadata = $17, priority = $18,
            category_id = $19, updated_at = $20
        WHERE id = $21
        "#,
    )
    .bind(&article.slug)
    .bind(&article.title)
    .bind(&article.content)
    .bind(&article.short_description)
    .bind(&article.image)
    .bind(&article.video_url)
    .bind(article.state.status().as_str())
    .bind(article.state.published_at())
    .bind(article.state.scheduled_at())
    .bind(article.language.as_str())
    .bind(article.is_featured)
    .bind(article.is_trending)
    .bind(article.is_breaking)
    .bind(&article.meta_title)
    .bind(&article.meta_description)
    .bind(&article.meta_keywords)
    .bind(metadata_to_text(&article.metadata))
    .bind(&article.priority)
    .bind(article.category_id)
    .bind(article.updated_at)
    .bind(article.id)
    .execute(pool)
    .await
    .context("Failed to update article")?;

    Ok((result.rows_affected() > 0).then(|| article.clone()))
}

async fn search_articles_postgres(pool: &PgPool, term: &str, limit: i64) -> Result<Vec<Article>> {
    let pattern = contains_pattern(term);
    let sql = format!(
        r#"
        SELECT {} FROM articles
        WHERE status = 'PUBLISHED' AND (
            title ILIKE $1 ESCAPE '\'
            OR short_description ILIKE $1 ESCAPE '\'
            OR content ILIKE $1 ESCAPE '\'
            OR id IN (SELECT at.article_id FROM article_tags at
                      INNER JOIN tags t ON t.id = at.tag_id
                      WHERE t.name ILIKE $1 ESCAPE '\')
        )
        ORDER BY created_at DESC, id DESC
        LIMIT $2
        "#,
        ARTICLE_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to search articles")?;

    rows.iter().map(row_to_article_postgres).collect()
}

fn row_to_article_postgres(row: &sqlx::postgres::PgRow) -> Result<Article> {
    let status: String = row.get("status");
    let language: String = row.get("language");
    let metadata: String = row.get("metadata");

    Ok(Article {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        content: row.get("content"),
        short_description: row.get("short_description"),
        image: row.get("image"),
        video_url: row.get("video_url"),
        views: row.get("views"),
        state: PublishState::from_columns(&status, row.get("published_at"), row.get("scheduled_at")),
        language: language.parse().unwrap_or(Language::En),
        is_featured: row.get("is_featured"),
        is_trending: row.get("is_trending"),
        is_breaking: row.get("is_breaking"),
        meta_title: row.get("meta_title"),
        meta_description: row.get("meta_description"),
        meta_keywords: row.get("meta_keywords"),
        metadata: metadata_from_text(&metadata),
        priority: row.get("priority"),
        category_id: row.get("category_id"),
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
