//! Blog repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::repositories::contains_pattern;
use crate::db::DynDatabasePool;
use crate::models::{Blog, BlogFilter, Language, NewBlog, PublishState};

const BLOG_COLUMNS: &str = "id, slug, title, content, short_description, image, views, status, \
     published_at, scheduled_at, language, category_id, author_id, created_at, updated_at";

#[async_trait]
pub trait BlogRepository: Send + Sync {
    async fn create(&self, blog: &NewBlog) -> Result<Blog>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Blog>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Blog>>;

    /// Filtered listing, newest first
    async fn list(&self, filter: &BlogFilter) -> Result<Vec<Blog>>;

    async fn update(&self, blog: &Blog) -> Result<Option<Blog>>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn increment_views(&self, id: i64) -> Result<()>;

    /// Published posts whose title, short description or content match
    async fn search_published(&self, term: &str, limit: i64) -> Result<Vec<Blog>>;

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<u64>;
}

pub struct SqlxBlogRepository {
    pool: DynDatabasePool,
}

impl SqlxBlogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BlogRepository for SqlxBlogRepository {
    async fn create(&self, blog: &NewBlog) -> Result<Blog> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_blog_sqlite(self.pool.sqlite()?, blog).await,
            DatabaseDriver::Postgres => create_blog_postgres(self.pool.postgres()?, blog).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Blog>> {
        let row = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&format!("SELECT {} FROM blogs WHERE id = ?", BLOG_COLUMNS))
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get blog by ID")?;
                row.map(|r| row_to_blog_sqlite(&r))
            }
            DatabaseDriver::Postgres => {
                let row = sqlx::query(&format!("SELECT {} FROM blogs WHERE id = $1", BLOG_COLUMNS))
                    .bind(id)
                    .fetch_optional(self.pool.postgres()?)
                    .await
                    .context("Failed to get blog by ID")?;
                row.map(|r| row_to_blog_postgres(&r))
            }
        };
        Ok(row)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Blog>> {
        let row = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row =
                    sqlx::query(&format!("SELECT {} FROM blogs WHERE slug = ?", BLOG_COLUMNS))
                        .bind(slug)
                        .fetch_optional(self.pool.sqlite()?)
                        .await
                        .context("Failed to get blog by slug")?;
                row.map(|r| row_to_blog_sqlite(&r))
            }
            DatabaseDriver::Postgres => {
                let row =
                    sqlx::query(&format!("SELECT {} FROM blogs WHERE slug = $1", BLOG_COLUMNS))
                        .bind(slug)
                        .fetch_optional(self.pool.postgres()?)
                        .await
                        .context("Failed to get blog by slug")?;
                row.map(|r| row_to_blog_postgres(&r))
            }
        };
        Ok(row)
    }

    async fn list(&self, filter: &BlogFilter) -> Result<Vec<Blog>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_blogs_sqlite(self.pool.sqlite()?, filter).await,
            DatabaseDriver::Postgres => list_blogs_postgres(self.pool.postgres()?, filter).await,
        }
    }

    async fn update(&self, blog: &Blog) -> Result<Option<Blog>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_blog_sqlite(self.pool.sqlite()?, blog).await,
            DatabaseDriver::Postgres => update_blog_postgres(self.pool.postgres()?, blog).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM blogs WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Postgres => sqlx::query("DELETE FROM blogs WHERE id = $1")
                .bind(id)
                .execute(self.pool.postgres()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete blog")?;
        Ok(affected > 0)
    }

    async fn increment_views(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("UPDATE blogs SET views = views + 1 WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Postgres => {
                sqlx::query("UPDATE blogs SET views = views + 1 WHERE id = $1")
                    .bind(id)
                    .execute(self.pool.postgres()?)
                    .await
                    .map(|_| ())
            }
        }
        .context("Failed to increment blog views")
    }

    async fn search_published(&self, term: &str, limit: i64) -> Result<Vec<Blog>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&format!(
                    "SELECT {} FROM blogs WHERE status = 'PUBLISHED' AND ( \
                     LOWER(title) LIKE ?1 ESCAPE '\\' \
                     OR LOWER(COALESCE(short_description, '')) LIKE ?1 ESCAPE '\\' \
                     OR LOWER(content) LIKE ?1 ESCAPE '\\') \
                     ORDER BY created_at DESC, id DESC LIMIT ?2",
                    BLOG_COLUMNS
                ))
                .bind(contains_pattern(&term.to_lowercase()))
                .bind(limit)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to search blogs")?;
                Ok(rows.iter().map(row_to_blog_sqlite).collect())
            }
            DatabaseDriver::Postgres => {
                let rows = sqlx::query(&format!(
                    "SELECT {} FROM blogs WHERE status = 'PUBLISHED' AND ( \
                     title ILIKE $1 ESCAPE '\\' OR short_description ILIKE $1 ESCAPE '\\' \
                     OR content ILIKE $1 ESCAPE '\\') \
                     ORDER BY created_at DESC, id DESC LIMIT $2",
                    BLOG_COLUMNS
                ))
                .bind(contains_pattern(term))
                .bind(limit)
                .fetch_all(self.pool.postgres()?)
                .await
                .context("Failed to search blogs")?;
                Ok(rows.iter().map(row_to_blog_postgres).collect())
            }
        }
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let promoted = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(
                "UPDATE blogs SET status = 'PUBLISHED', published_at = scheduled_at, \
                 scheduled_at = NULL WHERE status = 'SCHEDULED' AND scheduled_at <= ?",
            )
            .bind(now)
            .execute(self.pool.sqlite()?)
            .await
            .map(|r| r.rows_affected()),
            DatabaseDriver::Postgres => sqlx::query(
                "UPDATE blogs SET status = 'PUBLISHED', published_at = scheduled_at, \
                 scheduled_at = NULL WHERE status = 'SCHEDULED' AND scheduled_at <= $1",
            )
            .bind(now)
            .execute(self.pool.postgres()?)
            .await
            .map(|r| r.rows_affected()),
        }
        .context("Failed to promote scheduled blogs")?;

        if promoted > 0 {
            tracing::info!("Published {} scheduled blog post(s)", promoted);
        }
        Ok(promoted)
    }
}

fn new_to_blog(id: i64, blog: &NewBlog, now: DateTime<Utc>) -> Blog {
    Blog {
        id,
        slug: blog.slug.clone(),
        title: blog.title.clone(),
        content: blog.content.clone(),
        short_description: blog.short_description.clone(),
        image: blog.image.clone(),
        views: 0,
        state: blog.state,
        language: blog.language,
        category_id: blog.category_id,
        author_id: blog.author_id,
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_blog_sqlite(pool: &SqlitePool, blog: &NewBlog) -> Result<Blog> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO blogs (slug, title, content, short_description, image, status, published_at,
                           scheduled_at, language, category_id, author_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&blog.slug)
    .bind(&blog.title)
    .bind(&blog.content)
    .bind(&blog.short_description)
    .bind(&blog.image)
    .bind(blog.state.status().as_str())
    .bind(blog.state.published_at())
    .bind(blog.state.scheduled_at())
    .bind(blog.language.as_str())
    .bind(blog.category_id)
    .bind(blog.author_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create blog")?;

    Ok(new_to_blog(result.last_insert_rowid(), blog, now))
}

async fn list_blogs_sqlite(pool: &SqlitePool, filter: &BlogFilter) -> Result<Vec<Blog>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM blogs WHERE 1 = 1", BLOG_COLUMNS));
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

    let rows = qb.build().fetch_all(pool).await.context("Failed to list blogs")?;
    Ok(rows.iter().map(row_to_blog_sqlite).collect())
}

async fn update_blog_sqlite(pool: &SqlitePool, blog: &Blog) -> Result<Option<Blog>> {
    let result = sqlx::query(
        r#"
        UPDATE blogs
        SET slug = ?, title = ?, content = ?, short_description = ?, image = ?, status = ?,
            published_at = ?, scheduled_at = ?, language = ?, category_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&blog.slug)
    .bind(&blog.title)
    .bind(&blog.content)
    .bind(&blog.short_description)
    .bind(&blog.image)
    .bind(blog.state.status().as_str())
    .bind(blog.state.published_at())
    .bind(blog.state.scheduled_at())
    .bind(blog.language.as_str())
    .bind(blog.category_id)
    .bind(blog.updated_at)
    .bind(blog.id)
    .execute(pool)
    .await
    .context("Failed to update blog")?;

    Ok((result.rows_affected() > 0).then(|| blog.clone()))
}

fn row_to_blog_sqlite(row: &sqlx::sqlite::SqliteRow) -> Blog {
    let status: String = row.get("status");
    let language: String = row.get("language");
    Blog {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        content: row.get("content"),
        short_description: row.get("short_description"),
        image: row.get("image"),
        views: row.get("views"),
        state: PublishState::from_columns(&status, row.get("published_at"), row.get("scheduled_at")),
        language: language.parse().unwrap_or(Language::En),
        category_id: row.get("category_id"),
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// PostgreSQL implementations
// ============================================================================

async fn create_blog_postgres(pool: &PgPool, blog: &NewBlog) -> Result<Blog> {
    let now = Utc::now();
    let row = sqlx::query(
        r#"
        INSERT INTO blogs (slug, title, content, short_description, image, status, published_at,
                           scheduled_at, language, category_id, author_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING id
        "#,
    )
    .bind(&blog.slug)
    .bind(&blog.title)
    .bind(&blog.content)
    .bind(&blog.short_description)
    .bind(&blog.image)
    .bind(blog.state.status().as_str())
    .bind(blog.state.published_at())
    .bind(blog.state.scheduled_at())
    .bind(blog.language.as_str())
    .bind(blog.category_id)
    .bind(blog.author_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("Failed to create blog")?;

    Ok(new_to_blog(row.get("id"), blog, now))
}

async fn list_blogs_postgres(pool: &PgPool, filter: &BlogFilter) -> Result<Vec<Blog>> {
    let mut qb =
        QueryBuilder::<Postgres>::new(format!("SELECT {} FROM blogs WHERE 1 = 1", BLOG_COLUMNS));
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

    let rows = qb.build().fetch_all(pool).await.context("Failed to list blogs")?;
    Ok(rows.iter().map(row_to_blog_postgres).collect())
}

async fn update_blog_postgres(pool: &PgPool, blog: &Blog) -> Result<Option<Blog>> {
    let result = sqlx::query(
        r#"
        UPDATE blogs
        SET slug = $1, title = $2, content = $3, short_description = $4, image = $5,
            status = $6, published_at = $7, scheduled_at = $8, language = $9,
            category_id = $10, updated_at = $11
        WHERE id = $12
        "#,
    )
    .bind(&blog.slug)
    .bind(&blog.title)
    .bind(&blog.content)
    .bind(&blog.short_description)
    .bind(&blog.image)
    .bind(blog.state.status().as_str())
    .bind(blog.state.published_at())
    .bind(blog.state.scheduled_at())
    .bind(blog.language.as_str())
    .bind(blog.category_id)
    .bind(blog.updated_at)
    .bind(blog.id)
    .execute(pool)
    .await
    .context("Failed to update blog")?;

    Ok((result.rows_affected() > 0).then(|| blog.clone()))
}

fn row_to_blog_postgres(row: &sqlx::postgres::PgRow) -> Blog {
    let status: String = row.get("status");
    let language: String = row.get("language");
    Blog {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        content: row.get("content"),
        short_description: row.get("short_description"),
        image: row.get("image"),
        views: row.get("views"),
        state: PublishState::from_columns(&status, row.get("published_at"), row.get("scheduled_at")),
        language: language.parse().unwrap_or(Language::En),
        category_id: row.get("category_id"),
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
