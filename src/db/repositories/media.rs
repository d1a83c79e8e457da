//! Media library repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, Media, MediaFilter, MediaType, NewMedia, SYSTEM_CATEGORY};

const MEDIA_COLUMNS: &str = "id, media_type, title, description, url, thumbnail, category, size, \
     duration, is_published, views, created_at, updated_at";

#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn create(&self, media: &NewMedia) -> Result<Media>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Media>>;

    /// One page of media matching `filter`, newest first
    async fn list(&self, filter: &MediaFilter, params: &ListParams) -> Result<Vec<Media>>;

    async fn count(&self, filter: &MediaFilter) -> Result<i64>;

    async fn update(&self, media: &Media) -> Result<Option<Media>>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Atomic `views = views + 1`, returning the updated record
    async fn increment_views(&self, id: i64) -> Result<Option<Media>>;
}

pub struct SqlxMediaRepository {
    pool: DynDatabasePool,
}

impl SqlxMediaRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MediaRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl MediaRepository for SqlxMediaRepository {
    async fn create(&self, media: &NewMedia) -> Result<Media> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_media_sqlite(self.pool.sqlite()?, media).await,
            DatabaseDriver::Postgres => create_media_postgres(self.pool.postgres()?, media).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Media>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&format!("SELECT {} FROM media WHERE id = ?", MEDIA_COLUMNS))
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get media by ID")?;
                row.map(|r| row_to_media_sqlite(&r)).transpose()
            }
            DatabaseDriver::Postgres => {
                let row =
                    sqlx::query(&format!("SELECT {} FROM media WHERE id = $1", MEDIA_COLUMNS))
                        .bind(id)
                        .fetch_optional(self.pool.postgres()?)
                        .await
                        .context("Failed to get media by ID")?;
                row.map(|r| row_to_media_postgres(&r)).transpose()
            }
        }
    }

    async fn list(&self, filter: &MediaFilter, params: &ListParams) -> Result<Vec<Media>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM media", MEDIA_COLUMNS));
                push_filter_sqlite(&mut qb, filter);
                qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
                    .push_bind(params.limit())
                    .push(" OFFSET ")
                    .push_bind(params.offset());
                let rows = qb
                    .build()
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list media")?;
                rows.iter().map(row_to_media_sqlite).collect()
            }
            DatabaseDriver::Postgres => {
                let mut qb =
                    QueryBuilder::<Postgres>::new(format!("SELECT {} FROM media", MEDIA_COLUMNS));
                push_filter_postgres(&mut qb, filter);
                qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
                    .push_bind(params.limit())
                    .push(" OFFSET ")
                    .push_bind(params.offset());
                let rows = qb
                    .build()
                    .fetch_all(self.pool.postgres()?)
                    .await
                    .context("Failed to list media")?;
                rows.iter().map(row_to_media_postgres).collect()
            }
        }
    }

    async fn count(&self, filter: &MediaFilter) -> Result<i64> {
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) as count FROM media");
                push_filter_sqlite(&mut qb, filter);
                let row = qb
                    .build()
                    .fetch_one(self.pool.sqlite()?)
                    .await
                    .context("Failed to count media")?;
                row.get("count")
            }
            DatabaseDriver::Postgres => {
                let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) as count FROM media");
                push_filter_postgres(&mut qb, filter);
                let row = qb
                    .build()
                    .fetch_one(self.pool.postgres()?)
                    .await
                    .context("Failed to count media")?;
                row.get("count")
            }
        };
        Ok(count)
    }

    async fn update(&self, media: &Media) -> Result<Option<Media>> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(
                    "UPDATE media SET title = ?, description = ?, category = ?, thumbnail = ?, \
                     is_published = ?, updated_at = ? WHERE id = ?",
                )
                .bind(&media.title)
                .bind(&media.description)
                .bind(&media.category)
                .bind(&media.thumbnail)
                .bind(media.is_published)
                .bind(media.updated_at)
                .bind(media.id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected())
            }
            DatabaseDriver::Postgres => {
                sqlx::query(
                    "UPDATE media SET title = $1, description = $2, category = $3, thumbnail = $4, \
                     is_published = $5, updated_at = $6 WHERE id = $7",
                )
                .bind(&media.title)
                .bind(&media.description)
                .bind(&media.category)
                .bind(&media.thumbnail)
                .bind(media.is_published)
                .bind(media.updated_at)
                .bind(media.id)
                .execute(self.pool.postgres()?)
                .await
                .map(|r| r.rows_affected())
            }
        }
        .context("Failed to update media")?;
        Ok((affected > 0).then(|| media.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM media WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Postgres => sqlx::query("DELETE FROM media WHERE id = $1")
                .bind(id)
                .execute(self.pool.postgres()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete media")?;
        Ok(affected > 0)
    }

    async fn increment_views(&self, id: i64) -> Result<Option<Media>> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("UPDATE media SET views = views + 1 WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Postgres => {
                sqlx::query("UPDATE media SET views = views + 1 WHERE id = $1")
                    .bind(id)
                    .execute(self.pool.postgres()?)
                    .await
                    .map(|r| r.rows_affected())
            }
        }
        .context("Failed to increment media views")?;

        if affected == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }
}

fn new_to_media(id: i64, media: &NewMedia, now: chrono::DateTime<Utc>) -> Media {
    Media {
        id,
        media_type: media.media_type,
        title: media.title.clone(),
        description: media.description.clone(),
        url: media.url.clone(),
        thumbnail: media.thumbnail.clone(),
        category: media.category.clone(),
        size: media.size.clone(),
        duration: media.duration.clone(),
        is_published: media.is_published,
        views: 0,
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

fn push_filter_sqlite(qb: &mut QueryBuilder<'_, Sqlite>, filter: &MediaFilter) {
    qb.push(" WHERE 1 = 1");
    if filter.published_only {
        qb.push(" AND is_published = ").push_bind(true);
    }
    if let Some(media_type) = filter.media_type {
        qb.push(" AND media_type = ").push_bind(media_type.as_str());
    }
    match &filter.category {
        Some(category) => {
            qb.push(" AND category = ").push_bind(category.clone());
        }
        None => {
            qb.push(" AND category <> ").push_bind(SYSTEM_CATEGORY);
        }
    }
}

async fn create_media_sqlite(pool: &SqlitePool, media: &NewMedia) -> Result<Media> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO media (media_type, title, description, url, thumbnail, category, size,
                           duration, is_published, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(media.media_type.as_str())
    .bind(&media.title)
    .bind(&media.description)
    .bind(&media.url)
    .bind(&media.thumbnail)
    .bind(&media.category)
    .bind(&media.size)
    .bind(&media.duration)
    .bind(media.is_published)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create media")?;

    Ok(new_to_media(result.last_insert_rowid(), media, now))
}

fn row_to_media_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Media> {
    let media_type: String = row.get("media_type");
    Ok(Media {
        id: row.get("id"),
        media_type: media_type
            .parse::<MediaType>()
            .map_err(|e| anyhow::anyhow!(e))?,
        title: row.get("title"),
        description: row.get("description"),
        url: row.get("url"),
        thumbnail: row.get("thumbnail"),
        category: row.get("category"),
        size: row.get("size"),
        duration: row.get("duration"),
        is_published: row.get("is_published"),
        views: row.get("views"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// PostgreSQL implementations
// ============================================================================

fn push_filter_postgres(qb: &mut QueryBuilder<'_, Postgres>, filter: &MediaFilter) {
    qb.push(" WHERE 1 = 1");
    if filter.published_only {
        qb.push(" AND is_published = ").push_bind(true);
    }
    if let Some(media_type) = filter.media_type {
        qb.push(" AND media_type = ").push_bind(media_type.as_str());
    }
    match &filter.category {
        Some(category) => {
            qb.push(" AND category = ").push_bind(category.clone());
        }
        None => {
            qb.push(" AND category <> ").push_bind(SYSTEM_CATEGORY);
        }
    }
}

async fn create_media_postgres(pool: &PgPool, media: &NewMedia) -> Result<Media> {
    let now = Utc::now();
    let row = sqlx::query(
        r#"
        INSERT INTO media (media_type, title, description, url, thumbnail, category, size,
                           duration, is_published, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(media.media_type.as_str())
    .bind(&media.title)
    .bind(&media.description)
    .bind(&media.url)
    .bind(&media.thumbnail)
    .bind(&media.category)
    .bind(&media.size)
    .bind(&media.duration)
    .bind(media.is_published)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("Failed to create media")?;

    Ok(new_to_media(row.get("id"), media, now))
}

fn row_to_media_postgres(row: &sqlx::postgres::PgRow) -> Result<Media> {
    let media_type: String = row.get("media_type");
    Ok(Media {
        id: row.get("id"),
        media_type: media_type
            .parse::<MediaType>()
            .map_err(|e| anyhow::anyhow!(e))?,
        title: row.get("title"),
        description: row.get("description"),
        url: row.get("url"),
        thumbnail: row.get("thumbnail"),
        category: row.get("category"),
        size: row.get("size"),
        duration: row.get("duration"),
        is_published: row.get("is_published"),
        views: row.get("views"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
