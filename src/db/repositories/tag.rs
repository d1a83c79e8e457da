//! Tag repository
//!
//! Tags are shared between articles and blogs; each content kind links to
//! them through its own join table (see [`TagTarget`]).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Tag, TagTarget};

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Insert a tag. Fails with a unique violation if the name or slug is taken.
    async fn create(&self, name: &str, slug: &str) -> Result<Tag>;

    /// Replace every tag link of `owner_id` with `tag_ids`
    async fn set_for(&self, target: TagTarget, owner_id: i64, tag_ids: &[i64]) -> Result<()>;

    /// Tags linked to a single content item, ordered by name
    async fn get_for(&self, target: TagTarget, owner_id: i64) -> Result<Vec<Tag>>;

    /// Tags for many content items at once, keyed by owner id
    async fn get_for_many(
        &self,
        target: TagTarget,
        owner_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<Tag>>>;
}

pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_tag_by_sqlite(self.pool.sqlite()?, "slug", slug).await,
            DatabaseDriver::Postgres => {
                get_tag_by_postgres(self.pool.postgres()?, "slug", slug).await
            }
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_tag_by_sqlite(self.pool.sqlite()?, "name", name).await,
            DatabaseDriver::Postgres => {
                get_tag_by_postgres(self.pool.postgres()?, "name", name).await
            }
        }
    }

    async fn create(&self, name: &str, slug: &str) -> Result<Tag> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_tag_sqlite(self.pool.sqlite()?, name, slug).await,
            DatabaseDriver::Postgres => create_tag_postgres(self.pool.postgres()?, name, slug).await,
        }
    }

    async fn set_for(&self, target: TagTarget, owner_id: i64, tag_ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                set_tags_sqlite(self.pool.sqlite()?, target, owner_id, tag_ids).await
            }
            DatabaseDriver::Postgres => {
                set_tags_postgres(self.pool.postgres()?, target, owner_id, tag_ids).await
            }
        }
    }

    async fn get_for(&self, target: TagTarget, owner_id: i64) -> Result<Vec<Tag>> {
        let mut by_owner = self.get_for_many(target, &[owner_id]).await?;
        Ok(by_owner.remove(&owner_id).unwrap_or_default())
    }

    async fn get_for_many(
        &self,
        target: TagTarget,
        owner_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<Tag>>> {
        if owner_ids.is_empty() {
            return Ok(HashMap::new());
        }
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_tags_for_many_sqlite(self.pool.sqlite()?, target, owner_ids).await
            }
            DatabaseDriver::Postgres => {
                get_tags_for_many_postgres(self.pool.postgres()?, target, owner_ids).await
            }
        }
    }
}

fn link_query(target: TagTarget) -> String {
    format!(
        "SELECT j.{col} AS owner_id, t.id, t.name, t.slug, t.created_at \
         FROM {table} j INNER JOIN tags t ON t.id = j.tag_id WHERE j.{col} IN (",
        col = target.column(),
        table = target.table()
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_tag_by_sqlite(pool: &SqlitePool, column: &str, value: &str) -> Result<Option<Tag>> {
    let sql = format!(
        "SELECT id, name, slug, created_at FROM tags WHERE {} = ?",
        column
    );
    let row = sqlx::query(&sql)
        .bind(value)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get tag by {}", column))?;

    Ok(row.map(|r| row_to_tag_sqlite(&r)))
}

async fn create_tag_sqlite(pool: &SqlitePool, name: &str, slug: &str) -> Result<Tag> {
    let now = Utc::now();
    let result = sqlx::query("INSERT INTO tags (name, slug, created_at) VALUES (?, ?, ?)")
        .bind(name)
        .bind(slug)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    Ok(Tag {
        id: result.last_insert_rowid(),
        name: name.to_string(),
        slug: slug.to_string(),
        created_at: now,
    })
}

async fn set_tags_sqlite(
    pool: &SqlitePool,
    target: TagTarget,
    owner_id: i64,
    tag_ids: &[i64],
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(&format!(
        "DELETE FROM {} WHERE {} = ?",
        target.table(),
        target.column()
    ))
    .bind(owner_id)
    .execute(&mut *tx)
    .await
    .context("Failed to detach tags")?;

    let insert = format!(
        "INSERT OR IGNORE INTO {} ({}, tag_id) VALUES (?, ?)",
        target.table(),
        target.column()
    );
    for tag_id in tag_ids {
        sqlx::query(&insert)
            .bind(owner_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach tag")?;
    }

    tx.commit().await.context("Failed to commit tag links")?;
    Ok(())
}

async fn get_tags_for_many_sqlite(
    pool: &SqlitePool,
    target: TagTarget,
    owner_ids: &[i64],
) -> Result<HashMap<i64, Vec<Tag>>> {
    let mut qb = QueryBuilder::<Sqlite>::new(link_query(target));
    let mut ids = qb.separated(", ");
    for id in owner_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(") ORDER BY t.name");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to load tags")?;

    let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
    for row in rows {
        let owner_id: i64 = row.get("owner_id");
        map.entry(owner_id).or_default().push(row_to_tag_sqlite(&row));
    }
    Ok(map)
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// PostgreSQL implementations
// ============================================================================

async fn get_tag_by_postgres(pool: &PgPool, column: &str, value: &str) -> Result<Option<Tag>> {
    let sql = format!(
        "SELECT id, name, slug, created_at FROM tags WHERE {} = $1",
        column
    );
    let row = sqlx::query(&sql)
        .bind(value)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get tag by {}", column))?;

    Ok(row.map(|r| row_to_tag_postgres(&r)))
}

async fn create_tag_postgres(pool: &PgPool, name: &str, slug: &str) -> Result<Tag> {
    let now = Utc::now();
    let row = sqlx::query(
        "INSERT INTO tags (name, slug, created_at) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(name)
    .bind(slug)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("Failed to create tag")?;

    Ok(Tag {
        id: row.get("id"),
        name: name.to_string(),
        slug: slug.to_string(),
        created_at: now,
    })
}

async fn set_tags_postgres(
    pool: &PgPool,
    target: TagTarget,
    owner_id: i64,
    tag_ids: &[i64],
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(&format!(
        "DELETE FROM {} WHERE {} = $1",
        target.table(),
        target.column()
    ))
    .bind(owner_id)
    .execute(&mut *tx)
    .await
    .context("Failed to detach tags")?;

    let insert = format!(
        "INSERT INTO {} ({}, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        target.table(),
        target.column()
    );
    for tag_id in tag_ids {
        sqlx::query(&insert)
            .bind(owner_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach tag")?;
    }

    tx.commit().await.context("Failed to commit tag links")?;
    Ok(())
}

async fn get_tags_for_many_postgres(
    pool: &PgPool,
    target: TagTarget,
    owner_ids: &[i64],
) -> Result<HashMap<i64, Vec<Tag>>> {
    let mut qb = QueryBuilder::<Postgres>::new(link_query(target));
    let mut ids = qb.separated(", ");
    for id in owner_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(") ORDER BY t.name");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to load tags")?;

    let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
    for row in rows {
        let owner_id: i64 = row.get("owner_id");
        map.entry(owner_id).or_default().push(row_to_tag_postgres(&row));
    }
    Ok(map)
}

fn row_to_tag_postgres(row: &sqlx::postgres::PgRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, is_unique_violation, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxTagRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxTagRepository::new(pool.clone());
        (pool, repo)
    }

    async fn seed_blog(pool: &DynDatabasePool) -> i64 {
        let sqlite = pool.sqlite().unwrap();
        sqlx::query("INSERT INTO users (name, email, password_hash) VALUES ('a', 'a@x.in', 'h')")
            .execute(sqlite)
            .await
            .unwrap();
        sqlx::query("INSERT INTO blogs (slug, title, author_id) VALUES ('post-1', 'Post', 1)")
            .execute(sqlite)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (_pool, repo) = setup_test_repo().await;
        let tag = repo.create("Chhattisgarh", "chhattisgarh").await.unwrap();
        assert!(tag.id > 0);

        let by_slug = repo.get_by_slug("chhattisgarh").await.unwrap().unwrap();
        assert_eq!(by_slug.id, tag.id);
        let by_name = repo.get_by_name("Chhattisgarh").await.unwrap().unwrap();
        assert_eq!(by_name.id, tag.id);
        assert!(repo.get_by_slug("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_unique_violation() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create("Budget", "budget").await.unwrap();
        let err = repo.create("Budget 2", "budget").await.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_set_for_replaces_links() {
        let (pool, repo) = setup_test_repo().await;
        let blog_id = seed_blog(&pool).await;
        let a = repo.create("राजनीति", "राजनीति").await.unwrap();
        let b = repo.create("Sports", "sports").await.unwrap();
        let c = repo.create("Weather", "weather").await.unwrap();

        repo.set_for(TagTarget::Blog, blog_id, &[a.id, b.id]).await.unwrap();
        assert_eq!(repo.get_for(TagTarget::Blog, blog_id).await.unwrap().len(), 2);

        repo.set_for(TagTarget::Blog, blog_id, &[c.id]).await.unwrap();
        let tags = repo.get_for(TagTarget::Blog, blog_id).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].slug, "weather");

        let many = repo.get_for_many(TagTarget::Blog, &[blog_id, 999]).await.unwrap();
        assert_eq!(many.get(&blog_id).map(Vec::len), Some(1));
        assert!(!many.contains_key(&999));
        assert!(repo.get_for_many(TagTarget::Article, &[]).await.unwrap().is_empty());
    }
}
