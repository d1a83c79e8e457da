//! Category repository
//!
//! - `CategoryRepository` trait defining category data access
//! - `SqlxCategoryRepository` implementing it for SQLite and PostgreSQL

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, SqlitePool};
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::repositories::contains_pattern;
use crate::db::DynDatabasePool;
use crate::models::{Category, NewCategory};

const CATEGORY_COLUMNS: &str = "id, name, name_hi, slug, description, image, icon, color, \
     parent_id, sort_order, created_at, updated_at";

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, category: &NewCategory) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// All categories, roots first, then by sort order
    async fn list(&self) -> Result<Vec<Category>>;

    /// Persist every column of an existing category. `None` when the row is gone.
    async fn update(&self, category: &Category) -> Result<Option<Category>>;

    /// Delete a category. Returns false when it did not exist.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Number of direct sub-categories
    async fn count_children(&self, id: i64) -> Result<i64>;

    /// Case-insensitive match on `name` or `name_hi`
    async fn search(&self, term: &str, limit: i64) -> Result<Vec<Category>>;
}

pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &NewCategory) -> Result<Category> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_category_sqlite(self.pool.sqlite()?, category).await,
            DatabaseDriver::Postgres => {
                create_category_postgres(self.pool.postgres()?, category).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_category_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Postgres => {
                get_category_by_id_postgres(self.pool.postgres()?, id).await
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_category_by_slug_sqlite(self.pool.sqlite()?, slug).await,
            DatabaseDriver::Postgres => {
                get_category_by_slug_postgres(self.pool.postgres()?, slug).await
            }
        }
    }

    async fn list(&self) -> Result<Vec<Category>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_categories_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Postgres => list_categories_postgres(self.pool.postgres()?).await,
        }
    }

    async fn update(&self, category: &Category) -> Result<Option<Category>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_category_sqlite(self.pool.sqlite()?, category).await,
            DatabaseDriver::Postgres => {
                update_category_postgres(self.pool.postgres()?, category).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_category_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Postgres => delete_category_postgres(self.pool.postgres()?, id).await,
        }
    }

    async fn count_children(&self, id: i64) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_children_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Postgres => count_children_postgres(self.pool.postgres()?, id).await,
        }
    }

    async fn search(&self, term: &str, limit: i64) -> Result<Vec<Category>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => search_categories_sqlite(self.pool.sqlite()?, term, limit).await,
            DatabaseDriver::Postgres => {
                search_categories_postgres(self.pool.postgres()?, term, limit).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_category_sqlite(pool: &SqlitePool, category: &NewCategory) -> Result<Category> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO categories (name, name_hi, slug, description, image, icon, color,
                                parent_id, sort_order, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.name)
    .bind(&category.name_hi)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(&category.image)
    .bind(&category.icon)
    .bind(&category.color)
    .bind(category.parent_id)
    .bind(category.sort_order)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(new_to_category(result.last_insert_rowid(), category, now))
}

async fn get_category_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Category>> {
    let row = sqlx::query(&format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get category by ID")?;

    Ok(row.map(|r| row_to_category_sqlite(&r)))
}

async fn get_category_by_slug_sqlite(pool: &SqlitePool, slug: &str) -> Result<Option<Category>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM categories WHERE slug = ?",
        CATEGORY_COLUMNS
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await
    .context("Failed to get category by slug")?;

    Ok(row.map(|r| row_to_category_sqlite(&r)))
}

async fn list_categories_sqlite(pool: &SqlitePool) -> Result<Vec<Category>> {
    // NULL sorts first in SQLite ascending order
    let rows = sqlx::query(&format!(
        "SELECT {} FROM categories ORDER BY parent_id ASC, sort_order ASC, id ASC",
        CATEGORY_COLUMNS
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list categories")?;

    Ok(rows.iter().map(row_to_category_sqlite).collect())
}

async fn update_category_sqlite(pool: &SqlitePool, category: &Category) -> Result<Option<Category>> {
    let result = sqlx::query(
        r#"
        UPDATE categories
        SET name = ?, name_hi = ?, slug = ?, description = ?, image = ?, icon = ?,
            color = ?, parent_id = ?, sort_order = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&category.name)
    .bind(&category.name_hi)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(&category.image)
    .bind(&category.icon)
    .bind(&category.color)
    .bind(category.parent_id)
    .bind(category.sort_order)
    .bind(category.updated_at)
    .bind(category.id)
    .execute(pool)
    .await
    .context("Failed to update category")?;

    Ok((result.rows_affected() > 0).then(|| category.clone()))
}

async fn delete_category_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete category")?;

    Ok(result.rows_affected() > 0)
}

async fn count_children_sqlite(pool: &SqlitePool, id: i64) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM categories WHERE parent_id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to count child categories")?;

    Ok(row.get("count"))
}

async fn search_categories_sqlite(pool: &SqlitePool, term: &str, limit: i64) -> Result<Vec<Category>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM categories \
         WHERE LOWER(name) LIKE ? ESCAPE '\\' OR name_hi LIKE ? ESCAPE '\\' \
         ORDER BY sort_order ASC, id ASC LIMIT ?",
        CATEGORY_COLUMNS
    ))
    .bind(contains_pattern(&term.to_lowercase()))
    .bind(contains_pattern(term))
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to search categories")?;

    Ok(rows.iter().map(row_to_category_sqlite).collect())
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        name_hi: row.get("name_hi"),
        slug: row.get("slug"),
        description: row.get("description"),
        image: row.get("image"),
        icon: row.get("icon"),
        color: row.get("color"),
        parent_id: row.get("parent_id"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn new_to_category(id: i64, category: &NewCategory, now: chrono::DateTime<Utc>) -> Category {
    Category {
        id,
        name: category.name.clone(),
        name_hi: category.name_hi.clone(),
        slug: category.slug.clone(),
        description: category.description.clone(),
        image: category.image.clone(),
        icon: category.icon.clone(),
        color: category.color.clone(),
        parent_id: category.parent_id,
        sort_order: category.sort_order,
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// PostgreSQL implementations
// ============================================================================

async fn create_category_postgres(pool: &PgPool, category: &NewCategory) -> Result<Category> {
    let now = Utc::now();

    let row = sqlx::query(
        r#"
        INSERT INTO categories (name, name_hi, slug, description, image, icon, color,
                                parent_id, sort_order, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(&category.name)
    .bind(&category.name_hi)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(&category.image)
    .bind(&category.icon)
    .bind(&category.color)
    .bind(category.parent_id)
    .bind(category.sort_order)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("Failed to create category")?;

    Ok(new_to_category(row.get("id"), category, now))
}

async fn get_category_by_id_postgres(pool: &PgPool, id: i64) -> Result<Option<Category>> {
    let row = sqlx::query(&format!("SELECT {} FROM categories WHERE id = $1", CATEGORY_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get category by ID")?;

    Ok(row.map(|r| row_to_category_postgres(&r)))
}

async fn get_category_by_slug_postgres(pool: &PgPool, slug: &str) -> Result<Option<Category>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM categories WHERE slug = $1",
        CATEGORY_COLUMNS
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await
    .context("Failed to get category by slug")?;

    Ok(row.map(|r| row_to_category_postgres(&r)))
}

async fn list_categories_postgres(pool: &PgPool) -> Result<Vec<Category>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM categories ORDER BY parent_id ASC NULLS FIRST, sort_order ASC, id ASC",
        CATEGORY_COLUMNS
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list categories")?;

    Ok(rows.iter().map(row_to_category_postgres).collect())
}

async fn update_category_postgres(pool: &PgPool, category: &Category) -> Result<Option<Category>> {
    let result = sqlx::query(
        r#"
        UPDATE categories
        SET name = $1, name_hi = $2, slug = $3, description = $4, image = $5, icon = $6,
            color = $7, parent_id = $8, sort_order = $9, updated_at = $10
        WHERE id = $11
        "#,
    )
    .bind(&category.name)
    .bind(&category.name_hi)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(&category.image)
    .bind(&category.icon)
    .bind(&category.color)
    .bind(category.parent_id)
    .bind(category.sort_order)
    .bind(category.updated_at)
    .bind(category.id)
    .execute(pool)
    .await
    .context("Failed to update category")?;

    Ok((result.rows_affected() > 0).then(|| category.clone()))
}

async fn delete_category_postgres(pool: &PgPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete category")?;

    Ok(result.rows_affected() > 0)
}

async fn count_children_postgres(pool: &PgPool, id: i64) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM categories WHERE parent_id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to count child categories")?;

    Ok(row.get("count"))
}

async fn search_categories_postgres(pool: &PgPool, term: &str, limit: i64) -> Result<Vec<Category>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM categories \
         WHERE name ILIKE $1 ESCAPE '\\' OR name_hi ILIKE $1 ESCAPE '\\' \
         ORDER BY sort_order ASC, id ASC LIMIT $2",
        CATEGORY_COLUMNS
    ))
    .bind(contains_pattern(term))
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to search categories")?;

    Ok(rows.iter().map(row_to_category_postgres).collect())
}

fn row_to_category_postgres(row: &sqlx::postgres::PgRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        name_hi: row.get("name_hi"),
        slug: row.get("slug"),
        description: row.get("description"),
        image: row.get("image"),
        icon: row.get("icon"),
        color: row.get("color"),
        parent_id: row.get("parent_id"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
