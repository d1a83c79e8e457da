//! User repository
//!
//! Staff accounts. Content responses embed author summaries, so besides the
//! usual lookups there is a batch `get_by_ids` for list views.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{User, UserRole};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, image, bio, created_at, updated_at";

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Email lookup is case-insensitive
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Users keyed by id; unknown ids are skipped
    async fn get_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, User>>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Postgres => create_user_postgres(self.pool.postgres()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let mut users = self.get_by_ids(&[id]).await?;
        Ok(users.remove(&id))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim().to_lowercase();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&format!(
                    "SELECT {} FROM users WHERE LOWER(email) = ?",
                    USER_COLUMNS
                ))
                .bind(&email)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get user by email")?;
                row.map(|r| row_to_user_sqlite(&r)).transpose()
            }
            DatabaseDriver::Postgres => {
                let row = sqlx::query(&format!(
                    "SELECT {} FROM users WHERE LOWER(email) = $1",
                    USER_COLUMNS
                ))
                .bind(&email)
                .fetch_optional(self.pool.postgres()?)
                .await
                .context("Failed to get user by email")?;
                row.map(|r| row_to_user_postgres(&r)).transpose()
            }
        }
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, User>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let users = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut qb = QueryBuilder::<Sqlite>::new(format!(
                    "SELECT {} FROM users WHERE id IN (",
                    USER_COLUMNS
                ));
                let mut list = qb.separated(", ");
                for id in ids {
                    list.push_bind(*id);
                }
                list.push_unseparated(")");
                let rows = qb
                    .build()
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to get users by IDs")?;
                rows.iter().map(row_to_user_sqlite).collect::<Result<Vec<_>>>()?
            }
            DatabaseDriver::Postgres => {
                let mut qb = QueryBuilder::<Postgres>::new(format!(
                    "SELECT {} FROM users WHERE id IN (",
                    USER_COLUMNS
                ));
                let mut list = qb.separated(", ");
                for id in ids {
                    list.push_bind(*id);
                }
                list.push_unseparated(")");
                let rows = qb
                    .build()
                    .fetch_all(self.pool.postgres()?)
                    .await
                    .context("Failed to get users by IDs")?;
                rows.iter().map(row_to_user_postgres).collect::<Result<Vec<_>>>()?
            }
        };
        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }

    async fn count(&self) -> Result<i64> {
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("SELECT COUNT(*) as count FROM users")
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count users")?
                .get("count"),
            DatabaseDriver::Postgres => sqlx::query("SELECT COUNT(*) as count FROM users")
                .fetch_one(self.pool.postgres()?)
                .await
                .context("Failed to count users")?
                .get("count"),
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, role, image, bio, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(user.email.trim().to_lowercase())
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(&user.image)
    .bind(&user.bio)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        email: user.email.trim().to_lowercase(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role.parse::<UserRole>()?,
        image: row.get("image"),
        bio: row.get("bio"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// PostgreSQL implementations
// ============================================================================

async fn create_user_postgres(pool: &PgPool, user: &User) -> Result<User> {
    let now = Utc::now();
    let row = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, role, image, bio, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(&user.name)
    .bind(user.email.trim().to_lowercase())
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(&user.image)
    .bind(&user.bio)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: row.get("id"),
        email: user.email.trim().to_lowercase(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

fn row_to_user_postgres(row: &sqlx::postgres::PgRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role.parse::<UserRole>()?,
        image: row.get("image"),
        bio: row.get("bio"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
