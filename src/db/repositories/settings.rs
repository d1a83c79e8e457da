//! Settings repository
//!
//! Key/value site settings. Callers read them through the settings snapshot,
//! this repository is only touched on load and on admin writes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, SqlitePool};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;

/// A setting key-value pair
#[derive(Debug, Clone)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Get a single setting by key
    async fn get(&self, key: &str) -> Result<Option<Setting>>;

    /// Get all settings ordered by key
    async fn get_all(&self) -> Result<Vec<Setting>>;

    /// Upsert a batch of settings in one transaction
    async fn set_many(&self, settings: &BTreeMap<String, String>) -> Result<()>;
}

pub struct SqlxSettingsRepository {
    pool: DynDatabasePool,
}

impl SqlxSettingsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SettingsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<Setting>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_sqlite(self.pool.sqlite()?, key).await,
            DatabaseDriver::Postgres => get_postgres(self.pool.postgres()?, key).await,
        }
    }

    async fn get_all(&self) -> Result<Vec<Setting>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_all_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Postgres => get_all_postgres(self.pool.postgres()?).await,
        }
    }

    async fn set_many(&self, settings: &BTreeMap<String, String>) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => set_many_sqlite(self.pool.sqlite()?, settings).await,
            DatabaseDriver::Postgres => set_many_postgres(self.pool.postgres()?, settings).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_sqlite(pool: &SqlitePool, key: &str) -> Result<Option<Setting>> {
    let row = sqlx::query("SELECT key, value, updated_at FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get setting")?;

    Ok(row.map(|r| Setting {
        key: r.get("key"),
        value: r.get("value"),
        updated_at: r.get("updated_at"),
    }))
}

async fn get_all_sqlite(pool: &SqlitePool) -> Result<Vec<Setting>> {
    let rows = sqlx::query("SELECT key, value, updated_at FROM settings ORDER BY key")
        .fetch_all(pool)
        .await
        .context("Failed to list settings")?;

    Ok(rows
        .into_iter()
        .map(|r| Setting {
            key: r.get("key"),
            value: r.get("value"),
            updated_at: r.get("updated_at"),
        })
        .collect())
}

async fn set_many_sqlite(pool: &SqlitePool, settings: &BTreeMap<String, String>) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let now = Utc::now();
    for (key, value) in settings {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to set setting {}", key))?;
    }
    tx.commit().await.context("Failed to commit settings")?;
    Ok(())
}

// ============================================================================
// PostgreSQL implementations
// ============================================================================

async fn get_postgres(pool: &PgPool, key: &str) -> Result<Option<Setting>> {
    let row = sqlx::query("SELECT key, value, updated_at FROM settings WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get setting")?;

    Ok(row.map(|r| Setting {
        key: r.get("key"),
        value: r.get("value"),
        updated_at: r.get("updated_at"),
    }))
}

async fn get_all_postgres(pool: &PgPool) -> Result<Vec<Setting>> {
    let rows = sqlx::query("SELECT key, value, updated_at FROM settings ORDER BY key")
        .fetch_all(pool)
        .await
        .context("Failed to list settings")?;

    Ok(rows
        .into_iter()
        .map(|r| Setting {
            key: r.get("key"),
            value: r.get("value"),
            updated_at: r.get("updated_at"),
        })
        .collect())
}

async fn set_many_postgres(pool: &PgPool, settings: &BTreeMap<String, String>) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let now = Utc::now();
    for (key, value) in settings {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES ($1, $2, $3)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to set setting {}", key))?;
    }
    tx.commit().await.context("Failed to commit settings")?;
    Ok(())
}
