//! Database layer
//!
//! SQLite (default, single-file deployments and tests) and PostgreSQL are both
//! supported behind the [`DatabasePool`] trait. Repositories hold a
//! [`DynDatabasePool`] and dispatch per driver.
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, is_unique_violation, DatabasePool, DynDatabasePool,
    PostgresDatabase, SqliteDatabase,
};
