//! Database layer for the costume studio backend.
//!
//! Provides SQLite connection pooling and query modules
//! for users, uploads and merge jobs.

mod merge_jobs;
mod pool;
mod uploads;
mod users;

pub use merge_jobs::*;
pub use pool::{create_pool_with_config, health_check, PoolConfig};
pub use uploads::*;
pub use users::*;

use crate::Result;
use tracing::info;

/// Type alias for the SQLite connection pool.
pub type DbPool = sqlx::SqlitePool;

/// Initialize the database connection pool.
///
/// Creates parent directories if needed. `:memory:` databases get a
/// single-connection pool so every query sees the same database.
pub async fn init_pool(path: &str) -> Result<DbPool> {
    let pool = create_pool_with_config(path, PoolConfig::for_path(path)).await?;

    info!("Database pool initialized: {}", path);

    Ok(pool)
}

/// Initialize the database schema.
///
/// Applies the complete schema from schema.sql. Uses IF NOT EXISTS
/// clauses so it's safe to run multiple times.
pub async fn initialize_schema(pool: &DbPool) -> Result<()> {
    let schema = include_str!("../../schema.sql");

    info!("Initializing database schema");

    for statement in schema_statements(schema) {
        sqlx::query(&statement).execute(pool).await?;
    }

    info!("Database schema initialized successfully");

    Ok(())
}

/// Split a schema script into statements.
///
/// Comment lines are dropped before splitting on `;`, so comments may
/// contain semicolons.
fn schema_statements(schema: &str) -> Vec<String> {
    let sql: String = schema
        .lines()
        .filter(|line| !line.trim().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(String::from)
        .collect()
}

/// Whether a write was rejected by a UNIQUE constraint.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Whether a write was rejected by a FOREIGN KEY constraint.
pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Whose rows a query may see.
///
/// Anonymous callers only see rows without an owner; signed-in users only
/// see their own rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Anonymous,
    User(i64),
}

impl Owner {
    /// The `user_id` column value for rows owned by this caller.
    pub fn user_id(self) -> Option<i64> {
        match self {
            Owner::Anonymous => None,
            Owner::User(id) => Some(id),
        }
    }
}
