//! Database connection pool management
//!
//! Wraps SQLx's SqlitePool with directory creation, WAL journal mode,
//! schema creation on first connection, and an in-memory mode for tests.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use driftsync_core::ports::StoreError;

/// Manages a pool of SQLite connections for DriftSync state persistence
///
/// File-backed pools use WAL journal mode and up to 5 connections with a
/// 5-second busy timeout; in-memory pools use a single connection because
/// SQLite in-memory databases are per-connection.
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the database at `db_path` and ensures the
    /// schema exists
    ///
    /// # Errors
    /// Returns [`StoreError::Database`] if the connection or schema
    /// creation fails.
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Database(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::Database(format!(
                    "Failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        Self::create_schema(&pool).await?;

        tracing::info!(path = %db_path.display(), "database pool initialized");
        Ok(Self { pool })
    }

    /// Creates an in-memory database pool for testing
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                StoreError::Database(format!("Failed to create in-memory database: {}", e))
            })?;

        Self::create_schema(&pool).await?;

        tracing::debug!("in-memory database pool initialized");
        Ok(Self { pool })
    }

    /// The underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        let schema_sql = include_str!("migrations/20260301_initial.sql");
        sqlx::raw_sql(schema_sql)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to create schema: {}", e)))?;
        Ok(())
    }
}
