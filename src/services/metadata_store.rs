//! src/services/metadata_store.rs
//!
//! Relational side of the service: the `health_checks` log and the `files`
//! metadata table, both in SQLite. Every write runs in its own transaction;
//! a failed write is rolled back best-effort and the rollback error, if any,
//! is only logged.

use crate::{
    errors::{StoreError, StoreResult},
    models::{file_record::FileRecord, health_check::HealthCheckRecord},
};
use async_trait::async_trait;
use sqlx::{
    Sqlite, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc};
use tracing::{debug, warn};

/// Schema applied on every start; all statements are idempotent.
const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

/// Capability the handlers need from the relational store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert one health-check row and commit it.
    async fn insert_health_check(&self) -> StoreResult<HealthCheckRecord>;

    /// Insert a file row and commit it.
    async fn insert_file(&self, record: &FileRecord) -> StoreResult<()>;

    /// Look up a file row; `Ok(None)` when no row has this id.
    async fn get_file(&self, id: &str) -> StoreResult<Option<FileRecord>>;

    /// Delete a file row and commit. Fails with `FileNotFound` when no row
    /// was removed.
    async fn delete_file(&self, id: &str) -> StoreResult<()>;
}

/// Open a SQLite pool for `database_url`.
///
/// In-memory databases get a single connection that is never recycled,
/// otherwise each pooled connection would see its own empty database.
pub async fn connect(database_url: &str, in_memory: bool) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    Ok(pool_options.connect_with(options).await?)
}

/// `MetadataStore` over a shared SQLite pool.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Create the tables if they are missing.
    ///
    /// Returns the number of statements executed.
    pub async fn bootstrap(&self) -> StoreResult<usize> {
        let statements = INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }

        Ok(statements.len())
    }
}

/// Roll back a failed transaction, swallowing any error from the rollback.
async fn rollback_quietly(tx: Transaction<'_, Sqlite>, context: &str) {
    if let Err(err) = tx.rollback().await {
        warn!("rollback after failed {} also failed: {}", context, err);
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn insert_health_check(&self) -> StoreResult<HealthCheckRecord> {
        let mut tx = self.db.begin().await?;
        let inserted = sqlx::query_as::<_, HealthCheckRecord>(
            "INSERT INTO health_checks DEFAULT VALUES RETURNING check_id, created_at",
        )
        .fetch_one(&mut *tx)
        .await;

        match inserted {
            Ok(record) => {
                tx.commit().await?;
                Ok(record)
            }
            Err(err) => {
                rollback_quietly(tx, "health check insert").await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    async fn insert_file(&self, record: &FileRecord) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO files (id, file_name, url, upload_date) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.file_name)
        .bind(&record.url)
        .bind(record.upload_date)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(err) => {
                rollback_quietly(tx, "file insert").await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    async fn get_file(&self, id: &str) -> StoreResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(
            "SELECT file_name, id, url, upload_date FROM files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        Ok(record)
    }

    async fn delete_file(&self, id: &str) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        let deleted = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await;

        match deleted {
            Ok(result) if result.rows_affected() == 0 => {
                rollback_quietly(tx, "file delete").await;
                Err(StoreError::FileNotFound(id.to_string()))
            }
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(err) => {
                rollback_quietly(tx, "file delete").await;
                Err(StoreError::Sqlx(err))
            }
        }
    }
}
