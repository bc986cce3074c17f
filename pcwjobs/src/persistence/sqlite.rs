use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::config::PersistenceConfig;
use crate::job::{BookId, JobId, JobRecord, JobStatus};
use crate::store::JobStore;

use super::column_job_name;

/// SQLite-backed implementation of the job store.
///
/// Same schema as the PostgreSQL store. For `sqlite::memory:` databases
/// keep the pool at a single connection, every connection opens its own
/// in-memory database.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Create a new SQLite job store on an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect a new pool, creating the database file if it is missing.
    pub async fn connect(config: &PersistenceConfig) -> anyhow::Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&config.connection_string)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the `status` and `jobs` tables if they do not exist yet and
    /// seed the status vocabulary.
    pub async fn create_tables(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS status (
                id INTEGER NOT NULL PRIMARY KEY,
                text VARCHAR(20) NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for status in JobStatus::ALL {
            sqlx::query("INSERT OR IGNORE INTO status (id, text) VALUES (?, ?)")
                .bind(status.code())
                .bind(status.as_str())
                .execute(&self.pool)
                .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER NOT NULL PRIMARY KEY,
                statusid INTEGER NOT NULL REFERENCES status(id),
                text VARCHAR(50) NOT NULL,
                timestamp INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn find_job_by_id(&self, job_id: JobId) -> anyhow::Result<Option<JobRecord>> {
        let row = sqlx::query(
            r#"
            SELECT j.id, j.timestamp, j.statusid, j.text AS job_name, s.text AS status_name
            FROM jobs AS j
            JOIN status AS s ON j.statusid = s.id
            WHERE j.id = ?
            "#,
        )
        .bind(job_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row.try_get("id")?;
        let status = JobStatus::from_code(row.try_get("statusid")?)?;
        Ok(Some(JobRecord {
            job_id: JobId(id),
            book_id: BookId(id),
            status,
            status_name: row.try_get("status_name")?,
            job_name: row.try_get("job_name")?,
            timestamp: row.try_get("timestamp")?,
        }))
    }

    async fn create_job(&self, book_id: BookId, name: &str) -> anyhow::Result<JobId> {
        sqlx::query("INSERT INTO jobs (id, statusid, timestamp, text) VALUES (?, ?, ?, ?)")
            .bind(book_id.0)
            .bind(JobStatus::Running.code())
            .bind(Utc::now().timestamp())
            .bind(column_job_name(name))
            .execute(&self.pool)
            .await?;

        debug!(book_id = %book_id, "created job row");
        Ok(JobId::for_book(book_id))
    }

    async fn set_status(&self, job_id: JobId, status: JobStatus) -> anyhow::Result<()> {
        sqlx::query("UPDATE jobs SET statusid = ?, timestamp = ? WHERE id = ?")
            .bind(status.code())
            .bind(Utc::now().timestamp())
            .bind(job_id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_status_with_text(
        &self,
        job_id: JobId,
        status: JobStatus,
        name: &str,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE jobs SET statusid = ?, timestamp = ?, text = ? WHERE id = ?")
            .bind(status.code())
            .bind(Utc::now().timestamp())
            .bind(column_job_name(name))
            .bind(job_id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_job(&self, job_id: JobId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(job_id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
