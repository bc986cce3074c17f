use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::config::PersistenceConfig;
use crate::job::{BookId, JobId, JobRecord, JobStatus};
use crate::store::JobStore;

use super::column_job_name;

/// PostgreSQL-backed implementation of the job store.
///
/// Uses the `jobs` table keyed by book id and the `status` lookup table
/// holding the status vocabulary.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    /// Create a new PostgreSQL job store on an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool using the given persistence settings.
    pub async fn connect(config: &PersistenceConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.connection_string)
            .await?;
        Ok(Self::new(pool))
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
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
            sqlx::query(
                r#"
                INSERT INTO status (id, text)
                VALUES ($1, $2)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(status.code())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id BIGINT NOT NULL PRIMARY KEY,
                statusid INTEGER NOT NULL REFERENCES status(id),
                text VARCHAR(50) NOT NULL,
                timestamp BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn find_job_by_id(&self, job_id: JobId) -> anyhow::Result<Option<JobRecord>> {
        let row = sqlx::query(
            r#"
            SELECT j.id, j.timestamp, j.statusid, j.text AS job_name, s.text AS status_name
            FROM jobs AS j
            JOIN status AS s ON j.statusid = s.id
            WHERE j.id = $1
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
        sqlx::query(
            r#"
            INSERT INTO jobs (id, statusid, timestamp, text)
            VALUES ($1, $2, $3, $4)
            "#,
        )
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
        sqlx::query(
            r#"
            UPDATE jobs
            SET statusid = $1,
                timestamp = $2
            WHERE id = $3
            "#,
        )
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
        sqlx::query(
            r#"
            UPDATE jobs
            SET statusid = $1,
                timestamp = $2,
                text = $3
            WHERE id = $4
            "#,
        )
        .bind(status.code())
        .bind(Utc::now().timestamp())
        .bind(column_job_name(name))
        .bind(job_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_job(&self, job_id: JobId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(job_id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
