use async_trait::async_trait;

use crate::job::{BookId, JobId, JobRecord, JobStatus};

/// Trait for the durable table that tracks one job row per book.
///
/// The orchestrator is not the only writer: other parts of the backend set
/// pipeline statuses directly. No isolation is provided between writers and
/// the last write wins.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Look up a job row. `Ok(None)` if the job does not exist.
    async fn find_job_by_id(&self, job_id: JobId) -> anyhow::Result<Option<JobRecord>>;

    /// Insert a new `Running` job row for a book and return its id.
    async fn create_job(&self, book_id: BookId, name: &str) -> anyhow::Result<JobId>;

    /// Update the status of a job.
    async fn set_status(&self, job_id: JobId, status: JobStatus) -> anyhow::Result<()>;

    /// Update the status and the name of a job.
    async fn set_status_with_text(
        &self,
        job_id: JobId,
        status: JobStatus,
        name: &str,
    ) -> anyhow::Result<()>;

    /// Delete a job row.
    async fn delete_job(&self, job_id: JobId) -> anyhow::Result<()>;
}
