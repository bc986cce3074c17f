use crate::job::JobId;

/// Errors returned synchronously by the orchestrator.
///
/// Failures of a running job are never returned here; they end up as a
/// `Failed` status in the job store.
#[derive(Debug, thiserror::Error)]
pub enum JobsError {
    #[error("cannot start job id {job_id}: {source}")]
    Store {
        job_id: JobId,
        #[source]
        source: anyhow::Error,
    },

    #[error("job orchestrator is closed")]
    Closed,
}

impl JobsError {
    pub(crate) fn store(job_id: JobId, source: anyhow::Error) -> Self {
        Self::Store { job_id, source }
    }
}
