use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use pcwjobs::*;

/// One status write observed by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreWrite {
    pub job_id: JobId,
    pub status: JobStatus,
    pub name: Option<String>,
}

#[derive(Default)]
struct Inner {
    jobs: Mutex<HashMap<JobId, JobRecord>>,
    writes: Mutex<Vec<StoreWrite>>,
    creates: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

/// Job store kept in a map, shared between clones.
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    inner: Arc<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read fail until switched off again.
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every create and status write fail until switched off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Put a row in place without recording a write.
    pub fn insert(&self, record: JobRecord) {
        self.inner.jobs.lock().insert(record.job_id, record);
    }

    /// Current row for a job, bypassing failure injection.
    pub fn get(&self, job_id: JobId) -> Option<JobRecord> {
        self.inner.jobs.lock().get(&job_id).cloned()
    }

    pub fn status_of(&self, job_id: JobId) -> Option<JobStatus> {
        self.get(job_id).map(|job| job.status)
    }

    /// Number of successful `create_job` calls.
    pub fn create_count(&self) -> usize {
        self.inner.creates.load(Ordering::SeqCst)
    }

    /// Every successful status write in order, creates included.
    pub fn writes(&self) -> Vec<StoreWrite> {
        self.inner.writes.lock().clone()
    }

    pub fn writes_for(&self, job_id: JobId) -> Vec<JobStatus> {
        self.inner
            .writes
            .lock()
            .iter()
            .filter(|write| write.job_id == job_id)
            .map(|write| write.status)
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.inner.writes.lock().len()
    }

    fn check_reads(&self) -> anyhow::Result<()> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("injected read failure");
        }
        Ok(())
    }

    fn check_writes(&self) -> anyhow::Result<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("injected write failure");
        }
        Ok(())
    }

    fn update(&self, job_id: JobId, status: JobStatus, name: Option<&str>) -> anyhow::Result<()> {
        self.check_writes()?;
        let mut jobs = self.inner.jobs.lock();
        if let Some(job) = jobs.get_mut(&job_id) {
            job.status = status;
            job.status_name = status.as_str().to_string();
            job.timestamp = Utc::now().timestamp();
            if let Some(name) = name {
                job.job_name = name.to_string();
            }
        }
        self.inner.writes.lock().push(StoreWrite {
            job_id,
            status,
            name: name.map(str::to_string),
        });
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn find_job_by_id(&self, job_id: JobId) -> anyhow::Result<Option<JobRecord>> {
        self.check_reads()?;
        Ok(self.get(job_id))
    }

    async fn create_job(&self, book_id: BookId, name: &str) -> anyhow::Result<JobId> {
        self.check_writes()?;
        let job_id = JobId::for_book(book_id);
        let mut jobs = self.inner.jobs.lock();
        if jobs.contains_key(&job_id) {
            anyhow::bail!("duplicate key value violates unique constraint on job id {job_id}");
        }
        jobs.insert(
            job_id,
            JobRecord::new(job_id, JobStatus::Running, name, Utc::now().timestamp()),
        );
        self.inner.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.writes.lock().push(StoreWrite {
            job_id,
            status: JobStatus::Running,
            name: Some(name.to_string()),
        });
        Ok(job_id)
    }

    async fn set_status(&self, job_id: JobId, status: JobStatus) -> anyhow::Result<()> {
        self.update(job_id, status, None)
    }

    async fn set_status_with_text(
        &self,
        job_id: JobId,
        status: JobStatus,
        name: &str,
    ) -> anyhow::Result<()> {
        self.update(job_id, status, Some(name))
    }

    async fn delete_job(&self, job_id: JobId) -> anyhow::Result<()> {
        self.check_writes()?;
        self.inner.jobs.lock().remove(&job_id);
        Ok(())
    }
}
