use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identifier of a book.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub i64);

impl Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for BookId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Identifier of a job.
///
/// Every book owns at most one job row and the row is keyed by the book's
/// id, so a job id and its book id always carry the same value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    pub fn for_book(book_id: BookId) -> Self {
        Self(book_id.0)
    }

    pub fn book_id(&self) -> BookId {
        BookId(self.0)
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<BookId> for JobId {
    fn from(value: BookId) -> Self {
        Self::for_book(value)
    }
}

/// Persisted status of a job.
///
/// The orchestrator itself only writes `Running`, `Done` and `Failed`. The
/// remaining codes mark pipeline stages and are written by other parts of
/// the backend directly into the job store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum JobStatus {
    Failed = 0,
    Running = 1,
    Done = 2,
    Empty = 3,
    Profiled = 4,
    PostCorrected = 5,
    ExtendedLexicon = 6,
    ProfiledWithEL = 7,
}

impl JobStatus {
    /// Every status, ordered by code.
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Failed,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Empty,
        JobStatus::Profiled,
        JobStatus::PostCorrected,
        JobStatus::ExtendedLexicon,
        JobStatus::ProfiledWithEL,
    ];

    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Failed => "failed",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Empty => "empty",
            JobStatus::Profiled => "profiled",
            JobStatus::PostCorrected => "post-corrected",
            JobStatus::ExtendedLexicon => "extended-lexicon",
            JobStatus::ProfiledWithEL => "profiled-with-el",
        }
    }

    pub fn from_code(code: i32) -> anyhow::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.code() == code)
            .ok_or_else(|| anyhow::anyhow!("invalid job status code: {}", code))
    }

    pub fn from_name(name: &str) -> anyhow::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == name)
            .ok_or_else(|| anyhow::anyhow!("invalid job status name: {}", name))
    }

    pub fn is_running(&self) -> bool {
        matches!(self, JobStatus::Running)
    }

    /// Anything but `Running` allows the job to be started again.
    pub fn is_terminal(&self) -> bool {
        !self.is_running()
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<JobStatus> for i32 {
    fn from(value: JobStatus) -> Self {
        value.code()
    }
}

impl TryFrom<i32> for JobStatus {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_code(value)
    }
}

/// Snapshot of a job row as seen by status-polling callers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: JobId,
    pub book_id: BookId,
    #[serde(rename = "statusId")]
    pub status: JobStatus,
    pub status_name: String,
    pub job_name: String,
    /// Unix time of the last status write, in seconds.
    pub timestamp: i64,
}

impl JobRecord {
    pub fn new(job_id: JobId, status: JobStatus, job_name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            job_id,
            book_id: job_id.book_id(),
            status,
            status_name: status.as_str().to_string(),
            job_name: job_name.into(),
            timestamp,
        }
    }

    /// Stand-in returned for jobs that cannot be read.
    pub fn failed(job_id: JobId) -> Self {
        Self::new(job_id, JobStatus::Failed, String::new(), 0)
    }

    pub fn time(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp, 0)
            .single()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_the_status_table() {
        assert_eq!(JobStatus::Failed.code(), 0);
        assert_eq!(JobStatus::Running.code(), 1);
        assert_eq!(JobStatus::Done.code(), 2);
        assert_eq!(JobStatus::ProfiledWithEL.code(), 7);

        for status in JobStatus::ALL {
            assert_eq!(JobStatus::from_code(status.code()).unwrap(), status);
            assert_eq!(JobStatus::from_name(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(JobStatus::from_code(8).is_err());
        assert!(JobStatus::from_code(-1).is_err());
        assert!(JobStatus::from_name("cancelled").is_err());
    }

    #[test]
    fn only_running_blocks_a_restart() {
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::PostCorrected.is_terminal());
    }

    #[test]
    fn job_and_book_share_the_id() {
        let id = JobId::for_book(BookId(42));
        assert_eq!(id, JobId(42));
        assert_eq!(id.book_id(), BookId(42));
    }

    #[test]
    fn failed_record_is_fully_populated() {
        let record = JobRecord::failed(JobId(999));
        assert_eq!(record.job_id, JobId(999));
        assert_eq!(record.book_id, BookId(999));
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.status_name, "failed");
        assert_eq!(record.time().timestamp(), 0);
    }

    #[test]
    fn record_uses_api_field_names() {
        let record = JobRecord::new(JobId(3), JobStatus::Running, "profiling", 1_700_000_000);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "jobId": 3,
                "bookId": 3,
                "statusId": 1,
                "statusName": "running",
                "jobName": "profiling",
                "timestamp": 1_700_000_000i64,
            })
        );
    }
}
