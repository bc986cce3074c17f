//! Tracing and telemetry instrumentation for pcwjobs.
//!
//! Helpers that create tracing spans and record job lifecycle events. Each
//! `record_*` function logs through `tracing` and, with the `metrics`
//! feature enabled, also updates the Prometheus metrics in
//! [`crate::metrics`].
//!
//! # Example
//!
//! ```ignore
//! use pcwjobs::telemetry::{record_job_start, record_job_end};
//!
//! let handle = record_job_start(job_id.to_string());
//! let result = runner.run(token).await;
//! record_job_end(handle, "done");
//! ```

use std::future::Future;
use tracing::{info_span, Instrument, Span};

/// Create a tracing span for a `start` request.
#[must_use]
pub fn job_start_span(job_id: impl AsRef<str>, job_name: impl AsRef<str>) -> Span {
    info_span!(
        "pcwjobs.start",
        job_id = %job_id.as_ref(),
        job_name = %job_name.as_ref(),
    )
}

/// Create a tracing span covering the execution of a runner.
#[must_use]
pub fn job_run_span(job_id: impl AsRef<str>, job_name: impl AsRef<str>) -> Span {
    info_span!(
        "pcwjobs.run",
        job_id = %job_id.as_ref(),
        job_name = %job_name.as_ref(),
    )
}

/// Create a tracing span for persisting the outcome of a job.
#[must_use]
pub fn job_finish_span(job_id: impl AsRef<str>, status: impl AsRef<str>) -> Span {
    info_span!(
        "pcwjobs.finish",
        job_id = %job_id.as_ref(),
        status = %status.as_ref(),
    )
}

/// Instrument a future with a job run span.
pub fn instrument_run<F>(
    job_id: impl AsRef<str>,
    job_name: impl AsRef<str>,
    future: F,
) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let span = job_run_span(job_id, job_name);
    future.instrument(span)
}

/// Record that a job execution was launched.
pub fn record_job_started(job_id: impl AsRef<str>, job_name: impl AsRef<str>) {
    tracing::info!(
        job_id = %job_id.as_ref(),
        job_name = %job_name.as_ref(),
        "job started"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_started();
}

/// Record that a job execution returned.
///
/// `status` is the persisted outcome (`done` or `failed`).
pub fn record_job_finished(job_id: impl AsRef<str>, status: impl AsRef<str>) {
    tracing::info!(
        job_id = %job_id.as_ref(),
        status = %status.as_ref(),
        "job finished"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_finished(status.as_ref());
}

/// Record the start of job execution for duration tracking.
///
/// Returns an opaque handle that should be passed to [`record_job_end`].
pub fn record_job_start(job_id: impl AsRef<str>) -> JobTimingHandle {
    JobTimingHandle {
        job_id: job_id.as_ref().to_string(),
        start: std::time::Instant::now(),
    }
}

/// Record the end of job execution and update duration metrics.
pub fn record_job_end(handle: JobTimingHandle, status: impl AsRef<str>) {
    let duration_secs = handle.start.elapsed().as_secs_f64();

    tracing::debug!(
        job_id = %handle.job_id,
        status = %status.as_ref(),
        duration_secs = duration_secs,
        "job duration observed"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::observe_job_duration(status.as_ref(), duration_secs);
}

/// Handle for tracking job execution duration.
#[derive(Debug)]
pub struct JobTimingHandle {
    job_id: String,
    start: std::time::Instant,
}

impl JobTimingHandle {
    /// Get the job ID associated with this timing handle.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Get the elapsed time since the job started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
