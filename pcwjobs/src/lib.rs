//! pcwjobs - Background job orchestration for the post-correction backend.
//!
//! Long running work on a book (profiling, lexicon extension, automatic
//! post-correction) runs as a background job. At most one job per book runs
//! at a time, each job's status is persisted in a job store, and every job
//! can be cancelled cooperatively.
//!
//! # Core Concepts
//!
//! - **Runner**: A unit of work for one book, implementing [`Runner`]. The
//!   [`FnRunner`] adapter wraps a closure and [`run_command`] drives an
//!   external program under a cancellation token.
//!
//! - **Job store**: The [`JobStore`] trait abstracts the table of job rows.
//!   A book's job id equals its book id, so the row for a book is created
//!   once and reused by every later job on that book.
//!
//! - **Orchestrator**: [`JobOrchestrator`] starts runners as background jobs,
//!   reports job state, and shuts everything down on [`JobOrchestrator::close`].
//!
//! - **Cancellation**: [`CancellationToken`] from tokio-util. Each run gets a child of
//!   the caller's token and is cancelled when either side cancels.
//!
//! # Feature Flags
//!
//! - `postgres` - PostgreSQL job store via sqlx
//! - `sqlite` - SQLite job store via sqlx
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! Runnable versions live in `examples/basic.rs` and
//! `examples/sqlite_runtime.rs`.
//!
//! ```ignore
//! use pcwjobs::*;
//!
//! let jobs = JobOrchestrator::new(OrchestratorConfig::default(), store);
//! let ctx = CancellationToken::new();
//! let id = jobs
//!     .start(&ctx, FnRunner::new(BookId(7), "profiling", |token| async move {
//!         run_command(&token, "pcw-profiler", ["--book", "7"]).await
//!     }))
//!     .await?;
//! let state = jobs.job(id).await;
//! jobs.close().await?;
//! ```

/// Configuration structures for the orchestrator and the SQL stores.
pub mod config;

/// Error type returned by the orchestrator.
pub mod error;

/// Job identifiers, the status vocabulary and job records.
///
/// The `job` module defines:
/// - [`BookId`] and [`JobId`] - identifiers, equal for a given book
/// - [`JobStatus`] - the persisted status codes
/// - [`JobRecord`] - the state reported for a job
pub mod job;

#[cfg(feature = "metrics")]
/// Prometheus metrics for job executions.
pub mod metrics;

/// SQL-backed job stores.
///
/// Available with the `postgres` or `sqlite` features.
#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub mod persistence;

/// The work contract executed by background jobs.
pub mod runner;

/// Orchestration runtime.
///
/// The `runtime` module provides:
/// - [`JobOrchestrator`] - the façade owning the dispatcher
/// - [`JobOrchestratorBuilder`] - builder wiring in the store
/// - [`CancellationToken`] - cooperative cancellation
pub mod runtime;

/// Job store abstraction.
pub mod store;

/// Tracing spans and lifecycle recording.
pub mod telemetry;

pub use config::*;
pub use error::JobsError;
pub use job::*;
#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub use persistence::*;
pub use runner::{run_command, FnRunner, Runner};
pub use runtime::{cancel_after, CancellationToken, JobOrchestrator, JobOrchestratorBuilder};
pub use store::JobStore;
