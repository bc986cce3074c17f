/// SQL implementations of the job store.
///
/// `PostgresJobStore` is available with the `postgres` feature and
/// `SqliteJobStore` with the `sqlite` feature.
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresJobStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteJobStore;

/// Width of the `jobs.text` column.
pub const JOB_NAME_MAX_CHARS: usize = 50;

/// Cut a job name to the width of the `jobs.text` column.
pub(crate) fn column_job_name(name: &str) -> &str {
    match name.char_indices().nth(JOB_NAME_MAX_CHARS) {
        Some((end, _)) => &name[..end],
        None => name,
    }
}
