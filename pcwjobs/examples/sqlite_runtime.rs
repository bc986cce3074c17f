//! SQLite runtime example with a persistent job table.
//!
//! Runs external commands as jobs against a SQLite database file. The job
//! rows survive the process, so running the example twice shows the
//! previous outcome being overwritten by the restart.
//!
//! # Running the Example
//!
//! ```bash
//! # Defaults to ./pcwjobs-example.db
//! export DATABASE_URL="sqlite://pcwjobs-example.db"
//!
//! cargo run --example sqlite_runtime --features sqlite
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use pcwjobs::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "pcwjobs=debug,info".into()),
        )
        .init();

    let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://pcwjobs-example.db".into());
    let store = SqliteJobStore::connect(&PersistenceConfig::new(url)).await?;
    store.create_tables().await?;
    let store = Arc::new(store);

    for id in [JobId(1), JobId(2)] {
        match store.find_job_by_id(id).await? {
            Some(job) => println!("[MAIN] previous run of job {id}: {} at {}", job.status, job.time()),
            None => println!("[MAIN] job {id} has never run"),
        }
    }

    let jobs = JobOrchestrator::new(OrchestratorConfig::default(), Arc::clone(&store));
    let ctx = CancellationToken::new();

    let quick = jobs
        .start(
            &ctx,
            FnRunner::new(BookId(1), "profiling", |token| async move {
                run_command(&token, "sh", ["-c", "echo profiling book 1 >&2"]).await
            }),
        )
        .await?;

    // give the slow job a deadline shorter than its own run time
    let deadline = cancel_after(&ctx, Duration::from_millis(500));
    let slow = jobs
        .start(
            &deadline,
            FnRunner::new(BookId(2), "ocr-training", |token| async move {
                run_command(&token, "sleep", ["10"]).await
            }),
        )
        .await?;

    tokio::time::sleep(Duration::from_secs(1)).await;
    jobs.close().await?;

    for id in [quick, slow] {
        let job = jobs.job(id).await;
        println!(
            "[MAIN] job {}: {} ({}) {}",
            job.job_id,
            job.status,
            job.job_name,
            serde_json::to_string(&job)?
        );
    }
    Ok(())
}
