//! Basic orchestrator example with an in-memory job store.
//!
//! Starts a few jobs for different books, joins a duplicate start, polls
//! their state and closes the orchestrator while one job is still running.
//!
//! ```bash
//! cargo run --example basic
//! ```

use std::sync::Arc;
use std::time::Duration;

use pcwjobs::*;
use pcwjobs_testkit::InMemoryJobStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let store = Arc::new(InMemoryJobStore::new());
    let jobs = JobOrchestratorBuilder::new(OrchestratorConfig::default())
        .with_store(Arc::clone(&store))
        .build()?;
    let ctx = CancellationToken::new();

    let profiled = jobs
        .start(
            &ctx,
            FnRunner::new(BookId(1), "profiling", |_| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            }),
        )
        .await?;

    let failed = jobs
        .start(
            &ctx,
            FnRunner::new(BookId(2), "lexicon", |_| async {
                anyhow::bail!("lexicon service unreachable")
            }),
        )
        .await?;

    let long_running = FnRunner::new(BookId(3), "post-correction", |token| async move {
        token.cancelled().await;
        anyhow::bail!("canceled")
    });
    let running = jobs.start(&ctx, long_running).await?;

    // a second start for the same book joins the running job
    let joined = jobs
        .start(&ctx, FnRunner::new(BookId(3), "post-correction", |_| async { Ok(()) }))
        .await?;
    println!("[MAIN] second start for book 3 returned job {joined} (first was {running})");

    tokio::time::sleep(Duration::from_millis(200)).await;
    for id in [profiled, failed, running, JobId(99)] {
        let job = jobs.job(id).await;
        println!("[MAIN] job {}: {} ({})", job.job_id, job.status, job.job_name);
    }

    println!("[MAIN] closing");
    jobs.close().await?;

    let job = jobs.job(running).await;
    println!("[MAIN] after close, job {}: {}", job.job_id, job.status);
    Ok(())
}
