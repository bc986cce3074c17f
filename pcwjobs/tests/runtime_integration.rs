//! Integration tests for the job orchestrator.
//!
//! Covers job outcomes, join semantics, restarts, store failures and the
//! shutdown protocol against the in-memory store from the testkit.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pcwjobs::*;
use pcwjobs_testkit::{InMemoryJobStore, RunStats, RunnerMode, TestRunner};
use tokio::time::timeout;

fn orchestrator(store: &InMemoryJobStore) -> JobOrchestrator<InMemoryJobStore> {
    JobOrchestratorBuilder::new(OrchestratorConfig::default())
        .with_store(Arc::new(store.clone()))
        .build()
        .expect("store provided")
}

async fn wait_for_status(
    jobs: &JobOrchestrator<InMemoryJobStore>,
    job_id: JobId,
    status: JobStatus,
) -> JobRecord {
    timeout(Duration::from_secs(5), async {
        loop {
            let job = jobs.job(job_id).await;
            if job.status == status {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {job_id} never reached {status}"))
}

async fn close(jobs: &JobOrchestrator<InMemoryJobStore>) {
    timeout(Duration::from_secs(5), jobs.close())
        .await
        .expect("close did not complete")
        .expect("close failed");
}

#[tokio::test]
async fn test_successful_runner_is_done() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);

    let id = jobs
        .start(&CancellationToken::new(), TestRunner::succeed(42).with_name("profiling"))
        .await
        .unwrap();
    assert_eq!(id, JobId(42));

    let job = wait_for_status(&jobs, id, JobStatus::Done).await;
    assert_eq!(job.book_id, BookId(42));
    assert_eq!(jobs.store().status_of(id), Some(JobStatus::Done));
    assert_eq!(jobs.config().mailbox_capacity, 64);
    assert_eq!(job.job_name, "profiling");
    assert_eq!(job.status_name, "done");
    close(&jobs).await;
}

#[tokio::test]
async fn test_failing_runner_is_failed() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);

    let id = jobs
        .start(&CancellationToken::new(), TestRunner::fail(7, "boom"))
        .await
        .unwrap();

    wait_for_status(&jobs, id, JobStatus::Failed).await;
    close(&jobs).await;
}

#[tokio::test]
async fn test_close_cancels_running_job() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    let runner = TestRunner::until_cancelled(9);
    let stats = runner.stats();

    let id = jobs.start(&CancellationToken::new(), runner).await.unwrap();
    close(&jobs).await;

    assert_eq!(stats.cancelled(), 1);
    assert_eq!(stats.active(), 0);
    assert_eq!(jobs.job(id).await.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_close_stops_polling_runner() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    let runner = FnRunner::new(BookId(10), "polling", |token| async move {
        while !token.is_cancelled() {
            tokio::task::yield_now().await;
        }
        anyhow::bail!("canceled")
    });

    let id = jobs.start(&CancellationToken::new(), runner).await.unwrap();
    close(&jobs).await;

    assert_eq!(jobs.job(id).await.status, JobStatus::Failed);
    assert_eq!(store.writes_for(id), vec![JobStatus::Running, JobStatus::Failed]);
}

#[tokio::test]
async fn test_second_start_joins_running_job() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    let gate = CancellationToken::new();
    let first = TestRunner::gated(5, gate.clone());
    let stats = first.stats();
    let second = TestRunner::gated(5, gate.clone()).with_stats(Arc::clone(&stats));

    let ctx = CancellationToken::new();
    let a = jobs.start(&ctx, first).await.unwrap();
    let b = jobs.start(&ctx, second).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(store.create_count(), 1);

    gate.cancel();
    wait_for_status(&jobs, a, JobStatus::Done).await;
    close(&jobs).await;

    assert_eq!(stats.runs(), 1);
    assert_eq!(store.writes_for(a), vec![JobStatus::Running, JobStatus::Done]);
}

#[tokio::test]
async fn test_concurrent_starts_create_one_row() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    let gate = CancellationToken::new();
    let template = TestRunner::gated(5, gate.clone());
    let stats = template.stats();
    let ctx = CancellationToken::new();

    let starts = (0..8).map(|_| jobs.start(&ctx, template.clone()));
    let ids = join_all(starts).await;

    for id in &ids {
        assert_eq!(*id.as_ref().unwrap(), JobId(5));
    }
    assert_eq!(store.create_count(), 1);

    gate.cancel();
    wait_for_status(&jobs, JobId(5), JobStatus::Done).await;
    close(&jobs).await;
    assert_eq!(stats.runs(), 1);
}

#[tokio::test]
async fn test_unknown_job_is_failed() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);

    let job = jobs.job(JobId(999)).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.job_id, JobId(999));
    assert_eq!(job.book_id, BookId(999));
    close(&jobs).await;
}

#[tokio::test]
async fn test_job_is_running_right_after_start() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    let gate = CancellationToken::new();

    let id = jobs
        .start(&CancellationToken::new(), TestRunner::gated(3, gate.clone()))
        .await
        .unwrap();
    let job = jobs.job(id).await;
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.job_name, "gated");

    gate.cancel();
    wait_for_status(&jobs, id, JobStatus::Done).await;
    close(&jobs).await;
}

#[tokio::test]
async fn test_restart_after_finish_reuses_row() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    let ctx = CancellationToken::new();

    let first = jobs
        .start(&ctx, TestRunner::fail(11, "boom").with_name("profiling"))
        .await
        .unwrap();
    wait_for_status(&jobs, first, JobStatus::Failed).await;

    let second = jobs
        .start(&ctx, TestRunner::succeed(11).with_name("lexicon"))
        .await
        .unwrap();
    assert_eq!(first, second);
    let job = wait_for_status(&jobs, second, JobStatus::Done).await;
    assert_eq!(job.job_name, "lexicon");
    close(&jobs).await;

    assert_eq!(store.create_count(), 1);
    assert_eq!(
        store.writes_for(first),
        vec![
            JobStatus::Running,
            JobStatus::Failed,
            JobStatus::Running,
            JobStatus::Done
        ]
    );
}

#[tokio::test]
async fn test_start_overwrites_pipeline_status() {
    let store = InMemoryJobStore::new();
    store.insert(JobRecord::new(
        JobId(12),
        JobStatus::ProfiledWithEL,
        "profiling",
        0,
    ));
    let jobs = orchestrator(&store);

    let id = jobs
        .start(&CancellationToken::new(), TestRunner::succeed(12).with_name("post-correction"))
        .await
        .unwrap();
    assert_eq!(id, JobId(12));

    let job = wait_for_status(&jobs, id, JobStatus::Done).await;
    assert_eq!(job.job_name, "post-correction");
    assert_eq!(store.create_count(), 0);
    close(&jobs).await;
}

#[tokio::test]
async fn test_store_read_failure_is_returned_from_start() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    let runner = TestRunner::succeed(13);
    let stats = runner.stats();

    store.set_fail_reads(true);
    let err = jobs.start(&CancellationToken::new(), runner).await.unwrap_err();
    assert!(matches!(err, JobsError::Store { job_id: JobId(13), .. }));
    assert_eq!(jobs.job(JobId(13)).await.status, JobStatus::Failed);

    store.set_fail_reads(false);
    close(&jobs).await;
    assert_eq!(stats.runs(), 0);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_store_write_failure_is_returned_from_start() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);

    store.set_fail_writes(true);
    let err = jobs
        .start(&CancellationToken::new(), TestRunner::succeed(14))
        .await
        .unwrap_err();
    assert!(matches!(err, JobsError::Store { .. }));
    assert!(err.to_string().contains("cannot start job id 14"));
    assert!(store.get(JobId(14)).is_none());
    close(&jobs).await;
}

#[tokio::test]
async fn test_parent_timeout_cancels_job() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    let parent = cancel_after(&CancellationToken::new(), Duration::from_millis(20));

    let id = jobs
        .start(&parent, TestRunner::until_cancelled(15))
        .await
        .unwrap();

    wait_for_status(&jobs, id, JobStatus::Failed).await;
    close(&jobs).await;
}

#[tokio::test]
async fn test_cancelled_parent_leaves_other_jobs_running() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    let gate = CancellationToken::new();
    let request = CancellationToken::new();

    let doomed = jobs
        .start(&request, TestRunner::until_cancelled(16))
        .await
        .unwrap();
    let other = jobs
        .start(&CancellationToken::new(), TestRunner::gated(17, gate.clone()))
        .await
        .unwrap();

    request.cancel();
    wait_for_status(&jobs, doomed, JobStatus::Failed).await;
    assert_eq!(jobs.job(other).await.status, JobStatus::Running);

    gate.cancel();
    wait_for_status(&jobs, other, JobStatus::Done).await;
    close(&jobs).await;
}

#[tokio::test]
async fn test_start_after_close_is_rejected() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    close(&jobs).await;

    let err = jobs
        .start(&CancellationToken::new(), TestRunner::succeed(18))
        .await
        .unwrap_err();
    assert!(matches!(err, JobsError::Closed));
    assert!(store.get(JobId(18)).is_none());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    jobs.start(&CancellationToken::new(), TestRunner::until_cancelled(19))
        .await
        .unwrap();

    close(&jobs).await;
    close(&jobs).await;
}

#[tokio::test]
async fn test_concurrent_close_callers_all_return() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    let ctx = CancellationToken::new();
    for book in 20..24 {
        jobs.start(&ctx, TestRunner::until_cancelled(book)).await.unwrap();
    }

    let results = timeout(
        Duration::from_secs(5),
        join_all((0..4).map(|_| jobs.close())),
    )
    .await
    .expect("close did not complete");
    assert!(results.iter().all(Result::is_ok));

    for book in 20..24 {
        assert_eq!(store.status_of(JobId(book)), Some(JobStatus::Failed));
    }
}

#[tokio::test]
async fn test_close_waits_for_slow_runner() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    let runner = TestRunner::new(25, "slow", RunnerMode::Stubborn(Duration::from_millis(100)));
    let stats = runner.stats();

    let id = jobs.start(&CancellationToken::new(), runner).await.unwrap();
    close(&jobs).await;

    assert_eq!(stats.active(), 0);
    // the runner ignored cancellation and finished its work
    assert_eq!(jobs.job(id).await.status, JobStatus::Done);
}

#[tokio::test]
async fn test_no_writes_after_close() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    let ctx = CancellationToken::new();
    for book in 30..40 {
        let mode = if book % 2 == 0 {
            RunnerMode::Sleep(Duration::from_millis(5))
        } else {
            RunnerMode::UntilCancelled
        };
        jobs.start(&ctx, TestRunner::new(book, "mixed", mode)).await.unwrap();
    }

    close(&jobs).await;
    let writes = store.write_count();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.write_count(), writes);

    for book in 30..40 {
        let history = store.writes_for(JobId(book));
        assert_eq!(history.len(), 2, "book {book}: {history:?}");
        assert_eq!(history[0], JobStatus::Running);
        assert!(history[1].is_terminal());
    }
}

#[tokio::test]
async fn test_many_books_run_concurrently() {
    let store = InMemoryJobStore::new();
    let jobs = orchestrator(&store);
    let gate = CancellationToken::new();
    let stats = Arc::new(RunStats::default());
    let ctx = CancellationToken::new();

    for book in 100..120 {
        let runner = TestRunner::gated(book, gate.clone()).with_stats(Arc::clone(&stats));
        jobs.start(&ctx, runner).await.unwrap();
    }

    timeout(Duration::from_secs(5), async {
        while stats.active() < 20 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("runs never overlapped");

    gate.cancel();
    for book in 100..120 {
        wait_for_status(&jobs, JobId(book), JobStatus::Done).await;
    }
    close(&jobs).await;
    assert_eq!(stats.runs(), 20);
    assert_eq!(stats.peak(), 20);
}

#[tokio::test]
async fn test_small_mailbox_does_not_deadlock() {
    let store = InMemoryJobStore::new();
    let jobs = JobOrchestratorBuilder::new(OrchestratorConfig::default())
        .with_mailbox_capacity(1)
        .with_store(Arc::new(store.clone()))
        .build()
        .unwrap();
    let ctx = CancellationToken::new();

    let starts = (200..232).map(|book| jobs.start(&ctx, TestRunner::succeed(book)));
    for id in join_all(starts).await {
        id.unwrap();
    }
    close(&jobs).await;

    for book in 200..232 {
        assert_eq!(store.status_of(JobId(book)), Some(JobStatus::Done));
    }
}

#[tokio::test]
async fn test_builder_requires_store() {
    let err = JobOrchestratorBuilder::<InMemoryJobStore>::new(OrchestratorConfig::default())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("store dependency missing"));
}
