use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::OrchestratorConfig;
use crate::error::JobsError;
use crate::job::{BookId, JobId, JobRecord, JobStatus};
use crate::runner::Runner;
use crate::store::JobStore;
use crate::telemetry::{self, JobTimingHandle};

use super::token::CancellationToken;
use super::worker::spawn_run;

/// Control messages consumed by the dispatcher loop.
pub(crate) enum Command {
    /// Launch a run for a job whose row has just been set to `Running`.
    Start {
        job_id: JobId,
        runner: Arc<dyn Runner>,
        parent: CancellationToken,
    },
    /// A run returned.
    Finished {
        job_id: JobId,
        result: anyhow::Result<()>,
        timing: JobTimingHandle,
    },
    /// Cancel every run and reply once none is left.
    Stop { reply: oneshot::Sender<()> },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start { job_id, runner, .. } => f
                .debug_struct("Start")
                .field("job_id", job_id)
                .field("runner", &runner.name())
                .finish(),
            Command::Finished { job_id, result, .. } => f
                .debug_struct("Finished")
                .field("job_id", job_id)
                .field("error", &result.as_ref().err().map(|e| e.to_string()))
                .finish(),
            Command::Stop { .. } => f.write_str("Stop"),
        }
    }
}

/// Single sequential loop owning all in-memory run state.
///
/// Nothing else touches `running` or `outstanding`, so they need no lock,
/// and every status write for a given job id happens in message order.
struct Dispatcher<S: JobStore> {
    store: Arc<S>,
    mailbox: mpsc::WeakSender<Command>,
    running: HashMap<JobId, CancellationToken>,
    outstanding: usize,
    stop_reply: Option<oneshot::Sender<()>>,
}

impl<S: JobStore> Dispatcher<S> {
    fn new(store: Arc<S>, mailbox: mpsc::WeakSender<Command>) -> Self {
        Self {
            store,
            mailbox,
            running: HashMap::new(),
            outstanding: 0,
            stop_reply: None,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            tracing::debug!(command = ?command, "handling job command");
            match command {
                Command::Start {
                    job_id,
                    runner,
                    parent,
                } => self.handle_start(job_id, runner, parent).await,
                Command::Finished {
                    job_id,
                    result,
                    timing,
                } => self.handle_finished(job_id, result, timing).await,
                Command::Stop { reply } => self.handle_stop(reply),
            }

            if self.stop_reply.is_some() && self.outstanding == 0 {
                if let Some(reply) = self.stop_reply.take() {
                    let _ = reply.send(());
                }
                // no start can follow a stop, and no run is left to report
                break;
            }
        }
        tracing::info!("job queue closed");
    }

    async fn handle_start(&mut self, job_id: JobId, runner: Arc<dyn Runner>, parent: CancellationToken) {
        if self.running.contains_key(&job_id) {
            tracing::debug!(job_id = %job_id, "job already running; not launching a second run");
            return;
        }

        let Some(mailbox) = self.mailbox.upgrade() else {
            tracing::warn!(job_id = %job_id, "orchestrator dropped; job not launched");
            self.persist(job_id, JobStatus::Failed).await;
            return;
        };

        let token = parent.child_token();
        self.running.insert(job_id, token.clone());
        self.outstanding += 1;
        spawn_run(job_id, runner, token, mailbox);
    }

    async fn handle_finished(
        &mut self,
        job_id: JobId,
        result: anyhow::Result<()>,
        timing: JobTimingHandle,
    ) {
        self.running.remove(&job_id);
        self.outstanding = self.outstanding.saturating_sub(1);

        let status = match result {
            Ok(()) => JobStatus::Done,
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "job failed");
                JobStatus::Failed
            }
        };
        telemetry::record_job_end(timing, status.as_str());
        telemetry::record_job_finished(job_id.to_string(), status.as_str());

        self.persist(job_id, status)
            .instrument(telemetry::job_finish_span(job_id.to_string(), status.as_str()))
            .await;
    }

    fn handle_stop(&mut self, reply: oneshot::Sender<()>) {
        tracing::info!(running = self.running.len(), "cancelling all running jobs");
        for token in self.running.values() {
            token.cancel();
        }
        self.stop_reply = Some(reply);
    }

    async fn persist(&self, job_id: JobId, status: JobStatus) {
        if let Err(err) = self.store.set_status(job_id, status).await {
            tracing::error!(
                job_id = %job_id,
                status = %status,
                error = %err,
                "cannot set job status"
            );
        }
    }
}

enum Admission {
    Launch(JobId),
    Join(JobId),
}

/// Process-wide orchestrator for background jobs.
///
/// `start`, `job` and `close` may be called concurrently from any number of
/// tasks. All run bookkeeping lives in a single dispatcher task that the
/// orchestrator feeds through its mailbox. Construct it once at startup,
/// share it by reference, and call [`JobOrchestrator::close`] before the
/// process exits.
///
/// Cancellation is cooperative only: `close` waits for every runner to
/// honour its token, with no upper bound.
pub struct JobOrchestrator<S: JobStore> {
    config: OrchestratorConfig,
    store: Arc<S>,
    mailbox: RwLock<Option<mpsc::Sender<Command>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    closed: OnceCell<()>,
}

impl<S: JobStore> fmt::Debug for JobOrchestrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mailbox_open = self
            .mailbox
            .try_read()
            .map(|guard| guard.is_some())
            .unwrap_or(true);

        f.debug_struct("JobOrchestrator")
            .field("config", &self.config)
            .field("store_type", &type_name::<S>())
            .field("mailbox_open", &mailbox_open)
            .field("closed", &self.closed.initialized())
            .finish()
    }
}

impl<S: JobStore> JobOrchestrator<S> {
    /// Create the orchestrator and spawn its dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: OrchestratorConfig, store: Arc<S>) -> Self {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let dispatcher = Dispatcher::new(Arc::clone(&store), tx.downgrade());
        let handle = tokio::spawn(dispatcher.run(rx));

        Self {
            config,
            store,
            mailbox: RwLock::new(Some(tx)),
            dispatcher: Mutex::new(Some(handle)),
            closed: OnceCell::new(),
        }
    }

    /// Get the orchestrator configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Get a clone of the job store.
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Run `runner` as a background job and return its job id without
    /// waiting for it.
    ///
    /// If a job for the runner's book is already running, its id is returned
    /// and no second run is launched. Otherwise the book's job row is
    /// created, or reset in place to `Running` with the runner's name. The
    /// run is cancelled when `parent` is cancelled or the orchestrator
    /// closes. Poll [`JobOrchestrator::job`] for the outcome.
    pub async fn start<R: Runner>(&self, parent: &CancellationToken, runner: R) -> Result<JobId, JobsError> {
        let book_id = runner.book_id();
        let name = runner.name();
        let span = telemetry::job_start_span(book_id.to_string(), &name);
        let runner: Arc<dyn Runner> = Arc::new(runner);

        async move {
            let mailbox = self.mailbox.read().await;
            let Some(tx) = mailbox.as_ref() else {
                return Err(JobsError::Closed);
            };

            let job_id = match self.admit(book_id, &name).await? {
                Admission::Join(job_id) => {
                    tracing::debug!(job_id = %job_id, "job already running");
                    return Ok(job_id);
                }
                Admission::Launch(job_id) => job_id,
            };

            tx.send(Command::Start {
                job_id,
                runner,
                parent: parent.clone(),
            })
            .await
            .map_err(|_| {
                tracing::error!(job_id = %job_id, "dispatcher gone; job row left running");
                JobsError::Closed
            })?;

            Ok(job_id)
        }
        .instrument(span)
        .await
    }

    async fn admit(&self, book_id: BookId, name: &str) -> Result<Admission, JobsError> {
        let job_id = JobId::for_book(book_id);
        let existing = self
            .store
            .find_job_by_id(job_id)
            .await
            .map_err(|e| JobsError::store(job_id, e))?;

        match existing {
            Some(job) if job.status.is_running() => Ok(Admission::Join(job.job_id)),
            Some(job) => {
                self.store
                    .set_status_with_text(job.job_id, JobStatus::Running, name)
                    .await
                    .map_err(|e| JobsError::store(job.job_id, e))?;
                Ok(Admission::Launch(job.job_id))
            }
            None => match self.store.create_job(book_id, name).await {
                Ok(job_id) => Ok(Admission::Launch(job_id)),
                Err(err) => {
                    // a concurrent start for the same book may have won the insert
                    match self.store.find_job_by_id(job_id).await {
                        Ok(Some(job)) if job.status.is_running() => {
                            Ok(Admission::Join(job.job_id))
                        }
                        _ => Err(JobsError::store(job_id, err)),
                    }
                }
            },
        }
    }

    /// Current state of a job, read straight from the store.
    ///
    /// Never fails: a missing row or a store error yields a `Failed` record.
    /// The read is not ordered with in-flight starts, so right after `start`
    /// it may still show the previous outcome.
    pub async fn job(&self, job_id: JobId) -> JobRecord {
        match self.store.find_job_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id = %job_id, error = "no such job id", "cannot query for job");
                JobRecord::failed(job_id)
            }
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "cannot query for job");
                JobRecord::failed(job_id)
            }
        }
    }

    /// Cancel all running jobs and wait until each of them has returned and
    /// its outcome is stored.
    ///
    /// Safe to call any number of times from any number of tasks; only the
    /// first call does the work and concurrent callers wait for it. Once it
    /// returns, `start` fails with [`JobsError::Closed`] and the orchestrator
    /// writes nothing more to the store.
    pub async fn close(&self) -> Result<(), JobsError> {
        self.closed.get_or_init(|| self.shutdown()).await;
        Ok(())
    }

    async fn shutdown(&self) {
        tracing::info!("closing job orchestrator");

        let tx = self.mailbox.write().await.take();
        if let Some(tx) = tx {
            let (reply, done) = oneshot::channel();
            if tx.send(Command::Stop { reply }).await.is_ok() {
                let _ = done.await;
            }
        }

        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!("dispatcher task failed: {err:?}");
            }
        }

        tracing::info!("all jobs have been handled");
    }
}
