//! The unit of work executed by the orchestrator.
//!
//! A [`Runner`] belongs to exactly one book and carries a human-readable
//! name that is written to the job store when the job starts. Execution is
//! cancelled cooperatively: [`Runner::run`] receives a [`CancellationToken`] and
//! must return (with an error) soon after the token fires. Nothing ever
//! aborts a running job from the outside.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::job::BookId;
use tokio_util::sync::CancellationToken;

/// Trait for background work started on behalf of a book.
#[async_trait]
pub trait Runner: Send + Sync + 'static {
    /// The book this job runs for.
    fn book_id(&self) -> BookId;

    /// Name written to the job row when the job starts.
    ///
    /// The SQL stores keep at most 50 characters of it.
    fn name(&self) -> String;

    /// Execute the job until it is done or `token` is cancelled.
    async fn run(&self, token: CancellationToken) -> anyhow::Result<()>;
}

type RunFn = dyn Fn(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
    + Send
    + Sync;

/// Runner backed by an async closure.
///
/// ```ignore
/// let runner = FnRunner::new(BookId(7), "profiling", |token| async move {
///     run_command(&token, "profiler", ["--book", "7"]).await
/// });
/// ```
pub struct FnRunner {
    book_id: BookId,
    name: String,
    run: Box<RunFn>,
}

impl FnRunner {
    pub fn new<F, Fut>(book_id: BookId, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            book_id,
            name: name.into(),
            run: Box::new(move |token| Box::pin(f(token))),
        }
    }
}

impl fmt::Debug for FnRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRunner")
            .field("book_id", &self.book_id)
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl Runner for FnRunner {
    fn book_id(&self) -> BookId {
        self.book_id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    async fn run(&self, token: CancellationToken) -> anyhow::Result<()> {
        (self.run)(token).await
    }
}

/// Run an external command until it exits or `token` is cancelled.
///
/// Every line the command writes to stderr is logged at debug level and
/// stdout is discarded. A cancelled token kills the child process and
/// returns an error, as does a non-zero exit status.
pub async fn run_command<I, S>(token: &CancellationToken, program: &str, args: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
    tracing::info!(cmd = %program, args = ?args, "running command");

    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| anyhow::anyhow!("cannot run command {program}: {e}"))?;

    let stderr_task = child.stderr.take().map(|stderr| {
        let program = program.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            // read errors end the stream; the exit status decides the outcome
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(cmd = %program, text = %line, "stderr");
            }
        })
    });

    let outcome = tokio::select! {
        status = child.wait() => Some(status),
        _ = token.cancelled() => None,
    };

    let result = match outcome {
        Some(Ok(status)) if status.success() => Ok(()),
        Some(Ok(status)) => Err(anyhow::anyhow!(
            "cannot run command {program}: {status}"
        )),
        Some(Err(e)) => Err(anyhow::anyhow!("cannot run command {program}: {e}")),
        None => {
            if let Err(e) = child.kill().await {
                tracing::warn!(cmd = %program, error = %e, "cannot kill cancelled command");
            }
            Err(anyhow::anyhow!("command {program} cancelled"))
        }
    };

    if let Some(task) = stderr_task {
        let _ = task.await;
    }
    result
}
