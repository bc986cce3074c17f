use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pcwjobs::*;

/// What a [`TestRunner`] does when run.
#[derive(Clone, Debug)]
pub enum RunnerMode {
    /// Return `Ok` at once.
    Succeed,
    /// Return an error with the given message at once.
    Fail(String),
    /// Block until cancelled, then return an error.
    UntilCancelled,
    /// Sleep, returning `Ok` unless cancelled first.
    Sleep(Duration),
    /// Block until the gate token is cancelled (`Ok`) or the run is (`Err`).
    Gate(CancellationToken),
    /// Ignore cancellation and sleep for the full duration.
    Stubborn(Duration),
}

/// Counters shared by all clones of a [`TestRunner`].
#[derive(Debug, Default)]
pub struct RunStats {
    runs: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    cancelled: AtomicUsize,
}

impl RunStats {
    /// Number of times `run` was entered.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Runs currently in progress.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of runs in progress at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Runs that returned because their token fired.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scripted runner for orchestrator tests.
#[derive(Clone, Debug)]
pub struct TestRunner {
    book_id: BookId,
    name: String,
    mode: RunnerMode,
    stats: Arc<RunStats>,
}

impl TestRunner {
    pub fn new(book_id: i64, name: impl Into<String>, mode: RunnerMode) -> Self {
        Self {
            book_id: BookId(book_id),
            name: name.into(),
            mode,
            stats: Arc::new(RunStats::default()),
        }
    }

    pub fn succeed(book_id: i64) -> Self {
        Self::new(book_id, "succeed", RunnerMode::Succeed)
    }

    pub fn fail(book_id: i64, message: impl Into<String>) -> Self {
        Self::new(book_id, "fail", RunnerMode::Fail(message.into()))
    }

    pub fn until_cancelled(book_id: i64) -> Self {
        Self::new(book_id, "until-cancelled", RunnerMode::UntilCancelled)
    }

    pub fn gated(book_id: i64, gate: CancellationToken) -> Self {
        Self::new(book_id, "gated", RunnerMode::Gate(gate))
    }

    /// Share counters with another runner.
    pub fn with_stats(mut self, stats: Arc<RunStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    async fn execute(&self, token: &CancellationToken) -> anyhow::Result<()> {
        match &self.mode {
            RunnerMode::Succeed => Ok(()),
            RunnerMode::Fail(message) => Err(anyhow::anyhow!("{message}")),
            RunnerMode::UntilCancelled => {
                token.cancelled().await;
                self.stats.cancelled.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("canceled")
            }
            RunnerMode::Sleep(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(*duration) => Ok(()),
                    _ = token.cancelled() => {
                        self.stats.cancelled.fetch_add(1, Ordering::SeqCst);
                        anyhow::bail!("canceled")
                    }
                }
            }
            RunnerMode::Gate(gate) => {
                tokio::select! {
                    _ = gate.cancelled() => Ok(()),
                    _ = token.cancelled() => {
                        self.stats.cancelled.fetch_add(1, Ordering::SeqCst);
                        anyhow::bail!("canceled")
                    }
                }
            }
            RunnerMode::Stubborn(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Runner for TestRunner {
    fn book_id(&self) -> BookId {
        self.book_id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    async fn run(&self, token: CancellationToken) -> anyhow::Result<()> {
        self.stats.enter();
        let result = self.execute(&token).await;
        self.stats.leave();
        result
    }
}
