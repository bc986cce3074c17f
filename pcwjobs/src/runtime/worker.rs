use std::sync::Arc;

use tokio::sync::mpsc;

use crate::job::JobId;
use crate::runner::Runner;
use crate::telemetry;

use super::supervisor::Command;
use super::token::CancellationToken;

/// Execute one run of `runner` on its own task and report the outcome back
/// to the dispatcher's mailbox.
///
/// The runner is driven on a nested task so that a panicking runner still
/// produces a `Finished` message; otherwise the dispatcher would wait for it
/// forever on shutdown.
pub(crate) fn spawn_run(
    job_id: JobId,
    runner: Arc<dyn Runner>,
    token: CancellationToken,
    mailbox: mpsc::Sender<Command>,
) {
    tokio::spawn(async move {
        let name = runner.name();
        let timing = telemetry::record_job_start(job_id.to_string());
        telemetry::record_job_started(job_id.to_string(), &name);

        let run = tokio::spawn(telemetry::instrument_run(
            job_id.to_string(),
            name,
            async move { runner.run(token).await },
        ));
        let result = match run.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(anyhow::anyhow!("job panicked")),
            Err(err) => Err(anyhow::anyhow!("job aborted: {err}")),
        };

        if mailbox
            .send(Command::Finished {
                job_id,
                result,
                timing,
            })
            .await
            .is_err()
        {
            tracing::error!(job_id = %job_id, "job queue closed before job result was handled");
        }
        tracing::debug!(job_id = %job_id, "job done");
    });
}
