use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use crate::config::OrchestratorConfig;
use crate::store::JobStore;

use super::supervisor::JobOrchestrator;

/// Builder for constructing a `JobOrchestrator` with explicit dependencies.
///
/// # Example
///
/// ```ignore
/// use pcwjobs::*;
///
/// let store = Arc::new(PostgresJobStore::connect(&persistence).await?);
/// let jobs = JobOrchestratorBuilder::new(OrchestratorConfig::default())
///     .with_store(store)
///     .build()?;
/// ```
pub struct JobOrchestratorBuilder<S: JobStore> {
    config: OrchestratorConfig,
    store: Option<Arc<S>>,
}

impl<S: JobStore> fmt::Debug for JobOrchestratorBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("JobOrchestratorBuilder");
        debug.field("config", &self.config);
        debug.field("store_set", &self.store.is_some());
        if self.store.is_some() {
            debug.field("store_type", &type_name::<S>());
        }
        debug.finish()
    }
}

impl<S: JobStore> JobOrchestratorBuilder<S> {
    /// Create a new builder with the given orchestrator configuration.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            store: None,
        }
    }

    /// Set the job store.
    pub fn with_store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the dispatcher mailbox capacity.
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_mailbox_capacity(capacity);
        self
    }

    /// Build the orchestrator and spawn its dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if no store was provided.
    pub fn build(self) -> anyhow::Result<JobOrchestrator<S>> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store dependency missing"))?;

        Ok(JobOrchestrator::new(self.config, store))
    }
}
