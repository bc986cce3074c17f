/// Builder for constructing orchestrator instances.
pub mod builder;
/// Dispatcher loop and the `JobOrchestrator` façade.
pub mod supervisor;
/// Cancellation tokens and deadlines.
pub mod token;
mod worker;

pub use builder::JobOrchestratorBuilder;
pub use supervisor::JobOrchestrator;
pub use token::{cancel_after, CancellationToken};
