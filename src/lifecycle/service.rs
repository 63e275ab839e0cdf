//! Service handle interface.

use async_trait::async_trait;

use crate::error::BoxError;

/// Narrow handle a collaborator registers with the orchestrator.
///
/// The orchestrator never inspects a service beyond this interface: it
/// starts it, cleans it up, and probes its health. Implementations are
/// expected to make `cleanup` idempotent; it may be retried.
#[async_trait]
pub trait ServiceHandle: Send + Sync {
    /// Stable name; also the node id in the dependency graph.
    fn name(&self) -> &str;

    async fn start(&self) -> Result<(), BoxError>;

    async fn cleanup(&self) -> Result<(), BoxError>;

    async fn health_check(&self) -> bool {
        true
    }
}
