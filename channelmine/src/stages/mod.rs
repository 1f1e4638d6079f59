//! Pipeline stages.
//!
//! Each stage is one unit of the fixed pipeline topology. A stage runs to
//! completion, returns a [`StatusToken`] on success, and propagates an
//! error only for fatal conditions; per-item failures stay inside the
//! stage.

mod collect;
mod enrich;
mod external;
mod load;
mod load_enriched;

pub use collect::CollectorStage;
pub use enrich::EnrichmentStage;
pub use external::ExternalJobStage;
pub use load::PrimaryLoaderStage;
pub use load_enriched::EnrichedLoaderStage;

use crate::errors::PipelineError;
use crate::guard::EnvironmentGuard;
use crate::status::StatusToken;
use async_trait::async_trait;

/// Trait for pipeline stages.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage.
    ///
    /// The predecessor's token is passed for ordering only; its contents
    /// are never inspected beyond logging.
    async fn run(&self, token: Option<&StatusToken>) -> Result<StatusToken, PipelineError>;
}

/// Stage wrapper around the environment guard, so the orchestrator's
/// guarding state is driven like any other stage.
pub struct GuardStage {
    guard: EnvironmentGuard,
}

impl GuardStage {
    /// Creates a guard stage.
    #[must_use]
    pub fn new(guard: EnvironmentGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl PipelineStage for GuardStage {
    fn name(&self) -> &str {
        "guard"
    }

    async fn run(&self, _token: Option<&StatusToken>) -> Result<StatusToken, PipelineError> {
        self.guard.verify()?;
        Ok(StatusToken::new("environment verified"))
    }
}
