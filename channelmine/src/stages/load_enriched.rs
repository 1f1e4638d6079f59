//! Enriched loader stage: bulk-inserts detection records into the
//! secondary relation.

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::events::EventSink;
use crate::guard::EnvironmentGuard;
use crate::records::DetectionRecord;
use crate::stages::PipelineStage;
use crate::status::StatusToken;
use crate::storage::Storage;
use async_trait::async_trait;
use std::sync::Arc;

/// Re-verifies the storage target, then drops and recreates the secondary
/// relation from the enrichment artifact.
///
/// A missing artifact means the enricher had nothing to report: the
/// relation is recreated empty, a warning is logged, and the stage
/// succeeds. "File absent" and "zero detections" are indistinguishable
/// downstream.
pub struct EnrichedLoaderStage {
    config: PipelineConfig,
    guard: EnvironmentGuard,
    events: Arc<dyn EventSink>,
}

impl EnrichedLoaderStage {
    /// Creates an enriched loader stage.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        guard: EnvironmentGuard,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            guard,
            events,
        }
    }
}

#[async_trait]
impl PipelineStage for EnrichedLoaderStage {
    fn name(&self) -> &str {
        "enriched_loader"
    }

    async fn run(&self, _token: Option<&StatusToken>) -> Result<StatusToken, PipelineError> {
        // This stage reconnects on its own, so the target is re-verified
        // even though the orchestrator already guarded the run.
        self.guard.verify()?;

        let storage = Storage::open(&self.config.database_path)?;
        storage.replace_detections_table()?;

        let path = self.config.detections_path();
        if !path.exists() {
            self.events.emit(
                "enriched_loader.no_artifact",
                Some(serde_json::json!({ "path": path.display().to_string() })),
            );
            return Ok(StatusToken::new("detections loaded"));
        }

        let text = std::fs::read_to_string(&path)?;
        let records: Vec<DetectionRecord> = serde_json::from_str(&text)?;
        let inserted = storage.insert_detections(&records)?;

        self.events.emit(
            "enriched_loader.completed",
            Some(serde_json::json!({ "rows": inserted })),
        );
        Ok(StatusToken::new("detections loaded"))
    }
}
