//! Environment guard: verifies the active storage target before any
//! destructive stage runs.

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::events::EventSink;
use crate::storage::Storage;
use std::path::PathBuf;
use std::sync::Arc;

/// Verifies that the configured storage target reports the expected
/// identifying name.
///
/// Invoked once before the collector stage and again by the enriched
/// loader, which reconnects independently. The check is read-only.
#[derive(Clone)]
pub struct EnvironmentGuard {
    database_path: PathBuf,
    expected_target: String,
    events: Arc<dyn EventSink>,
}

impl EnvironmentGuard {
    /// Creates a guard from the pipeline configuration.
    #[must_use]
    pub fn new(config: &PipelineConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            database_path: config.database_path.clone(),
            expected_target: config.expected_target.clone(),
            events,
        }
    }

    /// Opens the target, reads back its name, and compares it against the
    /// required isolated-target name. Mismatch is fatal.
    pub fn verify(&self) -> Result<(), PipelineError> {
        let storage = Storage::open(&self.database_path)?;
        let actual = storage.target_name()?;
        self.events.emit(
            "guard.checked",
            Some(serde_json::json!({ "target": actual })),
        );
        if actual == self.expected_target {
            Ok(())
        } else {
            Err(PipelineError::WrongTarget {
                expected: self.expected_target.clone(),
                actual,
            })
        }
    }
}
