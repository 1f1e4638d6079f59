//! Status token and pipeline state types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Completion marker passed from one stage to its successor.
///
/// A token carries only a human-readable label — no structured payload.
/// It is created by a stage on success, handed to exactly one successor
/// for ordering, and discarded after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusToken {
    label: String,
}

impl StatusToken {
    /// Creates a new status token with the given completion label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Returns the completion label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for StatusToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// The orchestrator's state machine.
///
/// States advance strictly left to right; `Failed` is reachable from any
/// non-terminal state and, like `Done`, is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No run in progress.
    Idle,
    /// Verifying the storage target before any destructive stage.
    Guarding,
    /// Fetching records per channel and writing artifacts.
    Collecting,
    /// Bulk-inserting collected artifacts into the primary relation.
    PrimaryLoading,
    /// Running detection over referenced images.
    Enriching,
    /// Bulk-inserting detection records into the secondary relation.
    EnrichedLoading,
    /// Running the external transformation job.
    Transforming,
    /// Running the external verification job.
    Verifying,
    /// All stages completed.
    Done,
    /// A stage failed; no later stage ran.
    Failed,
}

impl PipelineState {
    /// Returns true if no further transitions are possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Guarding => write!(f, "guarding"),
            Self::Collecting => write!(f, "collecting"),
            Self::PrimaryLoading => write!(f, "primary_loading"),
            Self::Enriching => write!(f, "enriching"),
            Self::EnrichedLoading => write!(f, "enriched_loading"),
            Self::Transforming => write!(f, "transforming"),
            Self::Verifying => write!(f, "verifying"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_token_label() {
        let token = StatusToken::new("collected");
        assert_eq!(token.label(), "collected");
        assert_eq!(token.to_string(), "collected");
    }

    #[test]
    fn test_pipeline_state_terminal() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Failed.is_terminal());
        assert!(!PipelineState::Idle.is_terminal());
        assert!(!PipelineState::Enriching.is_terminal());
    }

    #[test]
    fn test_pipeline_state_display() {
        assert_eq!(PipelineState::PrimaryLoading.to_string(), "primary_loading");
        assert_eq!(PipelineState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_pipeline_state_serialize() {
        let json = serde_json::to_string(&PipelineState::EnrichedLoading).unwrap();
        assert_eq!(json, r#""enriched_loading""#);
    }
}
