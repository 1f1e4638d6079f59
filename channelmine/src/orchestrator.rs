//! The orchestrator: a fixed-topology finite-state machine over the
//! pipeline stages.
//!
//! Each state's stage runs to completion; success advances the machine
//! carrying the status token, and the first stage error transitions to the
//! absorbing failed state without invoking any later stage. There are no
//! retries between states: a failed run is restarted manually and relies
//! on each stage's own skip-if-exists or drop-and-recreate policy to avoid
//! duplicate work.

use crate::config::PipelineConfig;
use crate::detect::Detector;
use crate::events::EventSink;
use crate::fetch::ChannelFetcher;
use crate::guard::EnvironmentGuard;
use crate::jobs::ExternalJob;
use crate::stages::{
    CollectorStage, EnrichedLoaderStage, EnrichmentStage, ExternalJobStage, GuardStage,
    PipelineStage, PrimaryLoaderStage,
};
use crate::status::{PipelineState, StatusToken};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of one stage within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage name.
    pub stage: String,
    /// The state the machine was in while the stage ran.
    pub state: PipelineState,
    /// Completion label, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<String>,
    /// Error message, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
}

impl StageReport {
    /// Returns the stage duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Terminal state: `Done` or `Failed`.
    pub final_state: PipelineState,
    /// Per-stage outcomes, in execution order.
    pub stages: Vec<StageReport>,
    /// The failing stage's error, if the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    /// Returns true if the run reached `Done`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.final_state == PipelineState::Done
    }
}

/// Sequences the pipeline stages and threads the status token through them.
pub struct Orchestrator {
    stages: Vec<(PipelineState, Box<dyn PipelineStage>)>,
    events: Arc<dyn EventSink>,
}

impl Orchestrator {
    /// Creates an orchestrator over an explicit stage sequence.
    ///
    /// Used directly in tests to drive the state machine with stub stages.
    #[must_use]
    pub fn new(
        stages: Vec<(PipelineState, Box<dyn PipelineStage>)>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { stages, events }
    }

    /// Assembles the standard fixed topology:
    /// guard → collect → load → enrich → load-enriched → transform → verify.
    #[must_use]
    pub fn standard(
        config: &PipelineConfig,
        fetcher: Arc<dyn ChannelFetcher>,
        detector: Arc<dyn Detector>,
        transform_job: Arc<dyn ExternalJob>,
        verify_job: Arc<dyn ExternalJob>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let guard = EnvironmentGuard::new(config, events.clone());
        let stages: Vec<(PipelineState, Box<dyn PipelineStage>)> = vec![
            (
                PipelineState::Guarding,
                Box::new(GuardStage::new(guard.clone())),
            ),
            (
                PipelineState::Collecting,
                Box::new(CollectorStage::new(
                    config.clone(),
                    fetcher,
                    events.clone(),
                )),
            ),
            (
                PipelineState::PrimaryLoading,
                Box::new(PrimaryLoaderStage::new(config.clone(), events.clone())),
            ),
            (
                PipelineState::Enriching,
                Box::new(EnrichmentStage::new(
                    config.clone(),
                    detector,
                    events.clone(),
                )),
            ),
            (
                PipelineState::EnrichedLoading,
                Box::new(EnrichedLoaderStage::new(
                    config.clone(),
                    guard,
                    events.clone(),
                )),
            ),
            (
                PipelineState::Transforming,
                Box::new(ExternalJobStage::transform(transform_job, events.clone())),
            ),
            (
                PipelineState::Verifying,
                Box::new(ExternalJobStage::verification(verify_job, events.clone())),
            ),
        ];
        Self::new(stages, events)
    }

    /// Runs the pipeline to a terminal state.
    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        self.events.emit(
            "pipeline.started",
            Some(serde_json::json!({ "run_id": run_id.to_string() })),
        );

        let mut token: Option<StatusToken> = None;
        let mut reports = Vec::with_capacity(self.stages.len());

        for (state, stage) in &self.stages {
            self.events.emit(
                "stage.started",
                Some(serde_json::json!({
                    "stage": stage.name(),
                    "state": state.to_string(),
                })),
            );

            let started_at = Utc::now();
            match stage.run(token.as_ref()).await {
                Ok(next) => {
                    self.events.emit(
                        "stage.completed",
                        Some(serde_json::json!({
                            "stage": stage.name(),
                            "status": next.label(),
                        })),
                    );
                    reports.push(StageReport {
                        stage: stage.name().to_string(),
                        state: *state,
                        completion: Some(next.label().to_string()),
                        error: None,
                        started_at,
                        ended_at: Utc::now(),
                    });
                    token = Some(next);
                }
                Err(err) => {
                    let message = err.to_string();
                    self.events.emit(
                        "stage.failed",
                        Some(serde_json::json!({
                            "stage": stage.name(),
                            "error": message,
                        })),
                    );
                    reports.push(StageReport {
                        stage: stage.name().to_string(),
                        state: *state,
                        completion: None,
                        error: Some(message.clone()),
                        started_at,
                        ended_at: Utc::now(),
                    });
                    self.events.emit(
                        "pipeline.failed",
                        Some(serde_json::json!({
                            "run_id": run_id.to_string(),
                            "stage": stage.name(),
                        })),
                    );
                    return RunReport {
                        run_id,
                        final_state: PipelineState::Failed,
                        stages: reports,
                        error: Some(message),
                    };
                }
            }
        }

        self.events.emit(
            "pipeline.completed",
            Some(serde_json::json!({ "run_id": run_id.to_string() })),
        );
        RunReport {
            run_id,
            final_state: PipelineState::Done,
            stages: reports,
            error: None,
        }
    }
}
