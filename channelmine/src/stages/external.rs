//! Stages wrapping opaque external jobs.

use crate::errors::PipelineError;
use crate::events::EventSink;
use crate::jobs::{ExternalJob, JobOutcome};
use crate::stages::PipelineStage;
use crate::status::StatusToken;
use async_trait::async_trait;
use std::sync::Arc;

/// Runs one external job to completion and translates its exit signal into
/// the stage contract: success yields a token, failure is fatal and carries
/// the job's captured error output.
pub struct ExternalJobStage {
    stage_name: String,
    completion_label: String,
    job: Arc<dyn ExternalJob>,
    events: Arc<dyn EventSink>,
}

impl ExternalJobStage {
    /// Creates a stage around an external job.
    #[must_use]
    pub fn new(
        stage_name: impl Into<String>,
        completion_label: impl Into<String>,
        job: Arc<dyn ExternalJob>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            completion_label: completion_label.into(),
            job,
            events,
        }
    }

    /// The transformation stage.
    #[must_use]
    pub fn transform(job: Arc<dyn ExternalJob>, events: Arc<dyn EventSink>) -> Self {
        Self::new("transform", "transformed", job, events)
    }

    /// The verification stage.
    #[must_use]
    pub fn verification(job: Arc<dyn ExternalJob>, events: Arc<dyn EventSink>) -> Self {
        Self::new("verification", "verified", job, events)
    }
}

#[async_trait]
impl PipelineStage for ExternalJobStage {
    fn name(&self) -> &str {
        &self.stage_name
    }

    async fn run(&self, token: Option<&StatusToken>) -> Result<StatusToken, PipelineError> {
        self.events.emit(
            "job.started",
            Some(serde_json::json!({
                "job": self.job.name(),
                "after": token.map(StatusToken::label),
            })),
        );

        match self.job.run().await {
            JobOutcome::Success { stdout } => {
                self.events.emit(
                    "job.completed",
                    Some(serde_json::json!({
                        "job": self.job.name(),
                        "output": stdout,
                    })),
                );
                Ok(StatusToken::new(self.completion_label.clone()))
            }
            JobOutcome::Failure { stderr } => {
                self.events.emit(
                    "job.failed",
                    Some(serde_json::json!({
                        "job": self.job.name(),
                        "error": stderr,
                    })),
                );
                Err(PipelineError::JobFailed {
                    name: self.job.name().to_string(),
                    stderr,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::jobs::FixtureJob;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_success_yields_completion_token() {
        let stage = ExternalJobStage::transform(
            Arc::new(FixtureJob::succeeding("dbt-run")),
            Arc::new(CollectingEventSink::new()),
        );
        let token = stage.run(None).await.unwrap();
        assert_eq!(token.label(), "transformed");
    }

    #[tokio::test]
    async fn test_failure_carries_job_diagnostics() {
        let events = Arc::new(CollectingEventSink::new());
        let stage = ExternalJobStage::verification(
            Arc::new(FixtureJob::failing("dbt-test", "3 tests failed")),
            events.clone(),
        );
        let err = stage.run(None).await.unwrap_err();
        assert!(err.to_string().contains("3 tests failed"));
        assert_eq!(events.events_of_type("job.failed").len(), 1);
    }

    #[tokio::test]
    async fn test_stage_names() {
        let events: Arc<dyn EventSink> = Arc::new(CollectingEventSink::new());
        let transform =
            ExternalJobStage::transform(Arc::new(FixtureJob::succeeding("t")), events.clone());
        let verify =
            ExternalJobStage::verification(Arc::new(FixtureJob::succeeding("v")), events);
        assert_eq!(transform.name(), "transform");
        assert_eq!(verify.name(), "verification");
    }
}
